//! Receiver driven by a scripted `MemorySource` instead of a socket.

use std::time::Duration;

use camrx_core::{
    AxisPacket, Chunk, CompletedFrame, Consumer, ExtrinsicsPacket, FrameHeader, MemorySource,
    Pose, Receiver, ReceiverConfig, StateReader,
};

fn header(frame_id: u32, expected: i32) -> Vec<u8> {
    FrameHeader { frame_id, expected }.encode()
}

async fn settle(reader: &mut StateReader, revision: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while reader.snapshot().revision < revision {
            assert!(reader.changed().await, "receive task exited early");
        }
    })
    .await
    .expect("timed out waiting for receiver state");
}

#[tokio::test]
async fn test_scripted_stream() {
    let (feed, source) = MemorySource::channel();
    let mut receiver = Receiver::with_source(source, ReceiverConfig::default()).unwrap();
    let mut reader = receiver.reader();

    feed.push(header(1, 2));
    feed.push(Chunk::encode(1, 1, b"world"));
    feed.push(Chunk::encode(1, 0, b"hello "));
    feed.push(
        AxisPacket {
            basis: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            vertical_fov: 45.0,
        }
        .encode(),
    );
    settle(&mut reader, 2).await;

    let snap = reader.snapshot();
    assert_eq!(&snap.frame_bytes()[..], b"hello world");
    assert_eq!(snap.pose.vertical_fov, Some(45.0));

    receiver.stop().await;
}

#[tokio::test]
async fn test_closed_source_ends_task_and_keeps_state() {
    let source = MemorySource::from_datagrams(vec![header(3, 1), Chunk::encode(3, 0, b"only")]);
    let mut receiver = Receiver::with_source(source, ReceiverConfig::default()).unwrap();
    let mut reader = receiver.reader();

    settle(&mut reader, 1).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while receiver.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("receive task should end once the source closes");

    assert_eq!(&receiver.latest_frame_bytes()[..], b"only");
    receiver.stop().await;
}

#[tokio::test]
async fn test_consumer_follows_receiver() {
    let (feed, source) = MemorySource::channel();
    let mut receiver = Receiver::with_source(source, ReceiverConfig::default()).unwrap();
    let mut reader = receiver.reader();

    let mut frames: Vec<u32> = Vec::new();
    let mut poses: Vec<Pose> = Vec::new();
    {
        let mut consumer = Consumer::new(
            receiver.reader(),
            |f: &CompletedFrame| -> Result<(), camrx_core::CamrxError> {
                frames.push(f.frame_id);
                Ok(())
            },
            |p: &Pose| -> Result<(), camrx_core::CamrxError> {
                poses.push(*p);
                Ok(())
            },
        );

        feed.push(header(10, 1));
        feed.push(Chunk::encode(10, 0, b"a"));
        settle(&mut reader, 1).await;
        consumer.tick();

        feed.push(
            ExtrinsicsPacket {
                rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
                translation_cm: [100.0, 0.0, 0.0],
            }
            .encode(),
        );
        feed.push(header(11, 1));
        feed.push(Chunk::encode(11, 0, b"b"));
        settle(&mut reader, 3).await;
        consumer.tick();
        consumer.tick();
    }

    assert_eq!(frames, vec![10, 11]);
    assert_eq!(poses.len(), 1);
    assert_eq!(poses[0].position.x, 1.0);

    receiver.stop().await;
}
