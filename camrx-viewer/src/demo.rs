//! Loopback test pattern: streams synthetic frames and an orbiting camera
//! pose to the local receiver.

use std::net::SocketAddr;
use std::time::Duration;

use camrx_core::{
    AxisPacket, CamrxError, ExtrinsicsPacket, FrameSender, PositionPacket, ProtocolVariant,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const FRAME_LEN: usize = 32 * 1024;
const ORBIT_RADIUS_CM: f32 = 250.0;
const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Test pattern for tick `n`: a byte ramp shifted by `n`.
pub fn pattern(n: u32) -> Vec<u8> {
    (0..FRAME_LEN).map(|i| (i as u32).wrapping_add(n) as u8).collect()
}

/// Row-major rotation of `angle` radians about +Y.
fn yaw(angle: f32) -> [f32; 9] {
    let (s, c) = angle.sin_cos();
    [c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c]
}

/// Stream until `shutdown` fires.
pub async fn run(
    target: SocketAddr,
    variant: ProtocolVariant,
    period: Duration,
    shutdown: CancellationToken,
) -> Result<(), CamrxError> {
    let sender = FrameSender::connect(target).await?;
    info!(%target, %variant, "demo stream started");

    if variant == ProtocolVariant::Calibrated {
        sender
            .send_axis(&AxisPacket {
                basis: IDENTITY,
                vertical_fov: 60.0,
            })
            .await?;
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick = 0u32;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let angle = tick as f32 * 0.05;
        let (s, c) = angle.sin_cos();
        let at = [ORBIT_RADIUS_CM * s, 0.0, ORBIT_RADIUS_CM * c];

        match variant {
            ProtocolVariant::Calibrated => {
                sender
                    .send_extrinsics(&ExtrinsicsPacket {
                        rotation: yaw(angle),
                        translation_cm: at,
                    })
                    .await?;
            }
            ProtocolVariant::PositionOnly => {
                sender
                    .send_position(&PositionPacket {
                        position_cm: at.map(f64::from),
                    })
                    .await?;
            }
        }

        let frame_id = sender.send_frame(&pattern(tick)).await?;
        debug!(frame_id, "demo frame sent");
        tick = tick.wrapping_add(1);
    }

    info!(bytes = sender.bytes_sent(), "demo stream stopped");
    Ok(())
}
