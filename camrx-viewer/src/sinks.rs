//! Local sinks for the viewer: write frames to disk, log poses.

use std::path::{Path, PathBuf};

use camrx_core::{CamrxError, CompletedFrame, FrameSink, Pose, PoseSink};
use tracing::{debug, info};

// ── FrameWriter ──────────────────────────────────────────────────

/// Writes each delivered frame to a file, replacing the previous one.
///
/// The bytes go to a sibling temp file first and are renamed into place,
/// so another process polling the path never reads a partial image.
/// Without a path, frames are only counted.
#[derive(Debug, Default)]
pub struct FrameWriter {
    path: Option<PathBuf>,
    frames: u64,
}

impl FrameWriter {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)
    }
}

impl FrameSink for FrameWriter {
    fn upload_frame(&mut self, frame: &CompletedFrame) -> Result<(), CamrxError> {
        self.frames += 1;
        if let Some(path) = &self.path {
            Self::write_atomic(path, &frame.data)
                .map_err(|e| CamrxError::Sink(format!("write {}: {e}", path.display())))?;
        }
        debug!(frame_id = frame.frame_id, bytes = frame.data.len(), "frame delivered");
        Ok(())
    }
}

// ── PoseLogger ───────────────────────────────────────────────────

/// Logs pose updates at `info`, or silently tracks the latest one.
#[derive(Debug, Default)]
pub struct PoseLogger {
    enabled: bool,
    last: Option<Pose>,
}

impl PoseLogger {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last: None,
        }
    }

    pub fn last(&self) -> Option<&Pose> {
        self.last.as_ref()
    }
}

impl PoseSink for PoseLogger {
    fn apply_pose(&mut self, pose: &Pose) -> Result<(), CamrxError> {
        if self.enabled {
            let p = pose.position;
            let (axis, angle) = pose.orientation().to_axis_angle();
            info!(
                x = p.x,
                y = p.y,
                z = p.z,
                angle_deg = angle.to_degrees(),
                axis = ?axis,
                fov = ?pose.vertical_fov,
                "camera pose"
            );
        }
        self.last = Some(*pose);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32, data: &'static [u8]) -> CompletedFrame {
        CompletedFrame {
            frame_id: id,
            data: data.to_vec().into(),
        }
    }

    #[test]
    fn writer_replaces_file() {
        let dir = std::env::temp_dir().join(format!("camrx-viewer-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("latest.bin");

        let mut sink = FrameWriter::new(Some(path.clone()));
        sink.upload_frame(&frame(1, b"first")).unwrap();
        sink.upload_frame(&frame(2, b"second")).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(sink.frames(), 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn writer_reports_io_failure() {
        let mut sink = FrameWriter::new(Some(PathBuf::from("/nonexistent/dir/latest.bin")));
        let err = sink.upload_frame(&frame(1, b"x")).unwrap_err();
        assert!(matches!(err, CamrxError::Sink(_)));
    }

    #[test]
    fn logger_tracks_last_pose() {
        let mut sink = PoseLogger::new(false);
        assert!(sink.last().is_none());
        let pose = Pose::default();
        sink.apply_pose(&pose).unwrap();
        assert_eq!(sink.last(), Some(&pose));
    }
}
