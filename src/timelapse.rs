//! Capture-to-disk: one file per frame, raw bytes unless annotating.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flume::Receiver;
use tracing::{debug, info, warn};

use crate::annotate::AnnotationControl;
use crate::capture::Frame;

/// Outcome of a timelapse run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimelapseSummary {
    pub seen: u64,
    pub saved: u64,
    pub skipped: u64,
}

pub struct TimelapseWriter {
    pub output_dir: PathBuf,
    pub device_name: String,
    pub count: u64,
    pub annotation: Arc<AnnotationControl>,
}

/// `/dev/video0` -> `video0`
pub fn device_short_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl TimelapseWriter {
    pub fn file_path(&self, n: u64) -> PathBuf {
        self.output_dir
            .join(format!("capture_{}_{}.jpg", self.device_name, n))
    }

    /// Consume up to `count` frames (empty ones included) and write them out.
    pub fn run(&self, frames: &Receiver<Frame>) -> TimelapseSummary {
        let mut summary = TimelapseSummary::default();
        info!(
            "Capturing {} frames into {}",
            self.count,
            self.output_dir.display()
        );

        while summary.seen < self.count {
            let Ok(frame) = frames.recv() else {
                warn!("frame source closed after {} frames", summary.seen);
                break;
            };
            summary.seen += 1;

            match self.save(summary.seen, &frame) {
                Some(path) => {
                    summary.saved += 1;
                    metrics::counter!("lapse_frames_saved_total").increment(1);
                    info!("Saved file: {}", path.display());
                }
                None => summary.skipped += 1,
            }
        }

        info!(
            seen = summary.seen,
            saved = summary.saved,
            skipped = summary.skipped,
            "timelapse done"
        );
        summary
    }

    fn save(&self, n: u64, frame: &Frame) -> Option<PathBuf> {
        if frame.is_empty() {
            warn!("received frame size 0");
            return None;
        }
        debug!("captured {} bytes", frame.len());

        let contents = if self.annotation.is_enabled() {
            match self.annotation.annotate(&frame.data) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!("face detection failed: {}", e);
                    return None;
                }
            }
        } else {
            if frame.meta.format.is_jpeg() {
                if let Err(e) = image::load_from_memory(&frame.data) {
                    warn!("failed to decode jpeg: {}", e);
                    return None;
                }
            }
            frame.data.to_vec()
        };

        let path = self.file_path(n);
        if let Err(e) = write_file(&path, &contents) {
            warn!("failed to write file {}: {}", path.display(), e);
            return None;
        }
        Some(path)
    }
}

fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::tests::{gray_jpeg, FixedFinder};
    use crate::capture::{FrameMetadata, PixelFormat};
    use bytes::Bytes;

    fn frame(format: PixelFormat, data: Vec<u8>) -> Frame {
        Frame::new(
            Bytes::from(data),
            Arc::new(FrameMetadata {
                sequence: 0,
                width: 16,
                height: 16,
                format,
            }),
        )
    }

    #[test]
    fn short_name_strips_directories() {
        assert_eq!(device_short_name("/dev/video0"), "video0");
        assert_eq!(device_short_name("video2"), "video2");
    }

    #[test]
    fn writes_raw_frames_and_skips_bad_ones() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TimelapseWriter {
            output_dir: dir.path().to_path_buf(),
            device_name: "video0".into(),
            count: 4,
            annotation: Arc::new(AnnotationControl::unavailable()),
        };

        let jpeg = gray_jpeg(16, 16);
        let (tx, rx) = flume::unbounded();
        tx.send(frame(PixelFormat::Mjpeg, jpeg.clone())).unwrap();
        tx.send(frame(PixelFormat::Mjpeg, Vec::new())).unwrap();
        tx.send(frame(PixelFormat::Mjpeg, b"corrupt".to_vec())).unwrap();
        tx.send(frame(PixelFormat::Yuyv, vec![7; 32])).unwrap();
        tx.send(frame(PixelFormat::Mjpeg, jpeg.clone())).unwrap();

        let summary = writer.run(&rx);
        assert_eq!(
            summary,
            TimelapseSummary {
                seen: 4,
                saved: 2,
                skipped: 2,
            }
        );

        assert_eq!(fs::read(writer.file_path(1)).unwrap(), jpeg);
        assert!(!writer.file_path(2).exists());
        assert!(!writer.file_path(3).exists());
        assert_eq!(fs::read(writer.file_path(4)).unwrap(), vec![7; 32]);
        // Count reached, fifth frame left unread
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn annotated_frames_are_re_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let annotation = Arc::new(AnnotationControl::new(
            Some(Box::new(FixedFinder(Vec::new()))),
            5.0,
        ));
        annotation.enable();
        let writer = TimelapseWriter {
            output_dir: dir.path().to_path_buf(),
            device_name: "video1".into(),
            count: 1,
            annotation,
        };

        let (tx, rx) = flume::unbounded();
        tx.send(frame(PixelFormat::Mjpeg, gray_jpeg(16, 16))).unwrap();
        assert_eq!(writer.run(&rx).saved, 1);

        let written = fs::read(dir.path().join("capture_video1_1.jpg")).unwrap();
        assert!(image::load_from_memory(&written).is_ok());
    }

    #[test]
    fn closed_source_ends_early() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TimelapseWriter {
            output_dir: dir.path().to_path_buf(),
            device_name: "video0".into(),
            count: 10,
            annotation: Arc::new(AnnotationControl::unavailable()),
        };
        let (tx, rx) = flume::unbounded::<Frame>();
        drop(tx);
        assert_eq!(writer.run(&rx), TimelapseSummary::default());
    }
}
