//! Capture thread: moves frames from the device into the pipeline

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::capture::{Frame, FrameSource};
use crate::error::DeviceResult;
use crate::pipeline::FrameDistributor;

const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Destination for captured frames
pub trait FrameSink: Send + 'static {
    /// Returns `false` once the sink can no longer accept frames.
    fn accept(&mut self, frame: Frame) -> bool;
}

impl FrameSink for FrameDistributor {
    fn accept(&mut self, frame: Frame) -> bool {
        self.publish(frame);
        true
    }
}

impl FrameSink for flume::Sender<Frame> {
    fn accept(&mut self, frame: Frame) -> bool {
        if let Err(e) = self.send(frame) {
            warn!("Frame consumer gone: {}", e);
            return false;
        }
        true
    }
}

/// Start the device, then pump frames into `sink` on a dedicated thread
/// until `running` is cleared or the sink closes. A device that fails to
/// start is reported here and no thread is spawned.
pub fn spawn_capture<S, K>(
    mut source: S,
    mut sink: K,
    running: Arc<AtomicBool>,
) -> DeviceResult<JoinHandle<()>>
where
    S: FrameSource + 'static,
    K: FrameSink,
{
    source.start()?;

    let handle = thread::Builder::new()
        .name("lapse-capture".into())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                match source.next_frame() {
                    Ok(frame) => {
                        if !sink.accept(frame) {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Capture error: {}", e);
                        thread::sleep(READ_ERROR_BACKOFF);
                    }
                }
            }

            if let Err(e) = source.stop() {
                error!("Failed to stop capture: {}", e);
            }
            info!("Capture thread exiting");
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameMetadata, PixelFormat};
    use crate::error::DeviceError;
    use bytes::Bytes;
    use std::sync::Mutex;

    /// Replays scripted reads, then clears the run flag.
    struct ScriptedSource {
        reads: Vec<Option<&'static [u8]>>,
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
        running: Arc<AtomicBool>,
        seq: u64,
    }

    impl FrameSource for ScriptedSource {
        fn start(&mut self) -> DeviceResult<()> {
            self.started.store(true, Ordering::SeqCst);
            self.reads.reverse();
            Ok(())
        }

        fn next_frame(&mut self) -> DeviceResult<Frame> {
            match self.reads.pop() {
                Some(Some(data)) => {
                    self.seq += 1;
                    Ok(Frame::new(
                        Bytes::from_static(data),
                        Arc::new(FrameMetadata {
                            sequence: self.seq,
                            width: 1,
                            height: 1,
                            format: PixelFormat::Mjpeg,
                        }),
                    ))
                }
                Some(None) => Err(DeviceError::Io(std::io::Error::other("EIO"))),
                None => {
                    self.running.store(false, Ordering::SeqCst);
                    Err(DeviceError::NotStarted)
                }
            }
        }

        fn stop(&mut self) -> DeviceResult<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Collect(Arc<Mutex<Vec<u64>>>);

    impl FrameSink for Collect {
        fn accept(&mut self, frame: Frame) -> bool {
            self.0.lock().unwrap().push(frame.meta.sequence);
            true
        }
    }

    #[test]
    fn read_errors_are_skipped_and_lifecycle_completes() {
        let running = Arc::new(AtomicBool::new(true));
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let source = ScriptedSource {
            reads: vec![Some(b"a"), None, Some(b"b")],
            started: started.clone(),
            stopped: stopped.clone(),
            running: running.clone(),
            seq: 0,
        };

        spawn_capture(source, Collect(seen.clone()), running)
            .unwrap()
            .join()
            .unwrap();

        assert!(started.load(Ordering::SeqCst));
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn start(&mut self) -> DeviceResult<()> {
            Err(DeviceError::Io(std::io::Error::other("VIDIOC_REQBUFS")))
        }

        fn next_frame(&mut self) -> DeviceResult<Frame> {
            panic!("read from a device that never started");
        }

        fn stop(&mut self) -> DeviceResult<()> {
            Ok(())
        }
    }

    #[test]
    fn start_failure_is_returned_to_the_caller() {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = flume::bounded::<Frame>(1);

        let result = spawn_capture(BrokenSource, tx, running.clone());
        assert!(matches!(result, Err(DeviceError::Io(_))));
        // Sender was dropped with the failed pump
        assert!(rx.recv().is_err());
    }

    #[test]
    fn closed_channel_stops_the_pump() {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = flume::bounded::<Frame>(1);
        drop(rx);

        let source = ScriptedSource {
            reads: vec![Some(b"a"), Some(b"b")],
            started: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            running: running.clone(),
            seq: 0,
        };

        spawn_capture(source, tx, running.clone())
            .unwrap()
            .join()
            .unwrap();
        // Exited through the sink, not the flag
        assert!(running.load(Ordering::SeqCst));
    }
}
