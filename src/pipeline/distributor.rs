//! Single-producer, many-subscriber frame fan-out
//!
//! Every subscriber gets a bounded window of `capacity` frames. A subscriber
//! that falls further behind loses its oldest frames and resumes from the
//! oldest one still retained; the producer never blocks on slow consumers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::capture::Frame;

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// Frame was broadcast to this many subscribers
    Delivered(usize),
    /// Zero-length frame, discarded
    Empty,
}

#[derive(Default)]
struct Stats {
    published: AtomicU64,
    empty: AtomicU64,
    lagged: AtomicU64,
}

/// Snapshot of distributor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributorStats {
    pub published: u64,
    pub empty: u64,
    pub lagged: u64,
    pub subscribers: usize,
}

#[derive(Clone)]
pub struct FrameDistributor {
    tx: broadcast::Sender<Frame>,
    stats: Arc<Stats>,
}

impl FrameDistributor {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            stats: Arc::new(Stats::default()),
        }
    }

    /// Producer: hand a frame to every current subscriber.
    pub fn publish(&self, frame: Frame) -> Published {
        if frame.is_empty() {
            warn!(sequence = frame.meta.sequence, "received frame size 0, skipping");
            self.stats.empty.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("lapse_frames_empty_total").increment(1);
            return Published::Empty;
        }

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("lapse_frames_published_total").increment(1);

        // An error only means nobody is listening right now
        Published::Delivered(self.tx.send(frame).unwrap_or(0))
    }

    pub fn subscribe(&self) -> FrameSubscription {
        FrameSubscription {
            rx: self.tx.subscribe(),
            stats: self.stats.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn stats(&self) -> DistributorStats {
        DistributorStats {
            published: self.stats.published.load(Ordering::Relaxed),
            empty: self.stats.empty.load(Ordering::Relaxed),
            lagged: self.stats.lagged.load(Ordering::Relaxed),
            subscribers: self.tx.receiver_count(),
        }
    }
}

/// Consumer side of the distributor, one per stream session.
pub struct FrameSubscription {
    rx: broadcast::Receiver<Frame>,
    stats: Arc<Stats>,
}

impl FrameSubscription {
    /// Next frame in arrival order, or `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "stream subscriber lagging, frames dropped");
                    self.stats.lagged.fetch_add(skipped, Ordering::Relaxed);
                    metrics::counter!("lapse_frames_lagged_total").increment(skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameMetadata, PixelFormat};
    use bytes::Bytes;

    fn frame(seq: u64, data: &'static [u8]) -> Frame {
        Frame::new(
            Bytes::from_static(data),
            Arc::new(FrameMetadata {
                sequence: seq,
                width: 2,
                height: 2,
                format: PixelFormat::Mjpeg,
            }),
        )
    }

    #[tokio::test]
    async fn subscribers_see_frames_in_order() {
        let dist = FrameDistributor::new(8);
        let mut a = dist.subscribe();
        let mut b = dist.subscribe();

        for seq in 1..=3 {
            assert_eq!(dist.publish(frame(seq, b"jpeg")), Published::Delivered(2));
        }

        for sub in [&mut a, &mut b] {
            for seq in 1..=3 {
                assert_eq!(sub.recv().await.map(|f| f.meta.sequence), Some(seq));
            }
        }
    }

    #[tokio::test]
    async fn empty_frames_are_never_delivered() {
        let dist = FrameDistributor::new(4);
        let mut sub = dist.subscribe();

        assert_eq!(dist.publish(frame(1, b"")), Published::Empty);
        dist.publish(frame(2, b"x"));

        assert_eq!(sub.recv().await.map(|f| f.meta.sequence), Some(2));
        let stats = dist.stats();
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.published, 1);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_frame_notice_visible_at_info() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let dist = FrameDistributor::new(2);
        tracing::subscriber::with_default(subscriber, || {
            dist.publish(frame(7, b""));
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("received frame size 0"), "{}", output);
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest() {
        let dist = FrameDistributor::new(2);
        let mut sub = dist.subscribe();

        for seq in 1..=5 {
            dist.publish(frame(seq, b"x"));
        }

        // Only the newest `capacity` frames are retained
        assert_eq!(sub.recv().await.map(|f| f.meta.sequence), Some(4));
        assert_eq!(sub.recv().await.map(|f| f.meta.sequence), Some(5));
        assert_eq!(dist.stats().lagged, 3);
    }

    #[tokio::test]
    async fn closed_distributor_ends_subscription() {
        let dist = FrameDistributor::new(2);
        let mut sub = dist.subscribe();
        dist.publish(frame(1, b"x"));
        drop(dist);

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let dist = FrameDistributor::new(2);
        assert_eq!(dist.publish(frame(1, b"x")), Published::Delivered(0));
        assert_eq!(dist.subscriber_count(), 0);
    }
}
