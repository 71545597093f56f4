pub mod distributor;
pub mod pump;

pub use distributor::{DistributorStats, FrameDistributor, FrameSubscription, Published};
pub use pump::{spawn_capture, FrameSink};
