pub mod controls;
pub mod frame;
pub mod v4l2;

pub use controls::{CameraControls, V4l2Controls};
pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use v4l2::{Negotiated, V4l2Capture};

use crate::error::DeviceResult;

/// Blocking source of encoded frames with a start/stop lifecycle.
pub trait FrameSource: Send {
    fn start(&mut self) -> DeviceResult<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> DeviceResult<Frame>;

    fn stop(&mut self) -> DeviceResult<()>;
}
