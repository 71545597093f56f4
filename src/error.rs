use std::io;

use thiserror::Error;

use crate::capture::PixelFormat;

/// Failures while opening or negotiating a capture device. All of them abort startup.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("device {0} does not support video capture")]
    NotCapture(String),

    #[error("device does not support any of {0:?}")]
    UnsupportedFormat(Vec<PixelFormat>),

    #[error("size {width}x{height} not supported for format {format}")]
    UnsupportedSize {
        width: u32,
        height: u32,
        format: PixelFormat,
    },

    #[error("device reported unknown pixel format {0}")]
    UnknownFourcc(String),

    #[error("capture stream not started")]
    NotStarted,

    #[error("no suitable capture device found")]
    NotFound,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures in the annotation stage. Per-frame errors only skip that frame.
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("failed to decode frame: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode annotated frame: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to load face classifier from {path}: {reason}")]
    Model { path: String, reason: String },

    #[error("face classifier lock poisoned")]
    Poisoned,
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;
