use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use v4l::FourCC;

/// One encoded image as delivered by the device.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - shared across subscribers without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// When the frame left the device, for latency tracking
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(data: Bytes, meta: Arc<FrameMetadata>) -> Self {
        Self {
            data,
            meta,
            timestamp: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time since capture
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("sequence", &self.meta.sequence)
            .field("format", &self.meta.format)
            .finish()
    }
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Pixel formats a capture device can be negotiated to
/// Serialized by name, parsed the same way as the `-f` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PixelFormat {
    Jpeg,
    Mjpeg,
    Mpeg,
    H264,
    Yuyv,
    Rgb24,
}

impl PixelFormat {
    /// Preference order used when the requested format is not offered.
    pub const PREFERRED: [PixelFormat; 4] = [
        PixelFormat::Mpeg,
        PixelFormat::Mjpeg,
        PixelFormat::Jpeg,
        PixelFormat::Yuyv,
    ];

    /// Parse a user-supplied format name. Unknown names fall back to MPEG.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" => PixelFormat::Jpeg,
            "mjpeg" => PixelFormat::Mjpeg,
            "mpeg" => PixelFormat::Mpeg,
            "h264" | "h.264" => PixelFormat::H264,
            "yuyv" => PixelFormat::Yuyv,
            "rgb" | "rgb24" => PixelFormat::Rgb24,
            other => {
                warn!("Unknown pixel format {:?}, falling back to mpeg", other);
                PixelFormat::Mpeg
            }
        }
    }

    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Jpeg => FourCC::new(b"JPEG"),
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Mpeg => FourCC::new(b"MPEG"),
            PixelFormat::H264 => FourCC::new(b"H264"),
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"JPEG" => Some(PixelFormat::Jpeg),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            b"MPEG" => Some(PixelFormat::Mpeg),
            b"H264" => Some(PixelFormat::H264),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }

    /// Whether frames in this format are self-contained images we can decode.
    pub fn is_jpeg(self) -> bool {
        matches!(self, PixelFormat::Jpeg | PixelFormat::Mjpeg)
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Jpeg => "jpeg",
            PixelFormat::Mjpeg => "mjpeg",
            PixelFormat::Mpeg => "mpeg",
            PixelFormat::H264 => "h264",
            PixelFormat::Yuyv => "yuyv",
            PixelFormat::Rgb24 => "rgb",
        }
    }
}

impl From<String> for PixelFormat {
    fn from(name: String) -> Self {
        PixelFormat::from_name(&name)
    }
}

impl From<PixelFormat> for String {
    fn from(format: PixelFormat) -> Self {
        format.name().to_string()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
