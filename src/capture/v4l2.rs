//! V4L2 capture: open, negotiate and stream through memory-mapped buffers

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::capture::FrameSource;
use crate::error::{DeviceError, DeviceResult};
use crate::CaptureConfig;

/// Format actually applied by the driver after negotiation
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub card: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
    pub buffer_count: u32,
}

impl Negotiated {
    /// Human readable summary shown on the viewer page.
    pub fn stream_info(&self) -> String {
        format!(
            "{} - {} [{}x{}] {} fps",
            self.card, self.format, self.width, self.height, self.fps
        )
    }
}

/// V4L2 capture device
pub struct V4l2Capture {
    device: Device,
    stream: Option<MmapStream<'static>>,
    negotiated: Negotiated,
    sequence: u64,
}

impl V4l2Capture {
    /// Open the device and negotiate format, size and frame rate.
    #[instrument(skip(config), fields(device = %config.device))]
    pub fn open(config: &CaptureConfig) -> DeviceResult<Self> {
        info!("Opening V4L2 device");

        let device = Device::with_path(&config.device).map_err(|source| DeviceError::Open {
            path: config.device.clone(),
            source,
        })?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(DeviceError::NotCapture(config.device.clone()));
        }

        // Pick a pixel format the device actually offers
        let available: Vec<PixelFormat> = device
            .enum_formats()?
            .into_iter()
            .filter_map(|desc| PixelFormat::from_fourcc(desc.fourcc))
            .collect();
        debug!("Supported formats: {:?}", available);

        let format = choose_format(config.format, &available).ok_or_else(|| {
            DeviceError::UnsupportedFormat(PixelFormat::PREFERRED.to_vec())
        })?;
        if format != config.format {
            warn!(
                "Format {} not offered, using preferred fallback {}",
                config.format, format
            );
        }

        let sizes: Vec<FrameSizeEnum> = device
            .enum_framesizes(format.fourcc())?
            .into_iter()
            .map(|fs| fs.size)
            .collect();
        if !size_offered(&sizes, config.width, config.height) {
            return Err(DeviceError::UnsupportedSize {
                width: config.width,
                height: config.height,
                format,
            });
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = format.fourcc();
        let applied = device.set_format(&fmt)?;

        let params = device.set_params(&Parameters::with_fps(config.fps))?;
        let fps = if params.interval.numerator > 0 {
            params.interval.denominator / params.interval.numerator
        } else {
            config.fps
        };

        let format = PixelFormat::from_fourcc(applied.fourcc)
            .ok_or_else(|| DeviceError::UnknownFourcc(applied.fourcc.to_string()))?;

        let negotiated = Negotiated {
            card: caps.card,
            width: applied.width,
            height: applied.height,
            format,
            fps,
            buffer_count: config.buffer_count,
        };
        info!("Pixel format set to {}", negotiated.stream_info());

        Ok(Self {
            device,
            stream: None,
            negotiated,
            sequence: 0,
        })
    }

    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }
}

impl FrameSource for V4l2Capture {
    /// Start streaming with memory-mapped buffers
    fn start(&mut self) -> DeviceResult<()> {
        let stream = MmapStream::with_buffers(
            &self.device,
            Type::VideoCapture,
            self.negotiated.buffer_count,
        )?;

        self.stream = Some(stream);
        info!(
            "Capture stream started with {} buffers",
            self.negotiated.buffer_count
        );
        Ok(())
    }

    fn next_frame(&mut self) -> DeviceResult<Frame> {
        let stream = self.stream.as_mut().ok_or(DeviceError::NotStarted)?;

        let (buf, meta) = stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        let data = Bytes::copy_from_slice(&buf[..used]);

        self.sequence += 1;

        let frame_meta = Arc::new(FrameMetadata {
            sequence: self.sequence,
            width: self.negotiated.width,
            height: self.negotiated.height,
            format: self.negotiated.format,
        });

        Ok(Frame::new(data, frame_meta))
    }

    fn stop(&mut self) -> DeviceResult<()> {
        // Dropping the stream issues STREAMOFF and unmaps the buffers
        if self.stream.take().is_some() {
            info!("Capture stream stopped after {} frames", self.sequence);
        }
        Ok(())
    }
}

/// Requested format if offered, else the first offered preferred format.
pub fn choose_format(requested: PixelFormat, available: &[PixelFormat]) -> Option<PixelFormat> {
    if available.contains(&requested) {
        return Some(requested);
    }
    PixelFormat::PREFERRED
        .into_iter()
        .find(|preferred| available.contains(preferred))
}

/// Whether `width`x`height` is one of the enumerated frame sizes.
pub fn size_offered(sizes: &[FrameSizeEnum], width: u32, height: u32) -> bool {
    sizes.iter().any(|size| match size {
        FrameSizeEnum::Discrete(d) => d.width == width && d.height == height,
        FrameSizeEnum::Stepwise(s) => {
            let fits = |v: u32, min: u32, max: u32, step: u32| {
                v >= min && v <= max && (step == 0 || (v - min) % step == 0)
            };
            fits(width, s.min_width, s.max_width, s.step_width)
                && fits(height, s.min_height, s.max_height, s.step_height)
        }
    })
}
