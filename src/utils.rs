use std::path::Path;

use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device};

use crate::capture::frame::PixelFormat;
use crate::error::{DeviceError, DeviceResult};

/// Current format of a device, used as command-line defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDefaults {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Auto-detect the first capture device offering MJPEG or YUYV
pub fn auto_detect_device() -> DeviceResult<String> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        if let Ok(formats) = dev.enum_formats() {
            for fmt in formats {
                match PixelFormat::from_fourcc(fmt.fourcc) {
                    Some(PixelFormat::Mjpeg) | Some(PixelFormat::Yuyv) => {
                        info!("Found {} device: {} - {}", fmt.fourcc, path, caps.card);
                        return Ok(path);
                    }
                    _ => {}
                }
            }
        }
    }

    Err(DeviceError::NotFound)
}

/// Read the device's current size and format without starting a stream.
/// Formats other than MJPEG and H.264 are reported as YUYV.
pub fn probe_defaults(path: &str) -> Option<DeviceDefaults> {
    let dev = Device::with_path(path).ok()?;
    let fmt = dev.format().ok()?;
    let format = match PixelFormat::from_fourcc(fmt.fourcc) {
        Some(PixelFormat::Mjpeg) => PixelFormat::Mjpeg,
        Some(PixelFormat::H264) => PixelFormat::H264,
        _ => PixelFormat::Yuyv,
    };
    debug!("Device {} currently {}x{} {}", path, fmt.width, fmt.height, format);
    // The probe handle closes here, before the capture handle is opened
    Some(DeviceDefaults {
        width: fmt.width,
        height: fmt.height,
        format,
    })
}
