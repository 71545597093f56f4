//! Camera control setters

use std::sync::Mutex;

use tracing::debug;
use v4l::control::{Control, Value};
use v4l::Device;

use crate::error::{DeviceError, DeviceResult};

const V4L2_CID_BRIGHTNESS: u32 = 0x0098_0900;
const V4L2_CID_CONTRAST: u32 = 0x0098_0901;
const V4L2_CID_SATURATION: u32 = 0x0098_0902;

/// Image controls exposed over HTTP. Each call is a single self-contained ioctl.
pub trait CameraControls: Send + Sync {
    fn set_brightness(&self, value: i32) -> DeviceResult<()>;
    fn set_contrast(&self, value: i32) -> DeviceResult<()>;
    fn set_saturation(&self, value: i32) -> DeviceResult<()>;
}

/// Controls backed by a dedicated handle on the capture device.
pub struct V4l2Controls {
    device: Mutex<Device>,
}

impl V4l2Controls {
    pub fn open(path: &str) -> DeviceResult<Self> {
        let device = Device::with_path(path).map_err(|source| DeviceError::Open {
            path: path.to_string(),
            source,
        })?;
        Ok(Self {
            device: Mutex::new(device),
        })
    }

    fn set(&self, id: u32, value: i32) -> DeviceResult<()> {
        let device = self
            .device
            .lock()
            .map_err(|_| DeviceError::Io(std::io::Error::other("control handle poisoned")))?;
        device.set_control(Control {
            id,
            value: Value::Integer(value as i64),
        })?;
        debug!(id, value, "control applied");
        Ok(())
    }
}

impl CameraControls for V4l2Controls {
    fn set_brightness(&self, value: i32) -> DeviceResult<()> {
        self.set(V4L2_CID_BRIGHTNESS, value)
    }

    fn set_contrast(&self, value: i32) -> DeviceResult<()> {
        self.set(V4L2_CID_CONTRAST, value)
    }

    fn set_saturation(&self, value: i32) -> DeviceResult<()> {
        self.set(V4L2_CID_SATURATION, value)
    }
}
