pub mod annotate;
pub mod capture;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod timelapse;
pub mod utils;

use std::path::{Path, PathBuf};

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use capture::Frame;

/// Settings forced on the device when face annotation is requested,
/// so the classifier can keep up with the frame rate.
pub const FACE_FORMAT: PixelFormat = PixelFormat::Mjpeg;
pub const FACE_BUFFER_COUNT: u32 = 1;
pub const FACE_FPS: u32 = 5;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub server: ServerConfig,
    pub annotation: AnnotationConfig,
    pub pipeline: PipelineConfig,
    pub timelapse: TimelapseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address; `:9091` binds every interface
    pub port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    pub enabled: bool,
    /// SeetaFace frontal detection model, as shipped with rustface
    pub model_path: String,
    /// Minimum detection score that gets a box drawn
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Frames buffered per stream subscriber before the oldest are dropped
    pub distributor_capacity: usize,
    /// Frames buffered between the capture thread and the timelapse writer
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelapseConfig {
    pub count: u64,
    pub output_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Yuyv,
            buffer_count: 4,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: ":9091".into(),
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_path: "./seeta_fd_frontal_v1.0.bin".into(),
            threshold: 5.0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            distributor_capacity: 4,
            channel_capacity: 8,
        }
    }
}

impl Default for TimelapseConfig {
    fn default() -> Self {
        Self {
            count: 30000,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `LAPSE__SECTION__KEY` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("LAPSE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// Low-rate capture settings the face classifier can sustain.
    pub fn force_face_capture(&mut self) {
        self.annotation.enabled = true;
        self.capture.format = FACE_FORMAT;
        self.capture.buffer_count = FACE_BUFFER_COUNT;
        self.capture.fps = FACE_FPS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_classic_tool() {
        let config = Config::default();
        assert_eq!(config.capture.device, "/dev/video0");
        assert_eq!(config.capture.format, PixelFormat::Yuyv);
        assert_eq!(config.capture.buffer_count, 4);
        assert_eq!(config.server.port, ":9091");
        assert_eq!(config.timelapse.count, 30000);
        assert_eq!(config.annotation.threshold, 5.0);
        assert!(config.annotation.model_path.ends_with(".bin"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[capture]\nwidth = 1280\nheight = 720\nformat = \"mjpeg\"\n\n[server]\nport = \":8080\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.height, 720);
        assert_eq!(config.capture.format, PixelFormat::Mjpeg);
        assert_eq!(config.server.port, ":8080");
        // Untouched keys keep their defaults
        assert_eq!(config.capture.fps, 30);
        assert_eq!(config.pipeline.distributor_capacity, 4);
    }

    #[test]
    fn environment_overrides_defaults() {
        // Keys not asserted by the file-based test, which loads concurrently
        std::env::set_var("LAPSE__CAPTURE__BUFFER_COUNT", "2");
        std::env::set_var("LAPSE__TIMELAPSE__COUNT", "120");
        let config = Config::load(None);
        std::env::remove_var("LAPSE__CAPTURE__BUFFER_COUNT");
        std::env::remove_var("LAPSE__TIMELAPSE__COUNT");

        let config = config.unwrap();
        assert_eq!(config.capture.buffer_count, 2);
        assert_eq!(config.timelapse.count, 120);
        assert_eq!(config.capture.device, "/dev/video0");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/lapse.toml"))).is_err());
    }

    #[test]
    fn face_mode_forces_low_rate_capture() {
        let mut config = Config::default();
        config.force_face_capture();
        assert!(config.annotation.enabled);
        assert_eq!(config.capture.format, PixelFormat::Mjpeg);
        assert_eq!(config.capture.buffer_count, 1);
        assert_eq!(config.capture.fps, 5);
    }
}
