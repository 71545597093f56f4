use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lapse::capture::PixelFormat;
use lapse::utils::DeviceDefaults;
use lapse::Config;

#[derive(Debug, Parser)]
#[command(name = "lapse", version, about = "Webcam streaming and timelapse capture")]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream the camera as MJPEG over HTTP
    Serve(ServeArgs),
    /// Save a fixed number of frames to disk
    Capture(CaptureArgs),
}

#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Device name (path)
    #[arg(short = 'd', long)]
    pub device: Option<String>,

    /// Capture width
    #[arg(short = 'w', long)]
    pub width: Option<u32>,

    /// Capture height
    #[arg(short = 'H', long)]
    pub height: Option<u32>,

    /// Pixel format (jpeg, mjpeg, mpeg, h264, yuyv, rgb)
    #[arg(short = 'f', long)]
    pub format: Option<String>,

    /// Frames per second
    #[arg(short = 'r', long)]
    pub fps: Option<u32>,

    /// Device buffer count
    #[arg(short = 'b', long)]
    pub buffers: Option<u32>,

    /// Turn on face detection (forces mjpeg, 1 buffer, 5 fps)
    #[arg(long)]
    pub face: bool,

    /// SeetaFace detection model file (seeta_fd_frontal_v1.0.bin)
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Service port, e.g. ":9091"
    #[arg(short = 'p', long)]
    pub port: Option<String>,
}

#[derive(Debug, Args)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Number of frames to capture
    #[arg(short = 'c', long)]
    pub count: Option<u64>,

    /// Directory the frames are written to
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

impl DeviceArgs {
    /// Overlay command-line flags on the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        let capture = &mut config.capture;
        if let Some(device) = &self.device {
            capture.device = device.clone();
        }
        if let Some(width) = self.width {
            capture.width = width;
        }
        if let Some(height) = self.height {
            capture.height = height;
        }
        if let Some(format) = &self.format {
            capture.format = PixelFormat::from_name(format);
        }
        if let Some(fps) = self.fps {
            capture.fps = fps;
        }
        if let Some(buffers) = self.buffers {
            capture.buffer_count = buffers;
        }
        if let Some(model) = &self.model {
            config.annotation.model_path = model.clone();
        }
        if self.face || config.annotation.enabled {
            config.force_face_capture();
        }
    }
}

impl ServeArgs {
    pub fn apply(&self, config: &mut Config) {
        self.device.apply(config);
        if let Some(port) = &self.port {
            config.server.port = port.clone();
        }
    }
}

impl CaptureArgs {
    pub fn apply(&self, config: &mut Config) {
        self.device.apply(config);
        if let Some(count) = self.count {
            config.timelapse.count = count;
        }
        if let Some(output) = &self.output {
            config.timelapse.output_dir = output.clone();
        }
    }
}

/// Seed size and format from what the device is currently set to.
pub fn apply_device_defaults(config: &mut Config, defaults: DeviceDefaults) {
    config.capture.width = defaults.width;
    config.capture.height = defaults.height;
    config.capture.format = defaults.format;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn serve_flags_override_config() {
        let cli = parse(&[
            "lapse", "serve", "-d", "/dev/video2", "-w", "1280", "-H", "720", "-f", "MJPEG", "-r",
            "15", "-b", "2", "-p", ":8080",
        ]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.capture.device, "/dev/video2");
        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.height, 720);
        assert_eq!(config.capture.format, PixelFormat::Mjpeg);
        assert_eq!(config.capture.fps, 15);
        assert_eq!(config.capture.buffer_count, 2);
        assert_eq!(config.server.port, ":8080");
        assert!(!config.annotation.enabled);
    }

    #[test]
    fn face_flag_wins_over_explicit_rate() {
        let cli = parse(&["lapse", "capture", "--face", "-r", "30", "-f", "yuyv", "-c", "10"]);
        let Command::Capture(args) = cli.command else {
            panic!("expected capture");
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert!(config.annotation.enabled);
        assert_eq!(config.capture.fps, 5);
        assert_eq!(config.capture.buffer_count, 1);
        assert_eq!(config.capture.format, PixelFormat::Mjpeg);
        assert_eq!(config.timelapse.count, 10);
    }

    #[test]
    fn unset_flags_leave_config_alone() {
        let cli = parse(&["lapse", "--config", "lapse.toml", "capture"]);
        assert_eq!(cli.config, Some(PathBuf::from("lapse.toml")));
        let Command::Capture(args) = cli.command else {
            panic!("expected capture");
        };
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.timelapse.output_dir, PathBuf::from("."));
    }

    #[test]
    fn device_defaults_seed_capture_settings() {
        let mut config = Config::default();
        apply_device_defaults(
            &mut config,
            DeviceDefaults {
                width: 1920,
                height: 1080,
                format: PixelFormat::H264,
            },
        );
        assert_eq!(config.capture.width, 1920);
        assert_eq!(config.capture.format, PixelFormat::H264);
    }
}
