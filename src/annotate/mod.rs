//! Face annotation: decode a frame, find faces, draw boxes, re-encode.

pub mod seeta;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::{error, info, warn};

use crate::error::AnnotateError;
use crate::AnnotationConfig;

pub use seeta::SeetaFinder;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_LINE_WIDTH: u32 = 3;
const JPEG_QUALITY: u8 = 90;

/// One detected face: a square region in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub size: u32,
    pub score: f64,
}

/// Face classifier seam. Implementations may keep state between frames.
pub trait FaceFinder: Send {
    fn find(&mut self, luma: &GrayImage) -> Vec<Detection>;
}

/// Decode `frame`, outline every detection scoring at least `threshold` and
/// return the result as JPEG.
pub fn annotate_jpeg(
    frame: &[u8],
    finder: &mut dyn FaceFinder,
    threshold: f64,
) -> Result<Vec<u8>, AnnotateError> {
    let img = image::load_from_memory(frame).map_err(AnnotateError::Decode)?;
    let detections = finder.find(&img.to_luma8());

    let mut canvas = img.to_rgb8();
    for det in detections.iter().filter(|d| d.score >= threshold) {
        // Nested outlines give the stroke its width
        for inset in 0..BOX_LINE_WIDTH {
            let size = det.size.saturating_sub(2 * inset);
            if size == 0 {
                break;
            }
            let rect = Rect::at(det.x + inset as i32, det.y + inset as i32).of_size(size, size);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }
    }

    let mut out = Vec::with_capacity(frame.len());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&canvas)
        .map_err(AnnotateError::Encode)?;
    Ok(out)
}

/// Whether frames are annotated before being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationState {
    Enabled,
    Disabled,
}

/// Runtime toggle plus the (optional) loaded classifier.
pub struct AnnotationControl {
    finder: Option<Mutex<Box<dyn FaceFinder>>>,
    enabled: AtomicBool,
    threshold: f64,
}

impl AnnotationControl {
    pub fn new(finder: Option<Box<dyn FaceFinder>>, threshold: f64) -> Self {
        Self {
            finder: finder.map(Mutex::new),
            enabled: AtomicBool::new(false),
            threshold,
        }
    }

    /// Load the classifier when annotation is configured. A load failure is
    /// logged and leaves annotation unavailable for the process lifetime.
    /// The returned control starts disabled.
    pub fn from_config(config: &AnnotationConfig) -> Self {
        if !config.enabled {
            return Self::unavailable();
        }
        match SeetaFinder::load(&config.model_path) {
            Ok(finder) => Self::new(Some(Box::new(finder)), config.threshold),
            Err(e) => {
                error!("failed to initialize face detection: {}", e);
                Self::unavailable()
            }
        }
    }

    /// No classifier; annotation can never be enabled.
    pub fn unavailable() -> Self {
        Self::new(None, 0.0)
    }

    pub fn available(&self) -> bool {
        self.finder.is_some()
    }

    pub fn state(&self) -> AnnotationState {
        if self.enabled.load(Ordering::Acquire) {
            AnnotationState::Enabled
        } else {
            AnnotationState::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == AnnotationState::Enabled
    }

    /// Enable annotation. Refused when no classifier was loaded.
    pub fn enable(&self) -> bool {
        if !self.available() {
            warn!("face detection not available, restart with --face and a valid model");
            self.enabled.store(false, Ordering::Release);
            return false;
        }
        self.enabled.store(true, Ordering::Release);
        true
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Apply a mode string from the `/face` endpoint. Unknown modes are ignored.
    pub fn set_mode(&self, mode: &str) -> AnnotationState {
        info!("Face mode = {}", mode);
        match mode {
            "true" | "on" | "enable" => {
                self.enable();
            }
            "off" | "disabled" => self.disable(),
            other => warn!("ignoring unknown face mode {:?}", other),
        }
        self.state()
    }

    /// Annotate one frame with the loaded classifier.
    pub fn annotate(&self, frame: &[u8]) -> Result<Vec<u8>, AnnotateError> {
        let finder = self.finder.as_ref().ok_or_else(|| AnnotateError::Model {
            path: String::new(),
            reason: "no classifier loaded".into(),
        })?;
        let mut finder = finder.lock().map_err(|_| AnnotateError::Poisoned)?;
        annotate_jpeg(frame, &mut **finder, self.threshold)
    }
}
