//! SeetaFace cascade classifier (via `rustface`) on a dedicated worker thread.
//!
//! The rustface detector is not `Send`, so it is created and used on its own
//! thread; `SeetaFinder` is the handle callers hold.

use std::thread;

use image::GrayImage;
use rustface::{Detector, ImageData};
use tracing::{error, info};

use crate::annotate::{Detection, FaceFinder};
use crate::error::AnnotateError;

/// Smallest face searched for, in pixels
pub const MIN_FACE_SIZE: u32 = 100;
/// Largest face searched for, in pixels
pub const MAX_FACE_SIZE: u32 = 600;
/// Window shift as a fraction of the detector window
pub const SHIFT_FACTOR: f32 = 0.15;
/// Pyramid growth between scales
pub const SCALE_FACTOR: f32 = 1.1;

const WINDOW_SIZE: u32 = 40;
const SCORE_FLOOR: f64 = 2.0;

type Request = (GrayImage, flume::Sender<Vec<Detection>>);

pub struct SeetaFinder {
    requests: flume::Sender<Request>,
}

impl SeetaFinder {
    /// Load the model at `path` and start the classifier thread.
    pub fn load(path: &str) -> Result<Self, AnnotateError> {
        let (requests, incoming) = flume::unbounded::<Request>();
        let (ready_tx, ready_rx) = flume::bounded::<Result<(), String>>(1);
        let model_path = path.to_string();

        thread::Builder::new()
            .name("lapse-faces".into())
            .spawn(move || {
                let mut detector = match rustface::create_detector(&model_path) {
                    Ok(detector) => detector,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                configure(detector.as_mut());
                let _ = ready_tx.send(Ok(()));
                info!("Face classifier loaded from {}", model_path);

                for (luma, reply) in incoming {
                    let (width, height) = luma.dimensions();
                    let image = ImageData::new(luma.as_raw(), width, height);
                    let found = detector
                        .detect(&image)
                        .into_iter()
                        .map(|face| {
                            let bbox = face.bbox();
                            Detection {
                                x: bbox.x(),
                                y: bbox.y(),
                                size: bbox.width().max(bbox.height()),
                                score: face.score(),
                            }
                        })
                        .collect();
                    let _ = reply.send(found);
                }
            })
            .map_err(|e| AnnotateError::Model {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { requests }),
            Ok(Err(reason)) => Err(AnnotateError::Model {
                path: path.to_string(),
                reason,
            }),
            Err(_) => Err(AnnotateError::Model {
                path: path.to_string(),
                reason: "classifier thread exited during load".into(),
            }),
        }
    }
}

fn configure(detector: &mut dyn Detector) {
    let step = ((WINDOW_SIZE as f32 * SHIFT_FACTOR).round() as u32).max(1);
    detector.set_window_size(WINDOW_SIZE);
    detector.set_slide_window_step(step, step);
    detector.set_min_face_size(MIN_FACE_SIZE);
    detector.set_max_face_size(MAX_FACE_SIZE);
    detector.set_pyramid_scale_factor(1.0 / SCALE_FACTOR);
    detector.set_score_thresh(SCORE_FLOOR);
}

impl FaceFinder for SeetaFinder {
    fn find(&mut self, luma: &GrayImage) -> Vec<Detection> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        if self.requests.send((luma.clone(), reply_tx)).is_err() {
            error!("face classifier thread is gone");
            return Vec::new();
        }
        reply_rx.recv().unwrap_or_default()
    }
}
