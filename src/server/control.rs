//! Fire-and-forget control endpoints. Bad input is logged, never reported back.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::{info, warn};

use crate::capture::CameraControls;
use crate::server::SharedContext;

/// Body of `POST /control`
#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Body of `POST /face`
#[derive(Debug, Deserialize)]
pub struct FaceModeRequest {
    #[serde(rename = "Mode")]
    pub mode: String,
}

pub async fn apply_control(State(ctx): State<SharedContext>, body: Bytes) -> StatusCode {
    let request: ControlRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("failed to decode control: {}", e);
            return StatusCode::OK;
        }
    };
    apply(ctx.controls.as_ref(), &request);
    StatusCode::OK
}

/// Apply one named control. Returns whether a setter was called successfully.
pub fn apply(controls: &dyn CameraControls, request: &ControlRequest) -> bool {
    let value: i32 = match request.value.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("invalid {} value {:?}: {}", request.name, request.value, e);
            return false;
        }
    };

    let result = match request.name.as_str() {
        "brightness" => controls.set_brightness(value),
        "contrast" => controls.set_contrast(value),
        "saturation" => controls.set_saturation(value),
        _ => return false,
    };

    match result {
        Ok(()) => {
            info!("applied control {}={}", request.name, value);
            metrics::counter!("lapse_controls_applied_total").increment(1);
            true
        }
        Err(e) => {
            warn!("failed to set {}: {}", request.name, e);
            false
        }
    }
}

pub async fn face_mode(State(ctx): State<SharedContext>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<FaceModeRequest>(&body) {
        Ok(request) => {
            ctx.annotation.set_mode(&request.mode);
        }
        Err(e) => warn!("failed to decode face mode: {}", e),
    }
    StatusCode::OK
}
