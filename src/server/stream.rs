//! `multipart/x-mixed-replace` MJPEG stream, one part per frame.

use std::convert::Infallible;

use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::Stream;
use rand::Rng;
use tracing::{debug, error, info, instrument, warn};

use crate::server::SharedContext;

/// Fresh random boundary for one connection.
pub fn new_boundary() -> String {
    let mut rng = rand::thread_rng();
    (0..15).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

/// One MIME part carrying a JPEG image.
pub fn encode_part(boundary: &str, jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        boundary,
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

#[instrument(skip_all)]
pub async fn serve_stream(State(ctx): State<SharedContext>) -> Response {
    let boundary = new_boundary();
    info!(subscribers = ctx.frames.subscriber_count() + 1, "stream client connected");

    let content_type = format!("multipart/x-mixed-replace; boundary={}", boundary);
    let body = Body::from_stream(frame_parts(ctx, boundary));

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

/// Parts for every frame published after this call. Dropping the stream
/// (client disconnect) releases the subscription.
pub fn frame_parts(
    ctx: SharedContext,
    boundary: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let mut frames = ctx.frames.subscribe();

    stream! {
        while let Some(frame) = frames.recv().await {
            if frame.is_empty() {
                debug!("skipping empty frame");
                continue;
            }

            let payload = if ctx.annotation.is_enabled() {
                let annotation = ctx.annotation.clone();
                let data = frame.data.clone();
                match tokio::task::spawn_blocking(move || annotation.annotate(&data)).await {
                    Ok(Ok(jpeg)) => Bytes::from(jpeg),
                    Ok(Err(e)) => {
                        warn!(sequence = frame.meta.sequence, "face detection failed: {}", e);
                        continue;
                    }
                    Err(e) => {
                        error!("annotation task failed: {}", e);
                        continue;
                    }
                }
            } else {
                frame.data.clone()
            };

            let age = frame.age();
            metrics::histogram!("lapse_stream_latency_seconds").record(age.as_secs_f64());
            debug!(sequence = frame.meta.sequence, latency_ms = age.as_millis() as u64, "frame sent");
            yield Ok(encode_part(&boundary, &payload));
        }
        debug!("frame source closed, ending stream");
    }
}
