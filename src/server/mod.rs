//! HTTP surface: viewer page, multipart stream and control endpoints.

pub mod control;
pub mod page;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::annotate::AnnotationControl;
use crate::capture::CameraControls;
use crate::pipeline::FrameDistributor;

pub use page::PageInfo;

/// Everything the handlers share, owned explicitly instead of living in globals.
pub struct AppContext {
    pub frames: FrameDistributor,
    pub controls: Arc<dyn CameraControls>,
    pub annotation: Arc<AnnotationControl>,
    pub page: PageInfo,
}

pub type SharedContext = Arc<AppContext>;

pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/timelapse", get(page::serve_page))
        .route("/webcam", get(page::serve_page))
        .route("/stream", get(stream::serve_stream))
        .route("/control", post(control::apply_control))
        .route("/face", post(control::face_mode))
        .with_state(ctx)
}

/// Parse a Go-style listen address; a bare `:port` binds every interface.
pub fn listen_addr(port: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    if let Some(bare) = port.strip_prefix(':') {
        format!("0.0.0.0:{}", bare).parse()
    } else if !port.contains(':') {
        format!("0.0.0.0:{}", port).parse()
    } else {
        port.parse()
    }
}

/// Serve forever. Stream responses never complete on their own, so callers
/// stop the server by dropping this future rather than draining connections.
pub async fn serve(ctx: SharedContext, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!("Starting server on http://{}", local);
    info!("use url path /timelapse or /webcam");

    axum::serve(listener, router(ctx)).await
}
