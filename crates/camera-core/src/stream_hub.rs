use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream;
use tracing::info;

use crate::frame::EncodedFrame;

const BOUNDARY: &str = "frame";

/// Holds the single most recently dispatched encoded frame behind a mutex
/// with a strictly short critical section: `write` replaces the slot,
/// `latest` clones the `Arc` out. A slow HTTP client never blocks the
/// pipeline; it just reads the same frame more than once.
pub struct StreamHub {
    slot: Mutex<Option<EncodedFrame>>,
    target_fps: u32,
    fatal: Arc<AtomicBool>,
}

impl StreamHub {
    /// `fatal` is shared with the camera's Reader/Dispatcher workers; once
    /// set, `/healthz` reports the camera as down without needing its own
    /// liveness bookkeeping.
    pub fn new(target_fps: u32, fatal: Arc<AtomicBool>) -> Self {
        Self {
            slot: Mutex::new(None),
            target_fps: target_fps.max(1),
            fatal,
        }
    }

    pub fn write(&self, frame: EncodedFrame) {
        let mut slot = self.slot.lock().expect("stream hub mutex poisoned");
        *slot = Some(frame);
    }

    pub fn latest(&self) -> Option<EncodedFrame> {
        self.slot.lock().expect("stream hub mutex poisoned").clone()
    }
}

/// Builds the axum router serving `/` as MJPEG multipart and `/healthz` as
/// a liveness probe. The pipeline stays synchronous/thread-based; this is
/// the one async edge adapter around it.
pub fn router(hub: std::sync::Arc<StreamHub>) -> Router {
    Router::new()
        .route("/", get(mjpeg_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(hub)
}

async fn healthz_handler(State(hub): State<std::sync::Arc<StreamHub>>) -> Response {
    let (status, body) = if hub.fatal.load(Ordering::Relaxed) {
        (StatusCode::SERVICE_UNAVAILABLE, r#"{"status":"error"}"#)
    } else {
        (StatusCode::OK, r#"{"status":"ok"}"#)
    };
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("well formed response")
}

async fn mjpeg_handler(State(hub): State<std::sync::Arc<StreamHub>>) -> Response {
    let interval = Duration::from_secs_f64(1.0 / hub.target_fps as f64);

    let body_stream = stream::unfold(hub, move |hub| async move {
        tokio::time::sleep(interval).await;
        let part = match hub.latest() {
            Some(frame) => {
                let mut chunk = Vec::with_capacity(frame.bytes.len() + 64);
                chunk.extend_from_slice(
                    format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").as_bytes(),
                );
                chunk.extend_from_slice(&frame.bytes);
                chunk.extend_from_slice(b"\r\n");
                chunk
            }
            None => Vec::new(),
        };
        Some((Ok::<_, std::io::Error>(part), hub))
    });

    let body = Body::from_stream(body_stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .body(body)
        .expect("well formed response")
}

/// Spawns the per-camera HTTP listener on the shared tokio runtime.
pub async fn serve(hub: std::sync::Arc<StreamHub>, port: u16) -> std::io::Result<()> {
    let app = router(hub);
    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "stream hub listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_reflects_most_recent_write() {
        let hub = StreamHub::new(10, Arc::new(AtomicBool::new(false)));
        assert!(hub.latest().is_none());
        hub.write(EncodedFrame::new(vec![1, 2, 3], 1.0));
        hub.write(EncodedFrame::new(vec![4, 5, 6], 2.0));
        let latest = hub.latest().expect("frame present");
        assert_eq!(*latest.bytes, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let hub = std::sync::Arc::new(StreamHub::new(10, Arc::new(AtomicBool::new(false))));
        let app = router(hub);
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_reports_error_once_fatal() {
        let fatal = Arc::new(AtomicBool::new(true));
        let hub = std::sync::Arc::new(StreamHub::new(10, fatal));
        let app = router(hub);
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
