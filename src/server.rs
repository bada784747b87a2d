//! HTTP Server
//!
//! Serves Prometheus metrics and health probes:
//!
//! - `/metrics` - Prometheus text format
//! - `/healthz`, `/livez` - always ok while the process is up
//! - `/readyz` - ok only while the publish loop is running

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain::ports::LoopState;
use crate::error::{Error, Result};
use crate::metrics::PrometheusEventPublisher;

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    metrics: Arc<PrometheusEventPublisher>,
    loop_state: watch::Receiver<LoopState>,
}

impl HttpState {
    pub fn new(
        metrics: Arc<PrometheusEventPublisher>,
        loop_state: watch::Receiver<LoopState>,
    ) -> Self {
        Self {
            metrics,
            loop_state,
        }
    }

    /// Route a request path to a response.
    pub fn respond(&self, path: &str) -> Response<Full<Bytes>> {
        match path {
            "/metrics" => match self.metrics.encode() {
                Ok(buffer) => response(StatusCode::OK, &self.metrics.content_type(), buffer),
                Err(e) => {
                    error!("Metrics encoding failed: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                }
            },
            "/healthz" | "/livez" => text(StatusCode::OK, "ok"),
            "/readyz" => {
                let state = *self.loop_state.borrow();
                if state.is_running() {
                    text(StatusCode::OK, "ok")
                } else {
                    text(StatusCode::SERVICE_UNAVAILABLE, &state.to_string())
                }
            }
            _ => text(StatusCode::NOT_FOUND, "not found"),
        }
    }
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    response(status, "text/plain", body.as_bytes().to_vec())
}

fn response(status: StatusCode, content_type: &str, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn run_http_server(
    addr: &str,
    state: HttpState,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid HTTP server address {}: {}", addr, e)))?;

    let listener = TcpListener::bind(addr).await?;

    info!("HTTP server listening on {}", addr);

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("HTTP server stopping");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = state.respond(req.uri().path());
                async move { Ok::<_, std::convert::Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer, "HTTP connection error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::PublisherEvent;
    use crate::domain::ports::EventPublisher;
    use http_body_util::BodyExt;

    fn state(loop_state: LoopState) -> (HttpState, watch::Sender<LoopState>) {
        let metrics = Arc::new(PrometheusEventPublisher::new().unwrap());
        let (tx, rx) = watch::channel(loop_state);
        (HttpState::new(metrics, rx), tx)
    }

    async fn body(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let (state, _tx) = state(LoopState::Stopped);
        assert_eq!(state.respond("/healthz").status(), StatusCode::OK);
        assert_eq!(state.respond("/livez").status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_follows_loop_state() {
        let (state, tx) = state(LoopState::Starting);

        let response = state.respond("/readyz");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body(response).await, "starting");

        tx.send_replace(LoopState::Running);
        assert_eq!(state.respond("/readyz").status(), StatusCode::OK);

        tx.send_replace(LoopState::Stopping);
        assert_eq!(
            state.respond("/readyz").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, _tx) = state(LoopState::Running);
        state
            .metrics
            .publish(PublisherEvent::users_loaded(4))
            .await
            .unwrap();

        let response = state.respond("/metrics");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(response).await.contains("vitals_publisher_users 4"));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let (state, _tx) = state(LoopState::Running);
        assert_eq!(state.respond("/nope").status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_address_in_use_is_io_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let (state, _tx) = state(LoopState::Running);
        let result = run_http_server(&addr, state, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_server() {
        let (state, _tx) = state(LoopState::Running);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = run_http_server("127.0.0.1:0", state, shutdown).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let (state, _tx) = state(LoopState::Running);
        let result = run_http_server("not-an-address", state, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
