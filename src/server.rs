// src/server.rs

//! Metrics exposition endpoint.
//!
//! A tiny axum app: an HTML landing page at `/` and the Prometheus text
//! encoding at the configured telemetry path.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::Result;
use crate::metrics::FileMetrics;

#[derive(Clone)]
struct AppState {
    metrics: Arc<FileMetrics>,
    telemetry_path: String,
}

/// Serve the exposition endpoint until the cancellation token fires.
pub async fn serve(
    addr: &str,
    telemetry_path: &str,
    metrics: Arc<FileMetrics>,
    cancel: CancellationToken,
) -> Result<()> {
    let app = router(telemetry_path, metrics);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics server to {addr}"))?;

    info!(addr = %addr, "starting metrics server");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("metrics server failed")?;

    info!("metrics server stopped");
    Ok(())
}

/// Build the router; separated from `serve` so tests can drive it directly.
pub fn router(telemetry_path: &str, metrics: Arc<FileMetrics>) -> Router {
    let telemetry_path = if telemetry_path.starts_with('/') {
        telemetry_path.to_string()
    } else {
        format!("/{telemetry_path}")
    };

    let state = AppState {
        metrics,
        telemetry_path: telemetry_path.clone(),
    };

    Router::new()
        .route("/", get(index))
        .route(&telemetry_path, get(render_metrics))
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>file-exporter</title></head>\n\
         <body>\n\
         <h1>file-exporter</h1>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         <p><i>version {}</i></p>\n\
         </body>\n\
         </html>",
        state.telemetry_path,
        env!("CARGO_PKG_VERSION"),
    ))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "unable to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
