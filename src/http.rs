//! HTTP transport for the prediction pipeline

use crate::error::ServiceError;
use crate::metrics::ServiceMetrics;
use crate::pipeline::ServiceContext;
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Header carrying the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<ServiceContext>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(context: ServiceContext, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            context: Arc::new(context),
            metrics,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .route("/predict", post(predict))
        .route("/metrics", get(metrics))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Prediction API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}

async fn home() -> impl IntoResponse {
    (StatusCode::OK, "Prediction API is running!")
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let predictor = state.context.predictor();
    Json(json!({
        "status": "ok",
        "backend": predictor.backend_name(),
        "device": predictor.device(),
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// `POST /predict`: run the full pipeline on the blocking pool
async fn predict(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let context = state.context.clone();
    let result = tokio::task::spawn_blocking(move || {
        context
            .handle(&body)
            .map(|predictions| (context.respond(&predictions), predictions))
    })
    .await
    .unwrap_or_else(|e| {
        let msg = if e.is_panic() {
            panic_message(e.into_panic())
        } else {
            e.to_string()
        };
        Err(ServiceError::internal(msg))
    });

    let elapsed = start.elapsed();
    let mut response = match result {
        Ok((body, predictions)) => {
            state.metrics.record_success(elapsed, &predictions);
            info!(
                request_id = %request_id,
                rows = predictions.len(),
                processing_time_us = elapsed.as_micros(),
                "Prediction served"
            );
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            state.metrics.record_error(e.kind(), elapsed);
            if e.status().is_server_error() {
                error!(request_id = %request_id, kind = e.kind(), error = %e, "Prediction failed");
            } else {
                warn!(request_id = %request_id, kind = e.kind(), error = %e, "Rejected request");
            }
            e.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Catch-all for panics escaping a handler
fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let msg = panic_message(payload);
    error!(error = %msg, "Handler panicked");
    ServiceError::internal(msg).into_response()
}

fn panic_message(payload: Box<dyn Any + Send + 'static>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
