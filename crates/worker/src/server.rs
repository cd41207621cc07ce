//! HTTP invocation surface.
//!
//! The serverless runtime delivers jobs to `POST /runsync` and reads
//! the handler's response from the reply body. Jobs are serialized:
//! a process runs at most one job at a time.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::{Json, Router};
use runbridge_core::job::JobResponse;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handler::handle;
use crate::pipeline::JobPipeline;

/// Shared state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<JobPipeline>,
    /// Held for the duration of a job.
    pub job_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pipeline: Arc<JobPipeline>) -> Self {
        Self {
            pipeline,
            job_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when the engine answers its liveness probe, else `degraded`.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub engine_ready: bool,
}

/// GET /health -- worker and engine health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine_ready = state.pipeline.api().system_stats().await.is_ok();

    Json(HealthResponse {
        status: if engine_ready { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        engine_ready,
    })
}

/// POST /runsync -- run one job and return its response.
///
/// A body that is not a JSON document is answered like any other job
/// failure, with an `error` field.
async fn run_sync(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Json<JobResponse> {
    let event = match payload {
        Ok(Json(event)) => event,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Rejected job request body");
            return Json(JobResponse::error(format!(
                "Invalid job input: {}",
                rejection.body_text()
            )));
        }
    };

    let _guard = state.job_lock.lock().await;
    Json(handle(Arc::clone(&state.pipeline), event).await)
}

/// Build the router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(health_check))
        .route("/runsync", post(run_sync))
        // Panic recovery: catch panics and return 500.
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}
