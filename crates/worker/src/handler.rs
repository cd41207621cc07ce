//! Top-level job handler.
//!
//! Turns every outcome of [`JobPipeline::run`] into a [`JobResponse`].
//! The pipeline runs on its own task so that even a panic comes back
//! as an `{"error": ...}` response instead of reaching the caller.

use std::sync::Arc;

use runbridge_core::job::JobResponse;
use serde_json::Value;

use crate::pipeline::JobPipeline;

/// Run one job and produce the caller-facing response.
pub async fn handle(pipeline: Arc<JobPipeline>, event: Value) -> JobResponse {
    let task = tokio::spawn(async move { pipeline.run(event).await });

    match task.await {
        Ok(Ok(images)) => {
            tracing::info!(count = images.len(), "Job completed");
            JobResponse::images(images)
        }
        Ok(Err(e)) if e.is_unexpected() => {
            tracing::error!(error = ?e, "Handler exception");
            JobResponse::error(e.response_message())
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Job failed");
            JobResponse::error(e.response_message())
        }
        Err(join_err) => {
            let detail = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                join_err.to_string()
            };
            tracing::error!(error = %detail, "Handler exception: job task aborted");
            JobResponse::error(format!("Handler exception: {detail}"))
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
