//! The per-job pipeline.
//!
//! `validate -> stage images -> patch workflow -> queue -> poll ->
//! collect outputs`, stopping at the first failing gate. Each run is
//! independent; nothing is kept between jobs and partially staged
//! inputs are not cleaned up.

use std::sync::Arc;

use runbridge_comfyui::api::ComfyUIApi;
use runbridge_comfyui::backoff::Backoff;
use runbridge_comfyui::history::HistoryEntry;
use runbridge_comfyui::poll::{wait_for_completion, PollConfig};
use runbridge_core::config::WorkerConfig;
use runbridge_core::job::{JobEvent, OutputImage, ValidatedJob};
use runbridge_core::staging::{stage_image, StagedInputs};
use runbridge_core::workflow::{patch_workflow, WorkflowGraph};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::outputs::read_output_images;

/// Runs jobs against one ComfyUI instance.
pub struct JobPipeline {
    config: Arc<WorkerConfig>,
    api: ComfyUIApi,
    cancel: CancellationToken,
}

impl JobPipeline {
    pub fn new(config: Arc<WorkerConfig>, api: ComfyUIApi) -> Self {
        Self {
            config,
            api,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to abandon in-flight polling (e.g. on shutdown).
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    /// Execute one job end to end.
    pub async fn run(&self, event: Value) -> Result<Vec<OutputImage>, PipelineError> {
        let job = JobEvent::from_value(event)?
            .input
            .validate(&self.config.node_bindings)?;

        let ValidatedJob {
            mut workflow,
            face_image,
            body_image,
            bindings,
        } = job;

        let staged = StagedInputs::generate();
        tracing::info!(
            face = %staged.face_filename,
            body = %staged.body_filename,
            "Saving input images",
        );
        stage_image(&self.config.input_dir, &face_image, &staged.face_filename).await?;
        stage_image(&self.config.input_dir, &body_image, &staged.body_filename).await?;

        patch_workflow(&mut workflow, &bindings, &staged);

        let prompt_id = self.queue(&workflow).await.ok_or(PipelineError::QueueFailed)?;

        wait_for_completion(&self.api, &prompt_id, &self.poll_config(), &self.cancel).await?;

        let images = self.collect_outputs(&prompt_id).await?;
        if images.is_empty() {
            return Err(PipelineError::NoOutputs);
        }
        Ok(images)
    }

    /// Submit the workflow. Every failure is logged and reported as
    /// `None`.
    pub async fn queue(&self, workflow: &WorkflowGraph) -> Option<String> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let prompt = Value::Object(workflow.clone());

        match self.api.submit_workflow(&prompt, &client_id).await {
            Ok(response) if !response.prompt_id.is_empty() => {
                if has_node_errors(&response.node_errors) {
                    tracing::warn!(
                        prompt_id = %response.prompt_id,
                        node_errors = %response.node_errors,
                        "Workflow queued with node errors",
                    );
                }
                tracing::info!(
                    prompt_id = %response.prompt_id,
                    queue_number = ?response.number,
                    "Workflow queued",
                );
                Some(response.prompt_id)
            }
            Ok(_) => {
                tracing::error!("Failed to queue workflow: empty prompt_id in response");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to queue workflow");
                None
            }
        }
    }

    /// Re-fetch the history record and read its output images.
    ///
    /// A failed fetch or a record without outputs yields an empty list.
    pub async fn collect_outputs(&self, prompt_id: &str) -> Result<Vec<OutputImage>, PipelineError> {
        let history = match self.api.get_history(prompt_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(prompt_id = %prompt_id, error = %e, "Failed to get history");
                return Ok(Vec::new());
            }
        };

        let Some(entry) = HistoryEntry::from_history(&history, prompt_id) else {
            tracing::error!(prompt_id = %prompt_id, "Prompt not found in history");
            return Ok(Vec::new());
        };

        if entry.outputs.is_none() {
            tracing::error!(prompt_id = %prompt_id, "History record has no outputs");
            return Ok(Vec::new());
        }

        read_output_images(&entry, &self.config.output_dir).await
    }

    fn poll_config(&self) -> PollConfig {
        PollConfig {
            timeout: self.config.workflow_timeout,
            backoff: Backoff::Fixed(self.config.poll_interval),
            max_consecutive_errors: self.config.max_consecutive_poll_errors,
        }
    }
}

fn has_node_errors(node_errors: &Value) -> bool {
    match node_errors {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn node_errors_detection() {
        assert!(!has_node_errors(&Value::Null));
        assert!(!has_node_errors(&json!({})));
        assert!(has_node_errors(&json!({"5": {"errors": []}})));
    }
}
