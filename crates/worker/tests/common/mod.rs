#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use runbridge_comfyui::api::ComfyUIApi;
use runbridge_core::config::WorkerConfig;
use runbridge_worker::pipeline::JobPipeline;

/// 1x1 transparent PNG.
pub const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Temporary input/output directories plus a stub engine.
pub struct TestEngine {
    pub server: MockServer,
    pub input_dir: TempDir,
    pub output_dir: TempDir,
}

impl TestEngine {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            input_dir: tempfile::tempdir().unwrap(),
            output_dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Worker configuration pointed at this stub with short intervals.
    pub fn config(&self, workflow_timeout: Duration) -> WorkerConfig {
        WorkerConfig {
            engine_url: self.server.uri(),
            input_dir: self.input_dir.path().to_path_buf(),
            output_dir: self.output_dir.path().to_path_buf(),
            workflow_timeout,
            poll_interval: POLL_INTERVAL,
            ..WorkerConfig::default()
        }
    }

    pub fn pipeline(&self, workflow_timeout: Duration) -> Arc<JobPipeline> {
        Arc::new(JobPipeline::new(
            Arc::new(self.config(workflow_timeout)),
            ComfyUIApi::new(self.server.uri()),
        ))
    }

    pub fn write_output(&self, relative: &str, bytes: &[u8]) {
        let path = self.output_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    pub async fn accept_prompt(&self, prompt_id: &str) {
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"prompt_id": prompt_id, "number": 1, "node_errors": {}})),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn history(&self, prompt_id: &str, record: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/history/{prompt_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ prompt_id: record })))
            .mount(&self.server)
            .await;
    }

    /// Fail the test if any history request is made.
    pub async fn forbid_history(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/history/.*"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Files currently in the input directory.
    pub fn staged_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.input_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn job(workflow: Value) -> Value {
    json!({"input": {"workflow": workflow, "image1": PNG_B64, "image2": PNG_B64}})
}

pub fn default_workflow() -> Value {
    json!({"7": {"inputs": {}}, "8": {"inputs": {}}})
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
