//! Inbound job payload, validation, and outbound response shapes.
//!
//! Inbound:
//!
//! ```json
//! { "input": { "workflow": { ... }, "image1": "<b64>", "image2": "<b64>" } }
//! ```
//!
//! Outbound is either `{"images": [{"filename": ..., "base64": ...}]}` or
//! `{"error": "..."}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::workflow::{NodeBindings, NodeBindingsOverride, WorkflowGraph};

pub const MISSING_WORKFLOW: &str = "Missing 'workflow' in input";
pub const MISSING_FACE_IMAGE: &str = "Missing 'image1' (face image) in input";
pub const MISSING_BODY_IMAGE: &str = "Missing 'image2' (body image) in input";
pub const WORKFLOW_NOT_OBJECT: &str = "'workflow' must be a JSON object";

/// Envelope delivered by the invocation runtime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobEvent {
    #[serde(default)]
    pub input: JobInput,
}

/// The job's `input` block. Every field is optional at the type level;
/// [`JobInput::validate`] decides what is actually required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobInput {
    #[serde(default)]
    pub workflow: Option<Value>,
    /// Base64 face image (optionally a data URI).
    #[serde(default)]
    pub image1: Option<String>,
    /// Base64 body image (optionally a data URI).
    #[serde(default)]
    pub image2: Option<String>,
    #[serde(default)]
    pub node_bindings: Option<NodeBindingsOverride>,
}

/// A job whose required fields are present and well-formed.
#[derive(Debug, Clone)]
pub struct ValidatedJob {
    pub workflow: WorkflowGraph,
    pub face_image: String,
    pub body_image: String,
    pub bindings: NodeBindings,
}

impl JobEvent {
    /// Parse the raw event. A null `input` is treated as empty.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        if value.get("input").is_some_and(Value::is_null) {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| CoreError::Validation(format!("Invalid job input: {e}")))
    }
}

impl JobInput {
    /// Check required fields in order: workflow, image1, image2.
    ///
    /// Empty values count as missing.
    pub fn validate(self, defaults: &NodeBindings) -> Result<ValidatedJob, CoreError> {
        let workflow = match self.workflow {
            None | Some(Value::Null) => return Err(missing(MISSING_WORKFLOW)),
            Some(Value::Object(map)) if map.is_empty() => return Err(missing(MISSING_WORKFLOW)),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(missing(WORKFLOW_NOT_OBJECT)),
        };

        let face_image = self
            .image1
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing(MISSING_FACE_IMAGE))?;
        let body_image = self
            .image2
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing(MISSING_BODY_IMAGE))?;

        Ok(ValidatedJob {
            workflow,
            face_image,
            body_image,
            bindings: defaults.merged(self.node_bindings.as_ref()),
        })
    }
}

fn missing(msg: &str) -> CoreError {
    CoreError::Validation(msg.to_string())
}

/// One produced image, read from the engine's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    /// Base64-encoded file bytes.
    #[serde(rename = "base64")]
    pub content: String,
}

/// Result returned to the invocation runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResponse {
    Images { images: Vec<OutputImage> },
    Error { error: String },
}

impl JobResponse {
    pub fn images(images: Vec<OutputImage>) -> Self {
        Self::Images { images }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
