//! Typed view of a ComfyUI history record.
//!
//! `GET /history/{prompt_id}` returns `{}` while a prompt is queued or
//! running and `{"<prompt_id>": {...}}` once the engine has recorded it:
//!
//! ```json
//! {
//!   "<prompt_id>": {
//!     "outputs": { "9": { "images": [ { "filename": "out.png", "subfolder": "", "type": "output" } ] } },
//!     "status": { "status_str": "success", "completed": true, "messages": [ ["execution_start", {}] ] }
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Message kind carrying the exception of a failed prompt.
const EXECUTION_ERROR: &str = "execution_error";

/// The engine's record of a single prompt.
///
/// Built from the raw JSON without failing: fields that are missing,
/// `null` or of an unexpected shape read as empty, so the prompt can
/// always be classified.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    /// Per-node outputs in the order the engine reported them. `Some`
    /// whenever the `outputs` key is present, even if it is `null`.
    pub outputs: Option<Vec<NodeOutput>>,
    pub status: Option<ExecutionStatus>,
}

/// Output of one node.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    pub node_id: String,
    pub images: Vec<ImageDescriptor>,
}

/// Location of one produced image relative to the output directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageDescriptor {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subfolder: String,
    /// `output` or `temp`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// The `status` sub-record.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStatus {
    pub completed: bool,
    /// `Some` whenever the key is present, including an explicit `null`.
    pub error: Option<Value>,
    pub status_str: Option<String>,
    /// `[kind, data]` pairs emitted during execution.
    pub messages: Vec<(String, Value)>,
}

/// What a history record says about a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Completed,
    Failed(String),
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl HistoryEntry {
    /// Select the record for `prompt_id` from a history response.
    /// `None` means the engine has no record yet.
    pub fn from_history(history: &Value, prompt_id: &str) -> Option<Self> {
        history.get(prompt_id).map(Self::from_record)
    }

    /// Read one prompt record.
    pub fn from_record(record: &Value) -> Self {
        let outputs = record.get("outputs").map(|outputs| {
            outputs
                .as_object()
                .map(|nodes| {
                    nodes
                        .iter()
                        .map(|(node_id, output)| NodeOutput::from_value(node_id, output))
                        .collect()
                })
                .unwrap_or_default()
        });
        let status = record
            .get("status")
            .filter(|status| status.is_object())
            .map(ExecutionStatus::from_value);

        Self { outputs, status }
    }

    /// Classify the record.
    ///
    /// An `outputs` key wins; otherwise the `status` sub-record decides.
    pub fn state(&self) -> ExecutionState {
        if self.outputs.is_some() {
            return ExecutionState::Completed;
        }
        let Some(status) = &self.status else {
            return ExecutionState::Pending;
        };
        if status.completed {
            return ExecutionState::Completed;
        }
        if let Some(error) = &status.error {
            return ExecutionState::Failed(describe_error(error));
        }
        if status.status_str.as_deref() == Some("error") {
            return ExecutionState::Failed(status.exception_message());
        }
        ExecutionState::Pending
    }

    /// Every image descriptor with a filename, across all output nodes.
    pub fn output_images(&self) -> impl Iterator<Item = &ImageDescriptor> {
        self.outputs
            .iter()
            .flatten()
            .flat_map(|node| node.images.iter())
            .filter(|image| image.filename.as_deref().is_some_and(|f| !f.is_empty()))
    }
}

impl NodeOutput {
    /// Descriptors that fail to parse are dropped.
    fn from_value(node_id: &str, output: &Value) -> Self {
        let images = output
            .get("images")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|image| ImageDescriptor::deserialize(image).ok())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            node_id: node_id.to_string(),
            images,
        }
    }
}

impl ExecutionStatus {
    fn from_value(status: &Value) -> Self {
        let messages = status
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|message| match message.as_array()?.as_slice() {
                        [kind, data, ..] => Some((kind.as_str()?.to_string(), data.clone())),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            completed: status.get("completed").and_then(Value::as_bool).unwrap_or(false),
            error: status.get("error").cloned(),
            status_str: status
                .get("status_str")
                .and_then(Value::as_str)
                .map(str::to_string),
            messages,
        }
    }

    /// The exception message of the first `execution_error` message.
    fn exception_message(&self) -> String {
        self.messages
            .iter()
            .find(|(kind, _)| kind == EXECUTION_ERROR)
            .and_then(|(_, data)| data.get("exception_message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

impl ImageDescriptor {
    /// On-disk path under `output_dir`, honoring the subfolder.
    ///
    /// Returns `None` for descriptors without a filename.
    pub fn resolve(&self, output_dir: &Path) -> Option<PathBuf> {
        let filename = self.filename.as_deref()?;
        let mut path = output_dir.to_path_buf();
        if !self.subfolder.is_empty() {
            path.push(&self.subfolder);
        }
        path.push(filename);
        Some(path)
    }
}

fn describe_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}
