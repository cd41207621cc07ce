//! Injection of staged input filenames into a caller-supplied workflow.
//!
//! The workflow graph is an opaque node-id -> node-definition map. The
//! only thing the worker knows about it is which node ids load the face
//! and body images; that mapping is carried by [`NodeBindings`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::staging::StagedInputs;

/// Default node id of the face image loader.
pub const DEFAULT_FACE_NODE_ID: &str = "7";
/// Default node id of the body image loader.
pub const DEFAULT_BODY_NODE_ID: &str = "8";

/// Workflow graph as submitted to the engine.
pub type WorkflowGraph = Map<String, Value>;

/// Maps each logical image role to the workflow node that loads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBindings {
    pub face: String,
    pub body: String,
}

impl Default for NodeBindings {
    fn default() -> Self {
        Self {
            face: DEFAULT_FACE_NODE_ID.to_string(),
            body: DEFAULT_BODY_NODE_ID.to_string(),
        }
    }
}

/// Per-request override of [`NodeBindings`]; unset roles keep the
/// configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeBindingsOverride {
    #[serde(default)]
    pub face: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl NodeBindings {
    /// Apply an optional request-level override on top of these bindings.
    pub fn merged(&self, over: Option<&NodeBindingsOverride>) -> NodeBindings {
        let Some(over) = over else {
            return self.clone();
        };
        NodeBindings {
            face: over.face.clone().unwrap_or_else(|| self.face.clone()),
            body: over.body.clone().unwrap_or_else(|| self.body.clone()),
        }
    }
}

/// Point the face and body loader nodes at the staged filenames.
///
/// Sets `inputs.image` on each bound node. A node that is absent, or
/// that has no `inputs` object, is left untouched. Returns the ids of
/// the nodes that were patched.
pub fn patch_workflow(
    workflow: &mut WorkflowGraph,
    bindings: &NodeBindings,
    staged: &StagedInputs,
) -> Vec<String> {
    let targets = [
        (&bindings.face, &staged.face_filename),
        (&bindings.body, &staged.body_filename),
    ];

    let mut patched = Vec::with_capacity(targets.len());
    for (node_id, filename) in targets {
        let inputs = workflow
            .get_mut(node_id.as_str())
            .and_then(|node| node.get_mut("inputs"))
            .and_then(Value::as_object_mut);

        if let Some(inputs) = inputs {
            inputs.insert("image".to_string(), Value::String(filename.clone()));
            tracing::info!(node_id = %node_id, filename = %filename, "Patched image loader node");
            patched.push(node_id.clone());
        }
    }
    patched
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn staged() -> StagedInputs {
        StagedInputs {
            face_filename: "face_abcd1234.png".to_string(),
            body_filename: "body_abcd1234.png".to_string(),
        }
    }

    fn graph(value: Value) -> WorkflowGraph {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn patches_both_default_nodes() {
        let mut workflow = graph(json!({
            "7": {"class_type": "LoadImage", "inputs": {"image": "old.png"}},
            "8": {"class_type": "LoadImage", "inputs": {}},
            "9": {"class_type": "SaveImage", "inputs": {"images": ["3", 0]}},
        }));

        let patched = patch_workflow(&mut workflow, &NodeBindings::default(), &staged());

        assert_eq!(patched, vec!["7".to_string(), "8".to_string()]);
        assert_eq!(workflow["7"]["inputs"]["image"], "face_abcd1234.png");
        assert_eq!(workflow["8"]["inputs"]["image"], "body_abcd1234.png");
        assert_eq!(workflow["7"]["class_type"], "LoadImage");
        assert!(workflow["9"]["inputs"].get("image").is_none());
    }

    #[test]
    fn missing_node_or_inputs_is_a_noop() {
        let mut workflow = graph(json!({
            "7": {"class_type": "LoadImage"},
            "3": {"inputs": {}},
        }));
        let before = workflow.clone();

        let patched = patch_workflow(&mut workflow, &NodeBindings::default(), &staged());

        assert!(patched.is_empty());
        assert_eq!(workflow, before);
    }

    #[test]
    fn non_object_inputs_is_left_alone() {
        let mut workflow = graph(json!({"7": {"inputs": "oops"}, "8": {"inputs": {}}}));

        let patched = patch_workflow(&mut workflow, &NodeBindings::default(), &staged());

        assert_eq!(patched, vec!["8".to_string()]);
        assert_eq!(workflow["7"]["inputs"], "oops");
    }

    #[test]
    fn custom_bindings_target_other_nodes() {
        let mut workflow = graph(json!({
            "7": {"inputs": {}},
            "21": {"inputs": {}},
            "22": {"inputs": {}},
        }));
        let bindings = NodeBindings {
            face: "21".to_string(),
            body: "22".to_string(),
        };

        patch_workflow(&mut workflow, &bindings, &staged());

        assert_eq!(workflow["21"]["inputs"]["image"], "face_abcd1234.png");
        assert_eq!(workflow["22"]["inputs"]["image"], "body_abcd1234.png");
        assert!(workflow["7"]["inputs"].get("image").is_none());
    }

    #[test]
    fn override_merges_per_role() {
        let defaults = NodeBindings::default();
        let over = NodeBindingsOverride {
            face: Some("40".to_string()),
            body: None,
        };

        let merged = defaults.merged(Some(&over));
        assert_eq!(merged.face, "40");
        assert_eq!(merged.body, "8");

        assert_eq!(defaults.merged(None), defaults);
    }
}
