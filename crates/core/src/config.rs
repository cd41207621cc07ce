//! Worker configuration loaded once at startup.
//!
//! [`WorkerConfig`] is immutable after construction and is passed to
//! each pipeline stage explicitly (usually behind an `Arc`).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;
use crate::workflow::NodeBindings;

pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:8188";
pub const DEFAULT_INPUT_DIR: &str = "/comfyui/input";
pub const DEFAULT_OUTPUT_DIR: &str = "/comfyui/output";
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_READINESS_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_WORKFLOW_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Process-wide settings for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base HTTP URL of the ComfyUI instance, without a trailing slash.
    pub engine_url: String,
    /// Directory the engine loads input images from.
    pub input_dir: PathBuf,
    /// Directory the engine writes output images to.
    pub output_dir: PathBuf,
    /// How long to wait for the engine to come up at startup.
    pub startup_timeout: Duration,
    /// Delay between readiness probes.
    pub readiness_interval: Duration,
    /// Upper bound on a single workflow execution.
    pub workflow_timeout: Duration,
    /// Delay between history polls.
    pub poll_interval: Duration,
    /// Abort polling after this many consecutive request failures.
    /// `None` keeps retrying until the workflow timeout.
    pub max_consecutive_poll_errors: Option<u32>,
    /// Default role -> node-id mapping for image injection.
    pub node_bindings: NodeBindings,
    /// Bind address for the invocation endpoint.
    pub host: String,
    /// Bind port for the invocation endpoint.
    pub port: u16,
    /// When set, run the job in this JSON file once and exit.
    pub test_input: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            readiness_interval: Duration::from_secs(DEFAULT_READINESS_INTERVAL_SECS),
            workflow_timeout: Duration::from_secs(DEFAULT_WORKFLOW_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_consecutive_poll_errors: None,
            node_bindings: NodeBindings::default(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            test_input: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `COMFYUI_URL`                  | `http://127.0.0.1:8188` |
    /// | `COMFYUI_INPUT_DIR`            | `/comfyui/input`        |
    /// | `COMFYUI_OUTPUT_DIR`           | `/comfyui/output`       |
    /// | `COMFYUI_STARTUP_TIMEOUT_SECS` | `120`                   |
    /// | `READINESS_INTERVAL_SECS`      | `2`                     |
    /// | `WORKFLOW_TIMEOUT_SECS`        | `600`                   |
    /// | `POLL_INTERVAL_SECS`           | `3`                     |
    /// | `POLL_MAX_CONSECUTIVE_ERRORS`  | unset (no limit)        |
    /// | `FACE_NODE_ID`                 | `7`                     |
    /// | `BODY_NODE_ID`                 | `8`                     |
    /// | `HOST`                         | `0.0.0.0`               |
    /// | `PORT`                         | `8000`                  |
    /// | `TEST_INPUT`                   | unset                   |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let engine_url = get("COMFYUI_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.engine_url);

        let input_dir = get("COMFYUI_INPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.input_dir);
        let output_dir = get("COMFYUI_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let startup_timeout = secs(&get, "COMFYUI_STARTUP_TIMEOUT_SECS", DEFAULT_STARTUP_TIMEOUT_SECS)?;
        let readiness_interval = secs(&get, "READINESS_INTERVAL_SECS", DEFAULT_READINESS_INTERVAL_SECS)?;
        let workflow_timeout = secs(&get, "WORKFLOW_TIMEOUT_SECS", DEFAULT_WORKFLOW_TIMEOUT_SECS)?;
        let poll_interval = secs(&get, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;

        let max_consecutive_poll_errors = match get("POLL_MAX_CONSECUTIVE_ERRORS") {
            Some(raw) => {
                let n: u32 = parse(&raw, "POLL_MAX_CONSECUTIVE_ERRORS")?;
                if n == 0 {
                    return Err(CoreError::Config(
                        "POLL_MAX_CONSECUTIVE_ERRORS must be greater than zero".to_string(),
                    ));
                }
                Some(n)
            }
            None => None,
        };

        let node_bindings = NodeBindings {
            face: get("FACE_NODE_ID")
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.node_bindings.face),
            body: get("BODY_NODE_ID")
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.node_bindings.body),
        };

        let host = get("HOST").unwrap_or(defaults.host);
        let port = match get("PORT") {
            Some(raw) => parse(&raw, "PORT")?,
            None => defaults.port,
        };

        let test_input = get("TEST_INPUT").map(PathBuf::from);

        Ok(Self {
            engine_url,
            input_dir,
            output_dir,
            startup_timeout,
            readiness_interval,
            workflow_timeout,
            poll_interval,
            max_consecutive_poll_errors,
            node_bindings,
            host,
            port,
            test_input,
        })
    }
}

fn parse<T: FromStr>(raw: &str, key: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{key} must be a valid number, got '{raw}'")))
}

/// Read a whole-second duration, rejecting zero.
fn secs<G>(get: &G, key: &str, default: u64) -> Result<Duration, CoreError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = match get(key) {
        Some(raw) => parse::<u64>(&raw, key)?,
        None => default,
    };
    if value == 0 {
        return Err(CoreError::Config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_secs(value))
}
