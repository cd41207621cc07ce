//! History polling until a queued prompt finishes.
//!
//! [`wait_for_completion`] repeatedly fetches `/history/{prompt_id}`
//! until the record reports completion or an error, the deadline
//! passes, or the caller cancels. Request failures are retried on the
//! same schedule as "still running" answers. Giving up never cancels
//! the prompt on the engine; it only stops watching it.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApi;
use crate::backoff::Backoff;
use crate::history::{ExecutionState, HistoryEntry};

/// Parameters for [`wait_for_completion`].
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay strategy between polls.
    pub backoff: Backoff,
    /// Stop after this many consecutive request failures. `None`
    /// retries until the deadline.
    pub max_consecutive_errors: Option<u32>,
}

impl PollConfig {
    /// Poll every `interval` until `timeout`, retrying errors forever.
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            backoff: Backoff::Fixed(interval),
            max_consecutive_errors: None,
        }
    }
}

/// Why polling ended without a completed prompt.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The engine recorded an error for the prompt.
    #[error("Workflow failed: {0}")]
    Failed(String),

    /// The deadline passed before the prompt resolved.
    #[error("Workflow timed out after {} seconds", .timeout.as_secs())]
    TimedOut { timeout: Duration },

    /// Too many consecutive history requests failed.
    #[error("ComfyUI unreachable after {attempts} consecutive failures: {last_error}")]
    Unreachable { attempts: u32, last_error: String },

    /// The caller cancelled the wait.
    #[error("Polling cancelled")]
    Cancelled,
}

/// Wait for `prompt_id` to complete.
pub async fn wait_for_completion(
    api: &ComfyUIApi,
    prompt_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<(), PollError> {
    tracing::info!(prompt_id = %prompt_id, "Polling workflow status");

    let deadline = Instant::now() + config.timeout;
    let mut delay = config.backoff.initial_delay();
    let mut consecutive_errors = 0u32;

    loop {
        if Instant::now() >= deadline {
            tracing::error!(
                prompt_id = %prompt_id,
                timeout_secs = config.timeout.as_secs(),
                "Workflow timed out",
            );
            return Err(PollError::TimedOut {
                timeout: config.timeout,
            });
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            result = api.get_history(prompt_id) => result,
        };

        let failure = match fetched {
            Ok(history) => {
                consecutive_errors = 0;
                match HistoryEntry::from_history(&history, prompt_id).map(|e| e.state()) {
                    Some(ExecutionState::Completed) => {
                        tracing::info!(prompt_id = %prompt_id, "Workflow completed");
                        return Ok(());
                    }
                    Some(ExecutionState::Failed(message)) => {
                        tracing::error!(prompt_id = %prompt_id, error = %message, "Workflow failed");
                        return Err(PollError::Failed(message));
                    }
                    Some(ExecutionState::Pending) | None => {
                        tracing::debug!(prompt_id = %prompt_id, "Workflow still running");
                    }
                }
                None
            }
            Err(e) => Some(e.to_string()),
        };

        if let Some(last_error) = failure {
            consecutive_errors += 1;
            tracing::warn!(
                prompt_id = %prompt_id,
                consecutive_errors,
                error = %last_error,
                "Error while polling workflow status",
            );
            if let Some(max) = config.max_consecutive_errors {
                if consecutive_errors >= max {
                    return Err(PollError::Unreachable {
                        attempts: consecutive_errors,
                        last_error,
                    });
                }
            }
        }

        // Never sleep past the deadline, so the timeout fires on time.
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(delay.min(remaining)) => {}
        }
        delay = config.backoff.next_delay(delay);
    }
}
