//! Startup readiness probe.
//!
//! The engine can take a while to load models after the container
//! starts. [`wait_until_ready`] blocks the worker until `/system_stats`
//! answers 200 or the startup deadline passes.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApi;
use crate::backoff::Backoff;

/// Parameters for [`wait_until_ready`].
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay strategy between probes.
    pub backoff: Backoff,
}

impl ReadinessConfig {
    /// Probe every `interval` until `timeout`.
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            backoff: Backoff::Fixed(interval),
        }
    }
}

/// Probe the engine until it reports ready.
///
/// Network errors and non-200 responses mean "not ready yet" and are
/// never surfaced. Returns `false` if the deadline passes or `cancel`
/// fires first.
pub async fn wait_until_ready(
    api: &ComfyUIApi,
    config: &ReadinessConfig,
    cancel: &CancellationToken,
) -> bool {
    tracing::info!(
        api_url = %api.api_url(),
        timeout_secs = config.timeout.as_secs(),
        "Waiting for ComfyUI to start",
    );

    let deadline = Instant::now() + config.timeout;
    let mut delay = config.backoff.initial_delay();
    let mut attempt = 0u32;

    while Instant::now() < deadline {
        attempt += 1;

        let probe = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            result = api.system_stats() => result,
        };
        match probe {
            Ok(()) => {
                tracing::info!(attempt, "ComfyUI is ready");
                return true;
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "ComfyUI not ready yet");
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(delay.min(remaining)) => {}
        }
        delay = config.backoff.next_delay(delay);
    }

    tracing::error!(
        timeout_secs = config.timeout.as_secs(),
        attempts = attempt,
        "ComfyUI did not start within the startup timeout",
    );
    false
}
