use runbridge_comfyui::poll::PollError;
use runbridge_core::error::{CoreError, StagingError};

/// Failure of one job at any gate of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("Failed to queue workflow")]
    QueueFailed,

    #[error("Workflow execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Workflow timed out after {timeout_secs} seconds")]
    TimedOut { timeout_secs: u64 },

    #[error("Workflow execution failed: engine unreachable")]
    EngineUnreachable,

    #[error("Workflow polling cancelled")]
    Cancelled,

    #[error("No output images generated")]
    NoOutputs,

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Errors that stem from a bug or the host rather than the job or
    /// the engine. These are logged at error level with their source
    /// chain.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Staging(_) | Self::Config(_) | Self::Io { .. })
    }

    /// Message placed in the `error` field returned to the caller.
    pub fn response_message(&self) -> String {
        if self.is_unexpected() {
            format!("Handler exception: {self}")
        } else {
            self.to_string()
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Config(msg) => Self::Config(msg),
        }
    }
}

impl From<PollError> for PipelineError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::Failed(msg) => Self::ExecutionFailed(msg),
            PollError::TimedOut { timeout } => Self::TimedOut {
                timeout_secs: timeout.as_secs(),
            },
            PollError::Unreachable { .. } => Self::EngineUnreachable,
            PollError::Cancelled => Self::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn caller_messages() {
        assert_eq!(PipelineError::QueueFailed.response_message(), "Failed to queue workflow");
        assert_eq!(PipelineError::NoOutputs.response_message(), "No output images generated");
        assert_eq!(
            PipelineError::from(PollError::Failed("OOM".into())).response_message(),
            "Workflow execution failed: OOM"
        );
        assert_eq!(
            PipelineError::from(PollError::TimedOut {
                timeout: Duration::from_secs(600)
            })
            .response_message(),
            "Workflow timed out after 600 seconds"
        );
        assert_eq!(
            PipelineError::Validation("Missing 'workflow' in input".into()).response_message(),
            "Missing 'workflow' in input"
        );
    }

    #[test]
    fn unexpected_errors_are_prefixed() {
        let err = PipelineError::Io {
            path: "/comfyui/output/a.png".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.is_unexpected());
        assert!(err
            .response_message()
            .starts_with("Handler exception: I/O error on /comfyui/output/a.png"));
    }

    #[test]
    fn config_faults_are_not_reported_as_validation() {
        let err = PipelineError::from(CoreError::Config("PORT must be a valid number".into()));
        assert!(err.is_unexpected());
        assert_eq!(
            err.response_message(),
            "Handler exception: Invalid configuration: PORT must be a valid number"
        );

        let err = PipelineError::from(CoreError::Validation("Missing 'workflow' in input".into()));
        assert!(!err.is_unexpected());
    }
}
