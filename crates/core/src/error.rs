use std::path::PathBuf;

/// Domain-level errors raised before any engine interaction.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The job payload is missing a field or carries a malformed one.
    /// The message is returned to the caller verbatim.
    #[error("{0}")]
    Validation(String),

    /// A configuration value could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Errors from decoding and writing an input image.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
