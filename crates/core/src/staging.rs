//! Input image staging.
//!
//! Decodes the caller's base64 images and writes them into the engine's
//! input directory under per-job names, so the workflow's image loader
//! nodes can reference them by filename.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::StagingError;

/// Length of the random suffix in staged filenames.
const REQUEST_ID_LEN: usize = 8;

/// Filenames generated for one job's input images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInputs {
    pub face_filename: String,
    pub body_filename: String,
}

impl StagedInputs {
    /// Generate `face_<id>.png` / `body_<id>.png` from a fresh random id.
    ///
    /// The id is the first 8 characters of a v4 UUID. Collisions between
    /// workers sharing the input directory are unlikely, not impossible.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self::with_request_id(&uuid[..REQUEST_ID_LEN])
    }

    pub fn with_request_id(request_id: &str) -> Self {
        Self {
            face_filename: format!("face_{request_id}.png"),
            body_filename: format!("body_{request_id}.png"),
        }
    }
}

/// Strip a data-URI header (`data:image/png;base64,`) if present.
///
/// Everything up to and including the first comma is removed.
pub fn strip_data_uri(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

/// Decode a base64 image, with or without a data-URI header.
///
/// ASCII whitespace anywhere in the payload is ignored, so line-wrapped
/// (MIME style) encodings decode too.
pub fn decode_image(data: &str) -> Result<Vec<u8>, StagingError> {
    let payload: Vec<u8> = strip_data_uri(data)
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(payload)?)
}

/// Decode `data` and write it to `input_dir/filename`.
///
/// Creates `input_dir` if it does not exist. Returns the full path of
/// the written file.
pub async fn stage_image(
    input_dir: &Path,
    data: &str,
    filename: &str,
) -> Result<PathBuf, StagingError> {
    let bytes = decode_image(data)?;

    tokio::fs::create_dir_all(input_dir)
        .await
        .map_err(|source| StagingError::Io {
            path: input_dir.to_path_buf(),
            source,
        })?;

    let path = input_dir.join(filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|source| StagingError::Io {
            path: path.clone(),
            source,
        })?;

    tracing::info!(path = %path.display(), bytes = bytes.len(), "Staged input image");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // 1x1 transparent PNG.
    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn strip_removes_header_through_first_comma() {
        assert_eq!(strip_data_uri("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_uri("QUJD"), "QUJD");
        assert_eq!(strip_data_uri("a,b,c"), "b,c");
    }

    #[test]
    fn decode_accepts_plain_and_prefixed_payloads() {
        let plain = decode_image(PNG_B64).unwrap();
        let prefixed = decode_image(&format!("data:image/png;base64,{PNG_B64}")).unwrap();
        assert_eq!(plain, prefixed);
        assert_eq!(&plain[1..4], b"PNG");
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        assert_matches!(decode_image("not base64!!"), Err(StagingError::Decode(_)));
    }

    #[test]
    fn generated_names_share_one_request_id() {
        let staged = StagedInputs::generate();
        let face_id = staged
            .face_filename
            .strip_prefix("face_")
            .and_then(|s| s.strip_suffix(".png"))
            .unwrap();
        let body_id = staged
            .body_filename
            .strip_prefix("body_")
            .and_then(|s| s.strip_suffix(".png"))
            .unwrap();

        assert_eq!(face_id.len(), 8);
        assert_eq!(face_id, body_id);
        assert_ne!(StagedInputs::generate(), staged);
    }

    #[tokio::test]
    async fn staged_file_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let original: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let encoded = STANDARD.encode(&original);

        let plain = stage_image(dir.path(), &encoded, "plain.png").await.unwrap();
        let prefixed = stage_image(
            dir.path(),
            &format!("data:application/octet-stream;base64,{encoded}"),
            "prefixed.png",
        )
        .await
        .unwrap();

        assert_eq!(tokio::fs::read(&plain).await.unwrap(), original);
        assert_eq!(tokio::fs::read(&prefixed).await.unwrap(), original);
    }

    #[tokio::test]
    async fn line_wrapped_payload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let original: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let encoded = STANDARD.encode(&original);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.contains('\n'));

        let path = stage_image(dir.path(), &format!("data:image/png;base64,{wrapped}\n"), "wrapped.png")
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), original);
    }

    #[tokio::test]
    async fn creates_missing_input_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("comfyui").join("input");

        let path = stage_image(&nested, PNG_B64, "face_x.png").await.unwrap();

        assert_eq!(path, nested.join("face_x.png"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn malformed_payload_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();

        let result = stage_image(dir.path(), "%%%", "bad.png").await;

        assert_matches!(result, Err(StagingError::Decode(_)));
        assert!(!dir.path().join("bad.png").exists());
    }
}
