//! Reading produced images back from the engine's output directory.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use runbridge_comfyui::history::HistoryEntry;
use runbridge_core::job::OutputImage;

use crate::error::PipelineError;

/// Read and base64-encode every image the history entry references.
///
/// A referenced file that does not exist is logged and skipped, so the
/// result may hold fewer images than the engine reported. Any other
/// read failure aborts collection.
pub async fn read_output_images(
    entry: &HistoryEntry,
    output_dir: &Path,
) -> Result<Vec<OutputImage>, PipelineError> {
    let mut images = Vec::new();

    for descriptor in entry.output_images() {
        let (Some(filename), Some(path)) =
            (descriptor.filename.as_deref(), descriptor.resolve(output_dir))
        else {
            continue;
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Output image not found");
                continue;
            }
            Err(source) => {
                return Err(PipelineError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        tracing::info!(filename = %filename, bytes = bytes.len(), "Encoded output image");
        images.push(OutputImage {
            filename: filename.to_string(),
            content: STANDARD.encode(&bytes),
        });
    }

    Ok(images)
}
