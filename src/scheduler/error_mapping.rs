use crate::pipeline::PipelineError;

/// Persisted failure text: the error plus one actionable suggestion line.
pub(super) fn build_actionable_error_message(error: &PipelineError) -> String {
    let base = error.to_string();
    if base.contains("Suggestion:") {
        return base;
    }

    let suggestion = match error {
        PipelineError::Transient { .. } => {
            "Check network connectivity, then retry the item once the service is reachable."
        }
        PipelineError::Decryption { .. } => {
            "The stream key may have rotated; retry the item to fetch a fresh stream."
        }
        PipelineError::Auth { .. } => {
            "Sign in again or check that your subscription covers this content, then retry."
        }
        PipelineError::NotFound { .. } => {
            "The content may have been removed from the catalog; verify the id and re-add it."
        }
        PipelineError::Disk { .. } => {
            "Check free space and write permissions for the download directory, then retry."
        }
        PipelineError::InvalidPath { .. } => {
            "Check the download directory setting and the stream locator, then retry."
        }
    };

    format!("{base}\n  Suggestion: {suggestion}")
}
