//! JSON tag sidecar writer.
//!
//! Writes `<file>.tags.json` next to each downloaded track instead of
//! rewriting the audio container.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{PipelineError, TagMetadata, Tagger};

/// Sidecar document root.
#[derive(Debug, Serialize)]
struct TagDocument<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    #[serde(flatten)]
    metadata: &'a TagMetadata,
    file: String,
}

/// Reference [`Tagger`] that writes a JSON sidecar file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarTagger;

impl SidecarTagger {
    /// Creates a sidecar tagger.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Path of the sidecar written for `audio_path`.
    #[must_use]
    pub fn sidecar_path(audio_path: &Path) -> PathBuf {
        let mut name = audio_path
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_default();
        name.push(".tags.json");
        audio_path.with_file_name(name)
    }
}

#[async_trait]
impl Tagger for SidecarTagger {
    #[instrument(skip(self, metadata), fields(path = %path.display()))]
    async fn embed(&self, path: &Path, metadata: &TagMetadata) -> Result<(), PipelineError> {
        let document = TagDocument {
            type_: "MusicRecording",
            metadata,
            file: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| PipelineError::invalid_path(path.display().to_string(), e.to_string()))?;

        let sidecar = Self::sidecar_path(path);
        tokio::fs::write(&sidecar, json)
            .await
            .map_err(|e| PipelineError::disk(&sidecar, e))?;

        debug!(sidecar = %sidecar.display(), "tag sidecar written");
        Ok(())
    }
}
