//! Catalog backed by a JSON manifest file.
//!
//! The manifest maps catalog ids to entries:
//!
//! ```json
//! {
//!   "alb-1": { "kind": "album", "title": "Kind of Blue", "artist": "Miles Davis",
//!              "album": "Kind of Blue", "children": ["trk-1", "trk-2"] },
//!   "trk-1": { "kind": "track", "title": "So What", "artist": "Miles Davis",
//!              "album": "Kind of Blue",
//!              "stream": { "url": "https://cdn.example/trk-1", "key": "k1", "track_number": 1 } }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::queue::ItemKind;

use super::{Catalog, PipelineError, ResolvedMedia, StreamLocator};

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Entity kind.
    pub kind: ItemKind,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Artist.
    #[serde(default)]
    pub artist: String,
    /// Album.
    #[serde(default)]
    pub album: String,
    /// Child track ids for composites.
    #[serde(default)]
    pub children: Vec<String>,
    /// Stream for tracks.
    #[serde(default)]
    pub stream: Option<StreamLocator>,
    /// Entry is behind a subscription the user lacks.
    #[serde(default)]
    pub requires_auth: bool,
}

/// Reference [`Catalog`] over an in-memory manifest.
#[derive(Debug, Clone, Default)]
pub struct ManifestCatalog {
    entries: HashMap<String, ManifestEntry>,
}

impl ManifestCatalog {
    /// Builds a catalog from entries.
    #[must_use]
    pub fn from_entries(entries: HashMap<String, ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Loads a manifest file.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Disk`] if the file cannot be read,
    /// [`PipelineError::InvalidPath`] if it is not a valid manifest.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::disk(path, e))?;
        let entries = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::invalid_path(path.display().to_string(), format!("bad manifest: {e}"))
        })?;
        Ok(Self { entries })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the manifest is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Catalog for ManifestCatalog {
    #[instrument(skip(self))]
    async fn resolve(&self, id: &str, kind: ItemKind) -> Result<ResolvedMedia, PipelineError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| PipelineError::not_found(id, "not in catalog"))?;

        if entry.kind != kind {
            return Err(PipelineError::not_found(
                id,
                format!("catalog lists a {}, not a {kind}", entry.kind),
            ));
        }
        if entry.requires_auth {
            return Err(PipelineError::auth(format!(
                "{id} requires a subscription"
            )));
        }
        if kind == ItemKind::Track && entry.stream.is_none() {
            return Err(PipelineError::not_found(id, "no stream available"));
        }

        debug!(children = entry.children.len(), "resolved from manifest");
        Ok(ResolvedMedia {
            title: entry.title.clone(),
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            child_ids: if kind.is_composite() {
                entry.children.clone()
            } else {
                Vec::new()
            },
            stream: entry.stream.clone(),
        })
    }
}
