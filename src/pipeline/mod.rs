//! Media pipeline collaborators.
//!
//! The scheduler drives four seams, each a trait object so callers can plug
//! in their own catalog client, transport, cipher and tag writer:
//!
//! - [`Catalog`] resolves ids into metadata, child lists and stream locators
//! - [`StreamFetcher`] transfers, decrypts and writes one track
//! - [`Decryptor`] turns one encrypted stream frame into plaintext
//! - [`Tagger`] embeds metadata into (or next to) a written file
//!
//! Reference implementations live in the submodules: [`HttpStreamFetcher`],
//! [`XChaChaDecryptor`], [`SidecarTagger`] and [`ManifestCatalog`].

mod crypto;
mod error;
mod http;
mod manifest;
pub mod paths;
mod sidecar;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crypto::{NONCE_LEN, XChaChaDecryptor};
pub use error::PipelineError;
pub use http::HttpStreamFetcher;
pub use manifest::{ManifestCatalog, ManifestEntry};
pub use sidecar::SidecarTagger;

use crate::config::Quality;
use crate::queue::ItemKind;

/// Where and how to fetch a track's audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLocator {
    /// Stream URL.
    pub url: String,
    /// Per-track key; frames are decrypted when present.
    #[serde(default)]
    pub key: Option<String>,
    /// Position of the track on its album.
    #[serde(default)]
    pub track_number: Option<u32>,
}

/// Catalog answer for one id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// Canonical title.
    pub title: String,
    /// Canonical artist.
    pub artist: String,
    /// Canonical album (empty for playlists and artists).
    pub album: String,
    /// Child track ids, in catalog order. Empty for tracks.
    pub child_ids: Vec<String>,
    /// Stream for tracks. `None` for composites.
    pub stream: Option<StreamLocator>,
}

/// Everything a fetcher needs to place and download one track.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Track id.
    pub track_id: String,
    /// Resolved track metadata.
    pub media: ResolvedMedia,
    /// Stream to fetch.
    pub stream: StreamLocator,
    /// Root output directory.
    pub download_dir: PathBuf,
    /// Requested quality; decides the file extension.
    pub quality: Quality,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Final file path.
    pub path: PathBuf,
    /// Plaintext bytes written.
    pub bytes: u64,
}

/// Metadata handed to the tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagMetadata {
    /// Track id.
    pub track_id: String,
    /// Title.
    pub title: String,
    /// Artist.
    pub artist: String,
    /// Album.
    pub album: String,
    /// Position on the album.
    pub track_number: Option<u32>,
    /// Quality label.
    pub quality: String,
}

/// Receives byte-level transfer progress from a fetcher.
#[async_trait]
pub trait TransferProgress: Send + Sync {
    /// Called after each chunk is written.
    async fn on_transfer(&self, received: u64, content_length: Option<u64>);
}

/// Progress sink that discards updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

#[async_trait]
impl TransferProgress for NoProgress {
    async fn on_transfer(&self, _received: u64, _content_length: Option<u64>) {}
}

/// Resolves catalog ids.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolves `id` as an entity of `kind`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotFound`], [`PipelineError::Auth`] or
    /// [`PipelineError::Transient`].
    async fn resolve(&self, id: &str, kind: ItemKind) -> Result<ResolvedMedia, PipelineError>;
}

/// Transfers, decrypts and writes one track.
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    /// Fetches `request`, reporting byte progress to `progress`.
    ///
    /// # Errors
    ///
    /// Any [`PipelineError`]; partial files are removed on failure.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &dyn TransferProgress,
    ) -> Result<FetchedFile, PipelineError>;
}

/// Decrypts one stream frame.
pub trait Decryptor: Send + Sync {
    /// Decrypts `frame` with the track `key`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Decryption`] when the frame is malformed or fails
    /// authentication.
    fn decrypt(&self, frame: &[u8], key: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Writes tags for a downloaded file.
#[async_trait]
pub trait Tagger: Send + Sync {
    /// Embeds `metadata` for the file at `path`.
    ///
    /// # Errors
    ///
    /// Any [`PipelineError`]; the worker logs it and keeps the download.
    async fn embed(&self, path: &Path, metadata: &TagMetadata) -> Result<(), PipelineError>;
}

/// The collaborator bundle a scheduler runs items through.
#[derive(Clone)]
pub struct MediaPipeline {
    /// Catalog client.
    pub catalog: Arc<dyn Catalog>,
    /// Stream transport.
    pub fetcher: Arc<dyn StreamFetcher>,
    /// Tag writer.
    pub tagger: Arc<dyn Tagger>,
}

impl MediaPipeline {
    /// Bundles the three collaborators.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        fetcher: Arc<dyn StreamFetcher>,
        tagger: Arc<dyn Tagger>,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            tagger,
        }
    }
}

impl std::fmt::Debug for MediaPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPipeline").finish_non_exhaustive()
    }
}
