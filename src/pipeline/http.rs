//! HTTP stream fetcher.
//!
//! Downloads a stream locator with `reqwest`, decrypts length-prefixed frames
//! when the locator carries a key, and writes the plaintext through a `.part`
//! file that is renamed into place once the stream ends cleanly.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::crypto::FRAME_HEADER_LEN;
use super::paths::track_path;
use super::{
    Decryptor, FetchRequest, FetchedFile, PipelineError, StreamFetcher, TransferProgress,
};

/// HTTP connect timeout (30 seconds).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-request timeout (10 minutes for long lossless tracks).
const READ_TIMEOUT: Duration = Duration::from_secs(600);

/// Reference [`StreamFetcher`] over HTTP(S).
#[derive(Clone)]
pub struct HttpStreamFetcher {
    client: Client,
    decryptor: Arc<dyn Decryptor>,
}

impl std::fmt::Debug for HttpStreamFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamFetcher").finish_non_exhaustive()
    }
}

impl HttpStreamFetcher {
    /// Creates a fetcher with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the TLS backend cannot be initialized.
    pub fn new(decryptor: Arc<dyn Decryptor>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .gzip(true)
            .user_agent(concat!("mediafetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, decryptor))
    }

    /// Creates a fetcher around an existing client.
    #[must_use]
    pub fn with_client(client: Client, decryptor: Arc<dyn Decryptor>) -> Self {
        Self { client, decryptor }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, PipelineError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::transient(format!("timeout fetching {url}"))
            } else {
                PipelineError::transient(format!("network error fetching {url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::from_http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl StreamFetcher for HttpStreamFetcher {
    #[instrument(skip(self, request, progress), fields(track_id = %request.track_id))]
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &dyn TransferProgress,
    ) -> Result<FetchedFile, PipelineError> {
        let url = validate_locator(&request.stream.url)?;
        let path = track_path(
            &request.download_dir,
            &request.media,
            request.stream.track_number,
            request.quality.extension(),
        );
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::disk(parent, e))?;
        }

        let response = self.send(url.as_str()).await?;
        let content_length = response.content_length();
        let part_path = partial_path(&path);
        debug!(path = %path.display(), content_length, "streaming track");

        let result = stream_to_file(
            response,
            &part_path,
            request.stream.key.as_deref(),
            self.decryptor.as_ref(),
            progress,
            content_length,
        )
        .await;

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %part_path.display(), "removing partial file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(error);
            }
        };

        tokio::fs::rename(&part_path, &path)
            .await
            .map_err(|e| PipelineError::disk(&path, e))?;

        info!(path = %path.display(), bytes, "track written");
        Ok(FetchedFile { path, bytes })
    }
}

fn validate_locator(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw).map_err(|e| PipelineError::invalid_path(raw, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::invalid_path(
            raw,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Streams the body into `path`, returning plaintext bytes written.
async fn stream_to_file(
    response: reqwest::Response,
    path: &Path,
    key: Option<&str>,
    decryptor: &dyn Decryptor,
    progress: &dyn TransferProgress,
    content_length: Option<u64>,
) -> Result<u64, PipelineError> {
    let file = File::create(path)
        .await
        .map_err(|e| PipelineError::disk(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut pending: Vec<u8> = Vec::new();
    let mut received: u64 = 0;
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| PipelineError::transient(format!("stream interrupted: {e}")))?;
        received += chunk.len() as u64;

        match key {
            None => {
                write(&mut writer, path, &chunk).await?;
                written += chunk.len() as u64;
            }
            Some(key) => {
                pending.extend_from_slice(&chunk);
                for plaintext in drain_frames(&mut pending, key, decryptor)? {
                    write(&mut writer, path, &plaintext).await?;
                    written += plaintext.len() as u64;
                }
            }
        }

        progress.on_transfer(received, content_length).await;
    }

    if !pending.is_empty() {
        return Err(PipelineError::decryption(format!(
            "stream ended inside a frame ({} trailing bytes)",
            pending.len()
        )));
    }

    writer
        .flush()
        .await
        .map_err(|e| PipelineError::disk(path, e))?;

    Ok(written)
}

async fn write(
    writer: &mut BufWriter<File>,
    path: &Path,
    bytes: &[u8],
) -> Result<(), PipelineError> {
    writer
        .write_all(bytes)
        .await
        .map_err(|e| PipelineError::disk(path, e))
}

/// Decrypts every complete frame at the front of `buffer`.
fn drain_frames(
    buffer: &mut Vec<u8>,
    key: &str,
    decryptor: &dyn Decryptor,
) -> Result<Vec<Vec<u8>>, PipelineError> {
    let mut out = Vec::new();
    let mut offset = 0;
    while buffer.len() - offset >= FRAME_HEADER_LEN {
        let mut header = [0_u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&buffer[offset..offset + FRAME_HEADER_LEN]);
        let len = usize::try_from(u32::from_be_bytes(header))
            .map_err(|_| PipelineError::decryption("frame length overflow"))?;
        let start = offset + FRAME_HEADER_LEN;
        if buffer.len() - start < len {
            break;
        }
        out.push(decryptor.decrypt(&buffer[start..start + len], key)?);
        offset = start + len;
    }
    buffer.drain(..offset);
    Ok(out)
}
