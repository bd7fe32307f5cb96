//! Output path layout.
//!
//! Tracks land at `<download_dir>/<artist>/<album>/<NN - title>.<ext>`;
//! composites own the directory their tracks land in. Every component is
//! sanitized, so catalog metadata can never climb out of the download root.

use std::path::{Path, PathBuf};

use crate::queue::ItemKind;

use super::ResolvedMedia;

/// Longest component we write, in characters.
const MAX_COMPONENT_CHARS: usize = 120;

/// Fallback for components that sanitize to nothing.
const UNKNOWN: &str = "Unknown";

/// Makes one path component safe for common filesystems.
///
/// Separators, reserved and control characters become `_`; runs of
/// whitespace collapse to one space; leading dots and trailing dots or
/// spaces are stripped. Returns `Unknown` for empty results.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_space = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => ' ',
            c => c,
        };
        if mapped == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(mapped);
    }

    let truncated: String = out.chars().take(MAX_COMPONENT_CHARS).collect();
    let cleaned = truncated
        .trim_start_matches(['.', ' '])
        .trim_end_matches(['.', ' '])
        .to_string();
    if cleaned.is_empty() {
        UNKNOWN.to_string()
    } else {
        cleaned
    }
}

/// Final path for one track.
#[must_use]
pub fn track_path(
    download_dir: &Path,
    media: &ResolvedMedia,
    track_number: Option<u32>,
    extension: &str,
) -> PathBuf {
    let title = sanitize_component(&media.title);
    let file_name = match track_number {
        Some(number) => format!("{number:02} - {title}.{extension}"),
        None => format!("{title}.{extension}"),
    };
    download_dir
        .join(sanitize_component(&media.artist))
        .join(sanitize_component(&media.album))
        .join(file_name)
}

/// Directory a composite item's tracks are written under.
///
/// Albums map to `<artist>/<album>`, artists to `<artist>`; playlists mix
/// artists, so they only point at the download root.
#[must_use]
pub fn collection_dir(download_dir: &Path, kind: ItemKind, media: &ResolvedMedia) -> PathBuf {
    match kind {
        ItemKind::Album | ItemKind::Track => download_dir
            .join(sanitize_component(&media.artist))
            .join(sanitize_component(&media.album)),
        ItemKind::Artist => download_dir.join(sanitize_component(&media.artist)),
        ItemKind::Playlist => download_dir.to_path_buf(),
    }
}
