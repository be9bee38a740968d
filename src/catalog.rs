//! Media catalog
//!
//! Lists the servable media files of a directory with their public URL and
//! current size. Nothing is cached; every call reads the directory again.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Characters left as-is in a file name used as a URL path segment
const URL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// One servable media file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub name: String,
    pub url: String,
    pub size_bytes: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("media directory '{}' is unavailable: {source}", dir.display())]
pub struct CatalogError {
    pub dir: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Whether `name` ends in one of `extensions` (given without the dot)
pub fn has_media_extension(name: &str, extensions: &[String]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e == ext))
}

/// List media files in `dir`, sorted by name.
///
/// Entries whose metadata cannot be read (removed mid-listing) are skipped;
/// failing to open the directory itself is a [`CatalogError`].
pub async fn list_media(
    dir: &Path,
    url_prefix: &str,
    extensions: &[String],
) -> Result<Vec<MediaFile>, CatalogError> {
    let unavailable = |source| CatalogError {
        dir: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir).await.map_err(unavailable)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
        let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
            continue;
        };
        if !has_media_extension(&name, extensions) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(MediaFile {
            url: format!("{url_prefix}{}", utf8_percent_encode(&name, URL_SEGMENT)),
            name,
            size_bytes: metadata.len(),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Create the media directory if it does not exist yet
pub fn ensure_media_dir(dir: &Path) -> io::Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(dir)?;
    Ok(true)
}
