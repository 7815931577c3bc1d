use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    bytes::Bytes,
    tracing::debug,
    walink_common::types::{MediaDescriptor, ResolvedMedia},
};

use crate::{
    error::{Error, Result},
    fetch::MediaFetcher,
    mime::{essence, mime_for_path},
};

/// Filename used when a URL has no usable last path segment.
const DEFAULT_REMOTE_FILENAME: &str = "Media";

/// Resolves media descriptors into bytes + MIME type right before a send.
pub struct MediaResolver {
    files_dir: PathBuf,
    fetcher: Arc<dyn MediaFetcher>,
    max_bytes: usize,
}

impl MediaResolver {
    pub fn new(files_dir: impl Into<PathBuf>, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self {
            files_dir: files_dir.into(),
            fetcher,
            max_bytes: usize::MAX,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Directory relative `LocalFile` paths are resolved against.
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub async fn resolve(&self, descriptor: &MediaDescriptor) -> Result<ResolvedMedia> {
        let resolved = match descriptor {
            MediaDescriptor::LocalFile { path } => self.read_local(path).await?,
            MediaDescriptor::Uploaded {
                bytes,
                mime_type,
                filename,
            } => ResolvedMedia {
                bytes: bytes.clone(),
                mime_type: mime_type.clone(),
                filename: filename.clone(),
            },
            MediaDescriptor::RemoteFetch { url } => self.fetch_remote(url).await?,
        };

        if resolved.bytes.len() > self.max_bytes {
            return Err(Error::TooLarge {
                size: resolved.bytes.len(),
                limit: self.max_bytes,
            });
        }

        debug!(
            kind = descriptor.kind(),
            mime_type = %resolved.mime_type,
            size = resolved.bytes.len(),
            "resolved media"
        );
        Ok(resolved)
    }

    async fn read_local(&self, path: &Path) -> Result<ResolvedMedia> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.files_dir.join(path)
        };

        let bytes = match tokio::fs::read(&full).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound { path: full });
            },
            Err(e) => {
                return Err(Error::external(
                    format!("failed to read {}", full.display()),
                    e,
                ));
            },
        };

        let filename = full
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_REMOTE_FILENAME)
            .to_string();

        Ok(ResolvedMedia {
            bytes: Bytes::from(bytes),
            mime_type: mime_for_path(&full).to_string(),
            filename,
        })
    }

    async fn fetch_remote(&self, url: &str) -> Result<ResolvedMedia> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::invalid_input(format!("invalid url {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::invalid_input(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }

        let fetched = self.fetcher.fetch(url).await?;
        let filename = remote_filename(&parsed);
        let mime_type = fetched
            .content_type
            .as_deref()
            .map(essence)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| mime_for_path(Path::new(&filename)).to_string());

        Ok(ResolvedMedia {
            bytes: fetched.bytes,
            mime_type,
            filename,
        })
    }
}

fn remote_filename(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_REMOTE_FILENAME.to_string())
}
