use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{FetchedMedia, MediaFetcher, ProgressFn};
use crate::{ClipError, Result};

/// Extensions recognized as directly downloadable media.
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "wav", "aac", "flac", "ogg", "mp4", "avi", "mov", "mkv", "webm",
];

/// Fetcher for URLs that point straight at a media file.
///
/// No extraction step: the bytes are streamed to disk as-is and the trim
/// stage works on whatever container arrived. Progress is determinate when
/// the server reports a content length.
pub struct DirectFetcher {
    client: Client,
}

impl DirectFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Filename portion of the URL path, if any.
    fn url_filename(locator: &Url) -> Option<String> {
        locator
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .map(|name| {
                urlencoding::decode(name)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| name.to_string())
            })
    }

    /// Title derived from the URL filename stem.
    fn url_title(locator: &Url) -> Option<String> {
        Self::url_filename(locator).map(|name| {
            let stem = match name.rfind('.') {
                Some(dot) => name[..dot].to_string(),
                None => name,
            };
            stem.replace(['_', '-'], " ")
        })
    }

    async fn download(
        &self,
        locator: &Url,
        target: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let response = self
            .client
            .get(locator.as_str())
            .send()
            .await
            .map_err(|e| ClipError::FetchFailed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ClipError::FetchFailed(format!(
                "HTTP {} from {}",
                response.status(),
                locator
            )));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(target).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        loop {
            tokio::select! {
                chunk = stream.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            file.write_all(&bytes).await?;
                            downloaded += bytes.len() as u64;
                            match total {
                                Some(total) if total > 0 => {
                                    progress(Some((downloaded as f32 / total as f32) * 100.0));
                                }
                                _ => progress(None),
                            }
                        }
                        Some(Err(e)) => {
                            return Err(ClipError::FetchFailed(format!(
                                "download interrupted: {}",
                                e
                            )));
                        }
                        None => break,
                    }
                }
                _ = cancel.cancelled() => {
                    return Err(ClipError::Cancelled);
                }
            }
        }

        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl MediaFetcher for DirectFetcher {
    fn supports(&self, locator: &Url) -> bool {
        let extension = Self::url_filename(locator)
            .and_then(|name| name.rsplit('.').next().map(str::to_lowercase));

        match extension {
            Some(ext) => MEDIA_EXTENSIONS.contains(&ext.as_str()),
            None => false,
        }
    }

    fn source_name(&self) -> &'static str {
        "direct URL"
    }

    async fn fetch(
        &self,
        locator: &Url,
        workspace: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia> {
        let extension = Self::url_filename(locator)
            .and_then(|name| name.rsplit('.').next().map(str::to_lowercase))
            .unwrap_or_else(|| "mp3".to_string());

        let path: PathBuf = workspace.join(format!("source.{}", extension));

        tracing::debug!("Downloading {} to {}", locator, path.display());
        self.download(locator, &path, progress, cancel).await?;

        Ok(FetchedMedia {
            path,
            title: Self::url_title(locator),
        })
    }
}

impl Default for DirectFetcher {
    fn default() -> Self {
        Self::new()
    }
}
