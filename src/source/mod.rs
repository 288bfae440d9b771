use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use url::Url;

pub mod direct;
pub mod upload;
pub mod ytdlp;

use crate::config::Config;
use crate::timespec::TimeSpec;
use crate::utils::sanitize_title;
use crate::{ClipError, Result};

/// Callback fetchers use to report download progress. `None` means the
/// fetcher cannot estimate a percentage for this event.
pub type ProgressFn<'a> = &'a (dyn Fn(Option<f32>) + Send + Sync);

/// Where the source media for a clip comes from.
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// Fetched from a remote locator by an external tool.
    Remote(Url),
    /// A file the user already has locally.
    Upload(PathBuf),
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Remote(url) => write!(f, "remote URL {}", url),
            SourceKind::Upload(path) => write!(f, "local file {}", path.display()),
        }
    }
}

/// A validated request to extract one clip.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub source: SourceKind,
    pub start: TimeSpec,
    pub end: TimeSpec,
}

impl ClipRequest {
    /// Build a request for a remote locator.
    pub fn remote(url: &str, start: TimeSpec, end: TimeSpec) -> Result<Self> {
        let locator = Url::parse(url)
            .map_err(|_| ClipError::FetchFailed(format!("invalid URL: {}", url)))?;

        if !matches!(locator.scheme(), "http" | "https") {
            return Err(ClipError::FetchFailed(
                "URL must use HTTP or HTTPS".to_string(),
            ));
        }

        Self::validated(SourceKind::Remote(locator), start, end)
    }

    /// Build a request for a local media file. The file itself is checked
    /// when the job resolves it.
    pub fn upload(path: impl Into<PathBuf>, start: TimeSpec, end: TimeSpec) -> Result<Self> {
        Self::validated(SourceKind::Upload(path.into()), start, end)
    }

    fn validated(source: SourceKind, start: TimeSpec, end: TimeSpec) -> Result<Self> {
        // Zero-length clips are rejected before any I/O happens.
        if end <= start {
            return Err(ClipError::InvalidRange);
        }
        Ok(Self { source, start, end })
    }
}

/// A source media file staged in the job workspace.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    /// Local path of the staged file, inside the workspace.
    pub path: PathBuf,

    /// Display title, already reduced to a safe-filename character set.
    pub title: String,

    /// Probed duration in seconds, filled in after resolution.
    pub duration: Option<f64>,
}

/// Resolves a clip request into a local media file.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Stage the request's source media inside `workspace`.
    ///
    /// Exactly one file is written into the workspace. The fetch may emit
    /// zero or more progress events before it returns, and must observe the
    /// cancellation token at its checkpoints.
    async fn resolve(
        &self,
        request: &ClipRequest,
        workspace: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<MediaAsset>;
}

/// Trait for fetching remote media with different strategies
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Check if this fetcher handles the given locator
    fn supports(&self, locator: &Url) -> bool;

    /// Get the name of this fetch strategy
    fn source_name(&self) -> &'static str;

    /// Download the media behind `locator` into `workspace`.
    async fn fetch(
        &self,
        locator: &Url,
        workspace: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia>;
}

/// What a fetcher hands back: the staged file plus any title metadata.
pub struct FetchedMedia {
    pub path: PathBuf,
    pub title: Option<String>,
}

/// Registry of fetch strategies plus the upload path.
pub struct SourceResolver {
    fetchers: Vec<Box<dyn MediaFetcher>>,
    upload: upload::UploadSource,
}

impl SourceResolver {
    /// Create a resolver with the default fetchers.
    pub fn new(config: &Config) -> Self {
        let mut resolver = Self {
            fetchers: Vec::new(),
            upload: upload::UploadSource,
        };

        resolver.register(Box::new(ytdlp::YtDlpFetcher::new(
            &config.tools.yt_dlp,
            &config.clip.audio_bitrate,
        )));
        resolver.register(Box::new(direct::DirectFetcher::new()));

        resolver
    }

    /// Register an additional fetch strategy.
    pub fn register(&mut self, fetcher: Box<dyn MediaFetcher>) {
        self.fetchers.push(fetcher);
    }

    fn find_fetcher(&self, locator: &Url) -> Option<&dyn MediaFetcher> {
        self.fetchers
            .iter()
            .find(|fetcher| fetcher.supports(locator))
            .map(|boxed| boxed.as_ref())
    }
}

#[async_trait]
impl MediaSource for SourceResolver {
    async fn resolve(
        &self,
        request: &ClipRequest,
        workspace: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<MediaAsset> {
        match &request.source {
            SourceKind::Upload(path) => self.upload.stage(path, workspace).await,
            SourceKind::Remote(locator) => {
                let fetcher = self.find_fetcher(locator).ok_or_else(|| {
                    ClipError::FetchFailed(format!("no fetch strategy for {}", locator))
                })?;

                tracing::info!("Fetching source media via {}", fetcher.source_name());
                let fetched = fetcher.fetch(locator, workspace, progress, cancel).await?;

                Ok(MediaAsset {
                    path: fetched.path,
                    title: sanitize_title(fetched.title.as_deref().unwrap_or("")),
                    duration: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(text: &str) -> TimeSpec {
        TimeSpec::parse(text).unwrap()
    }

    #[test]
    fn test_remote_request_valid() {
        let request = ClipRequest::remote("https://youtube.com/watch?v=abc", t("0:30"), t("1:00"));
        assert!(request.is_ok());
    }

    #[test]
    fn test_remote_request_rejects_bad_url() {
        assert!(matches!(
            ClipRequest::remote("not a url", t("0:30"), t("1:00")),
            Err(ClipError::FetchFailed(_))
        ));
        assert!(matches!(
            ClipRequest::remote("ftp://example.com/a.mp3", t("0:30"), t("1:00")),
            Err(ClipError::FetchFailed(_))
        ));
    }

    #[test]
    fn test_end_must_exceed_start() {
        assert!(matches!(
            ClipRequest::upload("a.mp3", t("1:00"), t("0:30")),
            Err(ClipError::InvalidRange)
        ));
        // Zero-length clips are rejected too.
        assert!(matches!(
            ClipRequest::upload("a.mp3", t("1:00"), t("1:00")),
            Err(ClipError::InvalidRange)
        ));
    }

    #[tokio::test]
    async fn test_unsupported_locator_has_no_strategy() {
        let resolver = SourceResolver::new(&Config::default());
        let request =
            ClipRequest::remote("https://example.com/page.html", t("0:10"), t("0:20")).unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let noop = |_: Option<f32>| {};

        let result = resolver
            .resolve(
                &request,
                workspace.path(),
                &noop,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(ClipError::FetchFailed(_))));
    }
}
