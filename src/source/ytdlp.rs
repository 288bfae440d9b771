use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{FetchedMedia, MediaFetcher, ProgressFn};
use crate::utils::{extract_domain, last_stderr_line, strip_ansi};
use crate::{ClipError, Result};

/// Hosts handled by the yt-dlp strategy.
const YTDLP_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "m.youtube.com",
    "music.youtube.com",
];

/// Fixed stem of the audio file yt-dlp writes into the workspace.
const SOURCE_STEM: &str = "source";

/// Remote media fetcher backed by yt-dlp.
///
/// One plain invocation per step: a metadata query for the title, then an
/// audio download converted to MP3. Anything yt-dlp cannot retrieve surfaces
/// uniformly as a fetch failure.
pub struct YtDlpFetcher {
    yt_dlp_path: String,
    audio_quality: String,
}

impl YtDlpFetcher {
    pub fn new(yt_dlp_path: &str, audio_quality: &str) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.to_string(),
            audio_quality: audio_quality.to_string(),
        }
    }

    /// Title metadata for the video, if yt-dlp reports one.
    async fn video_title(&self, locator: &Url) -> Result<Option<String>> {
        tracing::debug!("Fetching metadata for {}", locator);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--no-playlist"])
            .arg(locator.as_str())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ClipError::FetchFailed(format!("failed to run {}: {}", self.yt_dlp_path, e))
            })?;

        if !output.status.success() {
            return Err(ClipError::FetchFailed(last_stderr_line(&output.stderr)));
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ClipError::FetchFailed(format!("unreadable yt-dlp metadata: {}", e)))?;

        Ok(info["title"].as_str().map(|s| s.to_string()))
    }

    /// Download the audio track into the workspace as `source.mp3`.
    async fn download(
        &self,
        locator: &Url,
        workspace: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let template = workspace.join(format!("{}.%(ext)s", SOURCE_STEM));

        let mut child = Command::new(&self.yt_dlp_path)
            .args([
                "--newline",
                "--no-playlist",
                "--format", "bestaudio/best",
                "--extract-audio",
                "--audio-format", "mp3",
                "--audio-quality", &self.audio_quality,
                "--output",
            ])
            .arg(&template)
            .arg(locator.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ClipError::FetchFailed(format!("failed to run {}: {}", self.yt_dlp_path, e))
            })?;

        // Drain stderr on its own task so a warning-heavy run cannot fill
        // the pipe buffer and stall the child while we read stdout.
        let stderr_task = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                let _ = pipe.read_to_end(&mut buffer).await;
                buffer
            })
        });

        // Stream stdout for percentage lines while watching for cancellation.
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                if let Some(percent) = parse_progress_line(&line) {
                                    progress(Some(percent));
                                }
                            }
                            Ok(None) | Err(_) => break,
                        }
                    }
                    _ = cancel.cancelled() => {
                        let _ = child.kill().await;
                        return Err(ClipError::Cancelled);
                    }
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => Vec::new(),
            };
            return Err(ClipError::FetchFailed(last_stderr_line(&stderr)));
        }

        let path = workspace.join(format!("{}.mp3", SOURCE_STEM));
        if !path.exists() {
            return Err(ClipError::FetchFailed(
                "yt-dlp did not produce an audio file".to_string(),
            ));
        }

        Ok(path)
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    fn supports(&self, locator: &Url) -> bool {
        match extract_domain(locator) {
            Some(domain) => YTDLP_DOMAINS.contains(&domain.as_str()),
            None => false,
        }
    }

    fn source_name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(
        &self,
        locator: &Url,
        workspace: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia> {
        let title = self.video_title(locator).await?;

        // Checkpoint between the metadata query and the download.
        if cancel.is_cancelled() {
            return Err(ClipError::Cancelled);
        }

        let path = self.download(locator, workspace, progress, cancel).await?;

        Ok(FetchedMedia { path, title })
    }
}

/// Parse a percentage out of a yt-dlp `--newline` progress line, e.g.
/// `[download]  42.7% of 3.52MiB at 1.21MiB/s ETA 00:01`.
fn parse_progress_line(line: &str) -> Option<f32> {
    let line = strip_ansi(line);
    let rest = line.trim_start().strip_prefix("[download]")?;
    let token = rest.split_whitespace().next()?;
    let percent = token.strip_suffix('%')?;

    percent
        .parse::<f32>()
        .ok()
        .filter(|p| (0.0..=100.0).contains(p))
}
