use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::utils::last_stderr_line;
use crate::{ClipError, Result};

/// Cuts a pre-validated time range out of a media file into an MP3.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClipCutter: Send + Sync {
    /// Write `[start_secs, end_secs)` of `input` to `output`.
    ///
    /// The caller has already validated the range against the probed
    /// duration; this component does not re-check it.
    async fn cut(
        &self,
        input: &Path,
        start_secs: u64,
        end_secs: u64,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// ffmpeg-backed cutter.
///
/// Tries a stream-copy trim first: near-instant and lossless, but bound to
/// container-native cut points and not guaranteed to work for every
/// container/codec pairing. When that attempt fails or overruns its short
/// deadline, the range is re-encoded to MP3 under a longer deadline. Either
/// way the subprocess is killed once its deadline passes or the job is
/// cancelled, never left running.
pub struct FfmpegCutter {
    ffmpeg_path: String,
    copy_deadline: Duration,
    encode_deadline: Duration,
    audio_bitrate: String,
}

enum TrimCodec {
    Copy,
    Encode,
}

enum RunOutcome {
    Finished(ExitStatus, String),
    DeadlineExceeded,
}

impl FfmpegCutter {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.tools.ffmpeg.clone(),
            copy_deadline: Duration::from_secs(config.clip.copy_deadline_secs),
            encode_deadline: Duration::from_secs(config.clip.encode_deadline_secs),
            audio_bitrate: config.clip.audio_bitrate.clone(),
        }
    }

    async fn run_trim(
        &self,
        input: &Path,
        start_secs: u64,
        duration_secs: u64,
        output: &Path,
        codec: TrimCodec,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-ss", &start_secs.to_string()])
            .arg("-i")
            .arg(input)
            .args(["-t", &duration_secs.to_string()])
            .arg("-vn");
        match codec {
            TrimCodec::Copy => {
                command.args(["-acodec", "copy"]);
            }
            TrimCodec::Encode => {
                command.args(["-acodec", "libmp3lame", "-b:a", &self.audio_bitrate]);
            }
        }
        command
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            ClipError::CutFailed(format!("failed to run {}: {}", self.ffmpeg_path, e))
        })?;

        // Drain stderr on its own task so a chatty ffmpeg cannot block on a
        // full pipe and run out the deadline instead of reporting its error.
        let stderr_task = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text).await;
                text
            })
        });

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                let stderr = match stderr_task {
                    Some(task) => task.await.unwrap_or_default(),
                    None => String::new(),
                };
                Ok(RunOutcome::Finished(status, stderr))
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Err(ClipError::Cancelled)
            }
            _ = sleep(deadline) => {
                let _ = child.kill().await;
                Ok(RunOutcome::DeadlineExceeded)
            }
        }
    }
}

#[async_trait]
impl ClipCutter for FfmpegCutter {
    async fn cut(
        &self,
        input: &Path,
        start_secs: u64,
        end_secs: u64,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let duration_secs = end_secs - start_secs;

        tracing::debug!(
            "Trimming {}s starting at {}s from {}",
            duration_secs,
            start_secs,
            input.display()
        );

        let copy = self
            .run_trim(
                input,
                start_secs,
                duration_secs,
                output,
                TrimCodec::Copy,
                self.copy_deadline,
                cancel,
            )
            .await?;

        match copy {
            RunOutcome::Finished(status, stderr) => {
                if status.success() && has_content(output).await {
                    tracing::debug!("Stream-copy trim succeeded");
                    return Ok(());
                }
                tracing::warn!(
                    "Stream-copy trim failed, re-encoding: {}",
                    last_stderr_line(stderr.as_bytes())
                );
            }
            RunOutcome::DeadlineExceeded => {
                tracing::warn!(
                    "Stream-copy trim exceeded {}s, re-encoding",
                    self.copy_deadline.as_secs()
                );
            }
        }

        let encode = self
            .run_trim(
                input,
                start_secs,
                duration_secs,
                output,
                TrimCodec::Encode,
                self.encode_deadline,
                cancel,
            )
            .await?;

        match encode {
            RunOutcome::Finished(status, stderr) => {
                if !status.success() {
                    return Err(ClipError::CutFailed(last_stderr_line(stderr.as_bytes())));
                }
                if !has_content(output).await {
                    return Err(ClipError::CutFailed(
                        "ffmpeg produced an empty output file".to_string(),
                    ));
                }
                tracing::debug!("Re-encoding trim succeeded");
                Ok(())
            }
            RunOutcome::DeadlineExceeded => Err(ClipError::Timeout {
                operation: "clip extraction".to_string(),
                limit_secs: self.encode_deadline.as_secs(),
            }),
        }
    }
}

/// True when the path exists and holds at least one byte.
async fn has_content(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}
