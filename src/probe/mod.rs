use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

use crate::config::ToolsConfig;
use crate::utils::last_stderr_line;
use crate::{ClipError, Result};

/// Obtains the total duration of a media file without decoding it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration of the file in seconds.
    async fn probe(&self, path: &Path) -> Result<f64>;
}

/// ffprobe-backed duration probe.
///
/// Runs ffprobe in JSON mode and prefers the container-level duration field,
/// falling back to the longest stream-level duration when the container does
/// not carry one.
pub struct FfprobeProbe {
    ffprobe_path: String,
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    duration: Option<String>,
}

impl FfprobeProbe {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ffprobe_path: tools.ffprobe.clone(),
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<f64> {
        tracing::debug!("Probing duration of {}", path.display());

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                ClipError::ProbeFailed(format!("failed to run {}: {}", self.ffprobe_path, e))
            })?;

        if !output.status.success() {
            return Err(ClipError::ProbeFailed(last_stderr_line(&output.stderr)));
        }

        let report: ProbeReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| ClipError::ProbeFailed(format!("unreadable ffprobe output: {}", e)))?;

        duration_from_report(&report).ok_or_else(|| {
            ClipError::ProbeFailed(format!("no duration reported for {}", path.display()))
        })
    }
}

fn duration_from_report(report: &ProbeReport) -> Option<f64> {
    if let Some(duration) = report
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
    {
        return Some(duration);
    }

    report
        .streams
        .iter()
        .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
        .fold(None, |longest: Option<f64>, d| {
            Some(longest.map_or(d, |l| l.max(d)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_duration_preferred() {
        let report: ProbeReport = serde_json::from_str(
            r#"{
                "streams": [{"duration": "10.0"}],
                "format": {"duration": "632.568000"}
            }"#,
        )
        .unwrap();
        assert_eq!(duration_from_report(&report), Some(632.568));
    }

    #[test]
    fn test_falls_back_to_longest_stream() {
        let report: ProbeReport = serde_json::from_str(
            r#"{
                "streams": [
                    {"duration": "12.5"},
                    {"codec_type": "video", "duration": "30.75"},
                    {}
                ],
                "format": {}
            }"#,
        )
        .unwrap();
        assert_eq!(duration_from_report(&report), Some(30.75));
    }

    #[test]
    fn test_no_duration_anywhere() {
        let report: ProbeReport =
            serde_json::from_str(r#"{"streams": [{}], "format": {}}"#).unwrap();
        assert_eq!(duration_from_report(&report), None);

        let report: ProbeReport = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(duration_from_report(&report), None);
    }

    #[test]
    fn test_unparsable_duration_ignored() {
        let report: ProbeReport = serde_json::from_str(
            r#"{"streams": [{"duration": "N/A"}], "format": {"duration": "N/A"}}"#,
        )
        .unwrap();
        assert_eq!(duration_from_report(&report), None);
    }
}
