use url::Url;

use crate::config::ToolsConfig;

/// Longest display title kept when building output file names.
const MAX_TITLE_LEN: usize = 120;

/// Reduce a media title to a safe-filename character set.
///
/// Keeps alphanumerics, spaces, hyphens, and underscores, collapses runs of
/// whitespace, and truncates to a bounded length. An empty result falls back
/// to a fixed stem so the output file always has a usable name.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();

    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_TITLE_LEN).collect();
    let trimmed = truncated.trim();

    if trimmed.is_empty() {
        "clip".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Remove ANSI escape sequences from tool output before parsing it.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        match chars.next() {
            // CSI sequence: parameters end at a byte in 0x40..=0x7e.
            Some('[') => {
                for n in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&n) {
                        break;
                    }
                }
            }
            // Two-character escape, or a trailing ESC at end of input.
            Some(_) | None => {}
        }
    }

    out
}

/// Format a duration as `minutes:seconds`, the form shown to users when a
/// requested range falls outside the media.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|host| {
        // Remove 'www.' prefix if present
        if let Some(stripped) = host.strip_prefix("www.") {
            stripped.to_string()
        } else {
            host.to_string()
        }
    })
}

/// Last non-empty stderr line of a failed tool invocation, for error messages.
pub fn last_stderr_line(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no error output")
        .to_string()
}

/// Check if the current environment has required tools
pub async fn check_dependencies(tools: &ToolsConfig) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&tools.yt_dlp).await {
        missing.push(format!("{} - required for fetching remote media", tools.yt_dlp));
    }

    if !check_command_available(&tools.ffmpeg).await {
        missing.push(format!("{} - required for clip extraction", tools.ffmpeg));
    }

    if !check_command_available(&tools.ffprobe).await {
        missing.push(format!("{} - required for duration probing", tools.ffprobe));
    }

    missing
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
