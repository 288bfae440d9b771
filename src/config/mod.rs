use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool binaries
    pub tools: ToolsConfig,

    /// Clip extraction settings
    pub clip: ClipConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp binary, a name looked up in PATH or an explicit path
    pub yt_dlp: String,

    /// ffmpeg binary
    pub ffmpeg: String,

    /// ffprobe binary
    pub ffprobe: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Deadline for the lossless stream-copy trim attempt
    pub copy_deadline_secs: u64,

    /// Deadline for the re-encoding fallback trim
    pub encode_deadline_secs: u64,

    /// Bitrate used when the fallback re-encodes audio
    pub audio_bitrate: String,

    /// How long a claimed clip stays on disk before deletion
    pub claim_grace_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Parent directory for per-job temporary workspaces
    pub temp_dir: Option<PathBuf>,

    /// Default directory for saved clips
    pub output_dir: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            copy_deadline_secs: 30,
            encode_deadline_secs: 300,
            audio_bitrate: "128k".to_string(),
            claim_grace_secs: 5,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("clipcut").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.clip.copy_deadline_secs == 0 {
            anyhow::bail!("copy_deadline_secs must be greater than zero");
        }

        if self.clip.encode_deadline_secs == 0 {
            anyhow::bail!("encode_deadline_secs must be greater than zero");
        }

        if self.clip.audio_bitrate.is_empty() {
            anyhow::bail!("audio_bitrate must be set (e.g. \"128k\")");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current configuration:");
        println!("  yt-dlp: {}", self.tools.yt_dlp);
        println!("  ffmpeg: {}", self.tools.ffmpeg);
        println!("  ffprobe: {}", self.tools.ffprobe);
        println!("  Stream-copy deadline: {}s", self.clip.copy_deadline_secs);
        println!("  Re-encode deadline: {}s", self.clip.encode_deadline_secs);
        println!("  Audio bitrate: {}", self.clip.audio_bitrate);
        println!("  Claim grace period: {}s", self.clip.claim_grace_secs);
        match &self.app.temp_dir {
            Some(dir) => println!("  Temp dir: {}", dir.display()),
            None => println!("  Temp dir: (system default)"),
        }
        match &self.app.output_dir {
            Some(dir) => println!("  Output dir: {}", dir.display()),
            None => println!("  Output dir: (current directory)"),
        }
    }
}
