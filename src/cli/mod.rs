use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "clipcut",
    about = "Cut a time-bounded MP3 clip out of a YouTube video or a local media file",
    version,
    long_about = "A CLI tool for extracting audio clips. Give it a YouTube URL (or a direct \
media URL) or a local file, a start time, and an end time, and it produces a trimmed MP3. \
Requires yt-dlp, ffmpeg, and ffprobe."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract a clip from a URL or a local media file
    Clip {
        /// URL of the source video/audio (YouTube or a direct media link)
        #[arg(value_name = "URL", conflicts_with = "file", required_unless_present = "file")]
        url: Option<String>,

        /// Local media file to clip instead of a URL
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Clip start time (ss, mm:ss, or hh:mm:ss)
        #[arg(short, long, value_name = "TIME")]
        start: String,

        /// Clip end time (ss, mm:ss, or hh:mm:ss)
        #[arg(short, long, value_name = "TIME")]
        end: String,

        /// Directory the finished clip is saved into (defaults to the
        /// configured output directory, then the current directory)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that the required external tools are available
    Doctor,
}
