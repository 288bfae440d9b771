//! clipcut - cut time-bounded MP3 clips out of YouTube videos and local media
//!
//! This library drives external yt-dlp/ffprobe/ffmpeg processes to fetch a
//! source, probe its duration, and trim a clip, orchestrated by a single-job
//! controller that exposes progress polling, cancellation, and claim-once
//! result retrieval.

pub mod cli;
pub mod config;
pub mod extract;
pub mod job;
pub mod probe;
pub mod source;
pub mod timespec;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extract::{ClipCutter, FfmpegCutter};
pub use job::{ClaimedClip, JobController, JobHandle, JobPhase, JobStatus};
pub use probe::{DurationProbe, FfprobeProbe};
pub use source::{ClipRequest, MediaAsset, MediaSource, SourceKind, SourceResolver};
pub use timespec::TimeSpec;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, ClipError>;

/// Errors a clip job can surface. Every variant maps to a user-correctable
/// or user-reportable condition; the worker turns them into a terminal job
/// state instead of crashing.
#[derive(thiserror::Error, Debug)]
pub enum ClipError {
    /// The time string was not `ss`, `mm:ss`, or `hh:mm:ss`.
    #[error("invalid time format: {0}")]
    InvalidFormat(String),

    #[error("end time must be after start time")]
    InvalidRange,

    /// Upload extension outside the allow-list.
    #[error("unsupported media format: {0}")]
    UnsupportedFormat(String),

    /// Missing upload file, or nothing left to claim.
    #[error("{0}")]
    NotFound(String),

    #[error("source fetch failed: {0}")]
    FetchFailed(String),

    #[error("duration probe failed: {0}")]
    ProbeFailed(String),

    /// The requested range falls outside the probed media duration.
    #[error("requested range exceeds the media duration (media runs 0:00 to {duration})")]
    RangeOutOfBounds { duration: String },

    #[error("clip extraction failed: {0}")]
    CutFailed(String),

    #[error("{operation} did not finish within {limit_secs}s")]
    Timeout { operation: String, limit_secs: u64 },

    #[error("a clip job is already running")]
    Busy,

    #[error("job was cancelled")]
    Cancelled,

    #[error("no finished clip to claim yet")]
    NotReady,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
