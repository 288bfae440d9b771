use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::extract::{ClipCutter, FfmpegCutter};
use crate::probe::{DurationProbe, FfprobeProbe};
use crate::source::{ClipRequest, MediaSource, SourceResolver};
use crate::{ClipError, Result};

mod worker;

/// Where a job currently is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// No job has been submitted yet.
    Idle,
    /// Staging the source media into the workspace.
    Resolving,
    /// Determining the media duration and validating the range.
    Probing,
    /// Cutting the requested range out of the source.
    Trimming,
    /// The clip is ready to claim.
    Done,
    Failed,
    Cancelled,
}

impl JobPhase {
    /// True once the job can no longer make progress (or never started).
    /// A settled controller accepts a new submission.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            JobPhase::Idle | JobPhase::Done | JobPhase::Failed | JobPhase::Cancelled
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Idle => "idle",
            JobPhase::Resolving => "resolving",
            JobPhase::Probing => "probing",
            JobPhase::Trimming => "trimming",
            JobPhase::Done => "done",
            JobPhase::Failed => "failed",
            JobPhase::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Snapshot of the current job, safe to poll from any task.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    /// Identifier of the job this snapshot describes, if one was submitted.
    pub job_id: Option<Uuid>,

    pub phase: JobPhase,

    /// Completion estimate; `None` when no meaningful percentage exists.
    pub percent: Option<u8>,

    /// Human-readable description of what the job is doing or why it ended.
    pub message: String,
}

impl JobStatus {
    fn idle() -> Self {
        Self {
            job_id: None,
            phase: JobPhase::Idle,
            percent: None,
            message: "No job submitted".to_string(),
        }
    }
}

/// Token returned by a successful submission.
#[derive(Debug, Clone, Copy)]
pub struct JobHandle {
    pub id: Uuid,
}

/// A finished clip handed out by `claim_result`.
///
/// The file at `path` is deleted once the claim grace period elapses; copy
/// or stream it out before then.
#[derive(Debug)]
pub struct ClaimedClip {
    pub path: PathBuf,

    /// Suggested download filename, derived from the media title and range.
    pub filename: String,
}

/// A produced clip waiting to be claimed. Dropping it deletes the file.
struct PendingClip {
    path: TempPath,
    filename: String,
}

struct JobSlot {
    status: JobStatus,
    cancel: CancellationToken,
    result: Option<PendingClip>,
}

struct JobInner {
    source: Arc<dyn MediaSource>,
    probe: Arc<dyn DurationProbe>,
    cutter: Arc<dyn ClipCutter>,

    /// Parent directory for workspaces and pending outputs; system temp
    /// directory when unset.
    temp_dir: Option<PathBuf>,

    /// How long a claimed clip stays on disk.
    claim_grace: Duration,

    slot: Mutex<JobSlot>,
}

impl JobInner {
    /// Replace the visible snapshot. Called only from the worker.
    fn update(&self, phase: JobPhase, percent: Option<u8>, message: impl Into<String>) {
        let mut slot = self.slot.lock().expect("job slot poisoned");
        slot.status.phase = phase;
        slot.status.percent = percent;
        slot.status.message = message.into();
    }

    fn set_percent(&self, percent: Option<u8>) {
        let mut slot = self.slot.lock().expect("job slot poisoned");
        slot.status.percent = percent;
    }
}

/// Runs at most one clip job at a time and publishes its progress.
///
/// Submitters and pollers share this controller; all pipeline state is
/// mutated by the single worker task a submission spawns. The produced clip
/// follows a claim-once discipline: the first `claim_result` after `Done`
/// hands the file out and schedules its deletion, later claims fail.
///
/// Cloning is cheap and shares the same job slot.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<JobInner>,
}

impl JobController {
    pub fn new(
        source: Arc<dyn MediaSource>,
        probe: Arc<dyn DurationProbe>,
        cutter: Arc<dyn ClipCutter>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                source,
                probe,
                cutter,
                temp_dir: config.app.temp_dir.clone(),
                claim_grace: Duration::from_secs(config.clip.claim_grace_secs),
                slot: Mutex::new(JobSlot {
                    status: JobStatus::idle(),
                    cancel: CancellationToken::new(),
                    result: None,
                }),
            }),
        }
    }

    /// Controller wired to the real yt-dlp/ffprobe/ffmpeg components.
    pub fn with_defaults(config: &Config) -> Self {
        Self::new(
            Arc::new(SourceResolver::new(config)),
            Arc::new(FfprobeProbe::new(&config.tools)),
            Arc::new(FfmpegCutter::new(config)),
            config,
        )
    }

    /// Start executing `request` on a background task.
    ///
    /// Fails with `Busy` while a previous job is still running. Submitting
    /// over a settled job replaces its state; an unclaimed previous clip is
    /// deleted at that point.
    pub fn submit(&self, request: ClipRequest) -> Result<JobHandle> {
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        {
            let mut slot = self.inner.slot.lock().expect("job slot poisoned");
            if !slot.status.phase.is_settled() {
                return Err(ClipError::Busy);
            }

            if let Some(stale) = slot.result.take() {
                tracing::info!("Discarding unclaimed clip {}", stale.filename);
            }

            slot.cancel = cancel.clone();
            slot.status = JobStatus {
                job_id: Some(id),
                phase: JobPhase::Resolving,
                percent: None,
                message: format!("Fetching {}", request.source),
            };
        }

        tracing::info!("Job {} submitted for {}", id, request.source);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            worker::run_job(inner, request, cancel).await;
        });

        Ok(JobHandle { id })
    }

    /// Non-blocking snapshot of the current job.
    pub fn poll_progress(&self) -> JobStatus {
        self.inner.slot.lock().expect("job slot poisoned").status.clone()
    }

    /// Request cancellation of the running job.
    ///
    /// Idempotent; a no-op when no job is running. The worker observes the
    /// token at its checkpoints and kills any extraction subprocess.
    pub fn cancel(&self) {
        let slot = self.inner.slot.lock().expect("job slot poisoned");
        if !slot.status.phase.is_settled() {
            tracing::info!("Cancellation requested");
            slot.cancel.cancel();
        }
    }

    /// Take the finished clip, exactly once.
    ///
    /// Fails `NotReady` while the job is still running, `NotFound` when the
    /// clip was already claimed or the job produced nothing. The file is
    /// deleted after the configured grace period.
    pub fn claim_result(&self) -> Result<ClaimedClip> {
        let mut slot = self.inner.slot.lock().expect("job slot poisoned");

        match slot.status.phase {
            JobPhase::Done => {
                let PendingClip { path, filename } = slot
                    .result
                    .take()
                    .ok_or_else(|| ClipError::NotFound("clip already claimed".to_string()))?;

                let claimed = ClaimedClip {
                    path: path.to_path_buf(),
                    filename: filename.clone(),
                };

                let grace = self.inner.claim_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    tracing::debug!("Deleting claimed clip {} after grace period", filename);
                    drop(path);
                });

                Ok(claimed)
            }
            JobPhase::Idle | JobPhase::Failed | JobPhase::Cancelled => {
                Err(ClipError::NotFound("no clip was produced".to_string()))
            }
            JobPhase::Resolving | JobPhase::Probing | JobPhase::Trimming => {
                Err(ClipError::NotReady)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MockDurationProbe;
    use crate::source::{MediaAsset, ProgressFn};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Source stub that stages a fake file after an optional delay.
    struct StubSource {
        delay: Duration,
    }

    #[async_trait]
    impl MediaSource for StubSource {
        async fn resolve(
            &self,
            _request: &ClipRequest,
            workspace: &Path,
            _progress: ProgressFn<'_>,
            cancel: &CancellationToken,
        ) -> Result<MediaAsset> {
            tokio::select! {
                _ = sleep(self.delay) => {}
                _ = cancel.cancelled() => return Err(ClipError::Cancelled),
            }

            let path = workspace.join("source.mp3");
            tokio::fs::write(&path, b"fake media").await?;
            Ok(MediaAsset {
                path,
                title: "Test Media".to_string(),
                duration: None,
            })
        }
    }

    /// Cutter stub that records invocations and writes a non-empty output.
    struct StubCutter {
        calls: AtomicUsize,
    }

    impl StubCutter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ClipCutter for StubCutter {
        async fn cut(
            &self,
            _input: &Path,
            _start_secs: u64,
            _end_secs: u64,
            output: &Path,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(output, b"trimmed audio").await?;
            Ok(())
        }
    }

    /// Cutter stub that holds the trim open until the token fires, like an
    /// extraction subprocess that only ends when it is killed.
    struct BlockingCutter;

    #[async_trait]
    impl ClipCutter for BlockingCutter {
        async fn cut(
            &self,
            _input: &Path,
            _start_secs: u64,
            _end_secs: u64,
            _output: &Path,
            cancel: &CancellationToken,
        ) -> Result<()> {
            cancel.cancelled().await;
            Err(ClipError::Cancelled)
        }
    }

    fn probe_returning(duration: f64) -> Arc<MockDurationProbe> {
        let mut probe = MockDurationProbe::new();
        probe.expect_probe().returning(move |_| Ok(duration));
        Arc::new(probe)
    }

    fn controller(
        delay: Duration,
        duration: f64,
        cutter: Arc<StubCutter>,
    ) -> JobController {
        let mut config = Config::default();
        config.clip.claim_grace_secs = 1;
        JobController::new(
            Arc::new(StubSource { delay }),
            probe_returning(duration),
            cutter,
            &config,
        )
    }

    fn request(start: &str, end: &str) -> ClipRequest {
        ClipRequest::upload(
            "ignored-by-stub.mp3",
            start.parse().unwrap(),
            end.parse().unwrap(),
        )
        .unwrap()
    }

    async fn poll_until_settled(controller: &JobController) -> JobStatus {
        for _ in 0..500 {
            let status = controller.poll_progress();
            if status.phase.is_settled() {
                return status;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("job never settled: {:?}", controller.poll_progress());
    }

    #[tokio::test]
    async fn test_pipeline_runs_to_done() {
        let cutter = StubCutter::new();
        let controller = controller(Duration::ZERO, 600.0, cutter.clone());

        let handle = controller.submit(request("0:30", "1:00")).unwrap();
        let status = poll_until_settled(&controller).await;

        assert_eq!(status.phase, JobPhase::Done);
        assert_eq!(status.job_id, Some(handle.id));
        assert_eq!(status.percent, Some(100));
        assert_eq!(cutter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_claim_once() {
        let controller = controller(Duration::ZERO, 600.0, StubCutter::new());
        controller.submit(request("0:30", "1:00")).unwrap();
        poll_until_settled(&controller).await;

        let claimed = controller.claim_result().unwrap();
        assert!(claimed.path.exists());
        assert_eq!(claimed.filename, "Test Media_0-30-to-1-00.mp3");

        assert!(matches!(
            controller.claim_result(),
            Err(ClipError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_claimed_clip_deleted_after_grace() {
        let controller = controller(Duration::ZERO, 600.0, StubCutter::new());
        controller.submit(request("0:30", "1:00")).unwrap();
        poll_until_settled(&controller).await;

        let claimed = controller.claim_result().unwrap();
        assert!(claimed.path.exists());

        sleep(Duration::from_millis(1500)).await;
        assert!(!claimed.path.exists());
    }

    #[tokio::test]
    async fn test_claim_before_done_is_not_ready() {
        let controller = controller(Duration::from_millis(500), 600.0, StubCutter::new());
        controller.submit(request("0:30", "1:00")).unwrap();

        assert!(matches!(controller.claim_result(), Err(ClipError::NotReady)));
        controller.cancel();
    }

    #[tokio::test]
    async fn test_submit_while_running_is_busy() {
        let controller = controller(Duration::from_millis(500), 600.0, StubCutter::new());
        controller.submit(request("0:30", "1:00")).unwrap();

        assert!(matches!(
            controller.submit(request("0:10", "0:20")),
            Err(ClipError::Busy)
        ));
        controller.cancel();
        poll_until_settled(&controller).await;
    }

    #[tokio::test]
    async fn test_submit_replaces_settled_job() {
        let controller = controller(Duration::ZERO, 600.0, StubCutter::new());
        controller.submit(request("0:30", "1:00")).unwrap();
        poll_until_settled(&controller).await;

        // The first clip was never claimed; a new submission supersedes it.
        let second = controller.submit(request("0:10", "0:20")).unwrap();
        let status = poll_until_settled(&controller).await;
        assert_eq!(status.phase, JobPhase::Done);
        assert_eq!(status.job_id, Some(second.id));
    }

    #[tokio::test]
    async fn test_cancel_during_resolving() {
        let cutter = StubCutter::new();
        let controller = controller(Duration::from_secs(30), 600.0, cutter.clone());
        controller.submit(request("0:30", "1:00")).unwrap();

        controller.cancel();
        let status = poll_until_settled(&controller).await;

        assert_eq!(status.phase, JobPhase::Cancelled);
        assert_eq!(cutter.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            controller.claim_result(),
            Err(ClipError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_during_trimming() {
        let controller = JobController::new(
            Arc::new(StubSource {
                delay: Duration::ZERO,
            }),
            probe_returning(600.0),
            Arc::new(BlockingCutter),
            &Config::default(),
        );
        controller.submit(request("0:30", "1:00")).unwrap();

        // Let the job reach the cutter before cancelling.
        for _ in 0..500 {
            if controller.poll_progress().phase == JobPhase::Trimming {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(controller.poll_progress().phase, JobPhase::Trimming);

        controller.cancel();
        let status = poll_until_settled(&controller).await;

        assert_eq!(status.phase, JobPhase::Cancelled);
        // Nothing became claimable.
        assert!(matches!(
            controller.claim_result(),
            Err(ClipError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let controller = controller(Duration::ZERO, 600.0, StubCutter::new());
        controller.cancel();
        assert_eq!(controller.poll_progress().phase, JobPhase::Idle);

        // The submission after the no-op cancel still runs normally.
        controller.submit(request("0:30", "1:00")).unwrap();
        let status = poll_until_settled(&controller).await;
        assert_eq!(status.phase, JobPhase::Done);
    }

    #[tokio::test]
    async fn test_range_out_of_bounds() {
        let cutter = StubCutter::new();
        // Media is only 60 seconds long.
        let controller = controller(Duration::ZERO, 60.0, cutter.clone());
        controller.submit(request("0:30", "2:00")).unwrap();

        let status = poll_until_settled(&controller).await;
        assert_eq!(status.phase, JobPhase::Failed);
        // The message restates the valid range.
        assert!(status.message.contains("1:00"), "message: {}", status.message);
        // No extraction subprocess was launched.
        assert_eq!(cutter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_at_duration_is_out_of_bounds() {
        let cutter = StubCutter::new();
        let controller = controller(Duration::ZERO, 60.0, cutter.clone());
        controller.submit(request("1:00", "1:30")).unwrap();

        let status = poll_until_settled(&controller).await;
        assert_eq!(status.phase, JobPhase::Failed);
        assert_eq!(cutter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_poll_is_idempotent() {
        let controller = controller(Duration::ZERO, 600.0, StubCutter::new());
        controller.submit(request("0:30", "1:00")).unwrap();
        poll_until_settled(&controller).await;

        let first = controller.poll_progress();
        let second = controller.poll_progress();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_probe_failure_fails_job() {
        let mut probe = MockDurationProbe::new();
        probe
            .expect_probe()
            .returning(|_| Err(ClipError::ProbeFailed("no duration".to_string())));

        let controller = JobController::new(
            Arc::new(StubSource {
                delay: Duration::ZERO,
            }),
            Arc::new(probe),
            StubCutter::new(),
            &Config::default(),
        );

        controller.submit(request("0:30", "1:00")).unwrap();
        let status = poll_until_settled(&controller).await;
        assert_eq!(status.phase, JobPhase::Failed);
        assert!(status.message.contains("probe failed"));
    }
}
