use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::{JobInner, JobPhase, PendingClip};
use crate::source::ClipRequest;
use crate::timespec::TimeSpec;
use crate::utils::format_clock;
use crate::{ClipError, Result};

/// Portion of the progress scale covered by the fetch. Probing and trimming
/// report fixed points above it so the bar never moves backwards.
const FETCH_SPAN: f32 = 70.0;
const PROBE_PERCENT: u8 = 75;
const TRIM_PERCENT: u8 = 85;

/// Execute one job end-to-end and leave the slot in a terminal state.
pub(super) async fn run_job(inner: Arc<JobInner>, request: ClipRequest, cancel: CancellationToken) {
    match execute(&inner, &request, &cancel).await {
        Ok(clip) => {
            tracing::info!("Clip ready: {}", clip.filename);
            let message = format!("Clip ready: {}", clip.filename);
            let mut slot = inner.slot.lock().expect("job slot poisoned");
            slot.result = Some(clip);
            slot.status.phase = JobPhase::Done;
            slot.status.percent = Some(100);
            slot.status.message = message;
        }
        Err(ClipError::Cancelled) => {
            tracing::info!("Job cancelled");
            inner.update(JobPhase::Cancelled, None, "Job cancelled");
        }
        Err(e) => {
            tracing::error!("Job failed: {}", e);
            inner.update(JobPhase::Failed, None, e.to_string());
        }
    }
}

async fn execute(
    inner: &Arc<JobInner>,
    request: &ClipRequest,
    cancel: &CancellationToken,
) -> Result<PendingClip> {
    let workspace = create_workspace(inner)?;
    checkpoint(cancel)?;

    // Resolving: stage the source media, relaying fetch progress.
    let progress_inner = Arc::clone(inner);
    let progress = move |percent: Option<f32>| {
        progress_inner.set_percent(percent.map(|p| {
            (p.clamp(0.0, 100.0) / 100.0 * FETCH_SPAN) as u8
        }));
    };
    let mut asset = inner
        .source
        .resolve(request, workspace.path(), &progress, cancel)
        .await?;
    checkpoint(cancel)?;

    // Probing: learn the true duration, then validate the range against it.
    inner.update(
        JobPhase::Probing,
        Some(PROBE_PERCENT),
        "Checking media duration",
    );
    let duration = inner.probe.probe(&asset.path).await?;
    asset.duration = Some(duration);
    tracing::debug!("Probed duration: {:.1}s", duration);

    let start = request.start.as_secs();
    let end = request.end.as_secs();
    if start as f64 >= duration || end as f64 > duration {
        return Err(ClipError::RangeOutOfBounds {
            duration: format_clock(duration),
        });
    }
    checkpoint(cancel)?;

    // Trimming: cut into a file outside the workspace so it survives the
    // teardown below. The TempPath deletes it unless a claim hands it out.
    inner.update(
        JobPhase::Trimming,
        Some(TRIM_PERCENT),
        format!("Cutting {} to {}", request.start, request.end),
    );

    let mut builder = tempfile::Builder::new();
    builder.prefix("clip_").suffix(".mp3");
    let output = match &inner.temp_dir {
        Some(dir) => {
            fs_err::create_dir_all(dir)?;
            builder.tempfile_in(dir)?
        }
        None => builder.tempfile()?,
    }
    .into_temp_path();

    inner
        .cutter
        .cut(&asset.path, start, end, &output, cancel)
        .await?;

    Ok(PendingClip {
        path: output,
        filename: output_filename(&asset.title, request.start, request.end),
    })
    // workspace drops here, deleting the staged source.
}

fn create_workspace(inner: &JobInner) -> Result<TempDir> {
    let workspace = match &inner.temp_dir {
        Some(dir) => {
            fs_err::create_dir_all(dir)?;
            tempfile::Builder::new().prefix("clipjob_").tempdir_in(dir)?
        }
        None => tempfile::Builder::new().prefix("clipjob_").tempdir()?,
    };
    tracing::debug!("Created workspace {}", workspace.path().display());
    Ok(workspace)
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ClipError::Cancelled)
    } else {
        Ok(())
    }
}

/// `{title}_{start}-to-{end}.mp3` with colons made filesystem-safe.
fn output_filename(title: &str, start: TimeSpec, end: TimeSpec) -> String {
    format!(
        "{}_{}-to-{}.mp3",
        title,
        start.to_string().replace(':', "-"),
        end.to_string().replace(':', "-"),
    )
}
