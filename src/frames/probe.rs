// src/frames/probe.rs
//
// Availability prober: checks every candidate frame of a range in fixed-size
// concurrent batches and collects the survivors into a FrameCatalog.
//
// Batches are strictly sequential. A batch starts only once every check in
// the previous one has settled, so at most `batch_size` checks are
// outstanding. Failed checks are not retried within a run.

use futures::future::join_all;
use serde::Serialize;
use std::time::{Duration, Instant};

use super::address::{FrameAddress, FrameAddressing, TimePoint};
use super::catalog::FrameCatalog;
use crate::check::{CheckError, ExistenceCheck};

/// Progress of the current preload run.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct PreloadStatus {
    /// 0..=100, non-decreasing within a run
    pub progress_percent: u8,
    pub complete: bool,
    pub in_flight: bool,
}

impl PreloadStatus {
    pub fn started() -> Self {
        Self {
            progress_percent: 0,
            complete: false,
            in_flight: true,
        }
    }

    pub fn progress(progress_percent: u8) -> Self {
        Self {
            progress_percent,
            complete: false,
            in_flight: true,
        }
    }

    pub fn finished() -> Self {
        Self {
            progress_percent: 100,
            complete: true,
            in_flight: false,
        }
    }
}

/// `round(min(100, 100 * attempted / total))`
pub fn batch_progress(attempted: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (100.0 * attempted as f64 / total as f64).min(100.0);
    pct.round() as u8
}

#[derive(Clone, Debug)]
pub struct ProbeRequest {
    pub base: TimePoint,
    pub total_frames: usize,
    pub batch_size: usize,
    pub check_timeout: Duration,
}

/// Counts reported once a run finishes.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ProbeSummary {
    pub found: usize,
    pub missing: usize,
    pub duration_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ProbeOutcome {
    pub catalog: FrameCatalog,
    /// Where playback should begin; `None` for an empty catalog
    pub recommended_start: Option<usize>,
    pub summary: ProbeSummary,
}

/// Probe every frame of `request`. `on_progress` is called once with the
/// started status, once after each batch, and once with the finished status.
///
/// `tag` prefixes log lines (e.g. the session id).
pub async fn probe_frames<F>(
    addressing: &FrameAddressing,
    request: &ProbeRequest,
    check: &dyn ExistenceCheck,
    tag: &str,
    mut on_progress: F,
) -> ProbeOutcome
where
    F: FnMut(PreloadStatus),
{
    let start_time = Instant::now();
    let total = request.total_frames;
    let batch_size = request.batch_size.max(1);
    let batch_count = total.div_ceil(batch_size);

    tlog!(
        "[Probe:{}] Starting: {} frames from {} (batch={}, timeout={}ms)",
        tag,
        total,
        request.base.format("%Y-%m-%dT%H:%MZ"),
        batch_size,
        request.check_timeout.as_millis()
    );
    on_progress(PreloadStatus::started());

    let mut survivors: Vec<FrameAddress> = Vec::new();
    let mut attempted = 0usize;
    let mut last_pct = 0u8;

    // Addresses are built one batch at a time.
    for (batch_no, first) in (0..total).step_by(batch_size).enumerate() {
        let batch: Vec<FrameAddress> = (first..(first + batch_size).min(total))
            .map(|index| addressing.address(request.base, index))
            .collect();
        let results = join_all(
            batch
                .iter()
                .map(|frame| check_one(check, frame, request.check_timeout)),
        )
        .await;

        for (frame, result) in batch.iter().zip(results) {
            match result {
                Ok(()) => survivors.push(frame.clone()),
                Err(e) => {
                    tlog!("[Probe:{}] Frame {} unavailable: {}", tag, frame.index, e);
                }
            }
        }

        attempted += batch.len();
        let pct = batch_progress(attempted, total).max(last_pct);
        last_pct = pct;
        tlog!(
            "[Probe:{}] Batch {}/{} settled ({}%)",
            tag,
            batch_no + 1,
            batch_count,
            pct
        );
        on_progress(PreloadStatus::progress(pct));
    }

    let catalog = FrameCatalog::from_frames(total, survivors);
    let recommended_start = catalog.recommended_start();
    let summary = ProbeSummary {
        found: catalog.len(),
        missing: total - catalog.len(),
        duration_ms: start_time.elapsed().as_millis() as u64,
    };

    tlog!(
        "[Probe:{}] Complete: {} found, {} missing in {}ms",
        tag,
        summary.found,
        summary.missing,
        summary.duration_ms
    );
    on_progress(PreloadStatus::finished());

    ProbeOutcome {
        catalog,
        recommended_start,
        summary,
    }
}

async fn check_one(
    check: &dyn ExistenceCheck,
    frame: &FrameAddress,
    timeout: Duration,
) -> Result<(), CheckError> {
    match tokio::time::timeout(timeout, check.check(&frame.locator)).await {
        Ok(result) => result,
        Err(_) => Err(CheckError::Timeout(timeout)),
    }
}
