// src/session/events.rs
//
// Events published by a session to its rendering surface, time display and
// controls.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::frames::{DisplayTime, PreloadStatus, ProbeSummary, TimePoint};
use crate::playback::PlaybackState;
use crate::render::RasterLayer;

/// Coarse session condition, alongside the preload and playback snapshots.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionCondition {
    /// Waiting for an explicit range or the default fallback
    AwaitingRange,
    Probing,
    /// Catalog installed with at least one frame
    Ready,
    /// The last probe run found nothing
    NoData,
    /// Playback could not reach any frame
    NoValidFrames,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    NoValidFrames,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// A probe run began for this range
    ProbeStarted {
        run_id: u64,
        base: TimePoint,
        total_frames: usize,
    },
    PreloadProgress(PreloadStatus),
    /// A probe run finished and its catalog is installed
    CatalogReady {
        run_id: u64,
        total_frames: usize,
        indices: Vec<usize>,
        recommended_start: Option<usize>,
        summary: ProbeSummary,
    },
    /// Nothing in the requested range is servable
    NoData {
        run_id: u64,
        base: TimePoint,
        total_frames: usize,
    },
    /// Every known frame, exactly one active
    Layers(Vec<RasterLayer>),
    DisplayTime(DisplayTime),
    PlaybackChanged(PlaybackState),
    PlaybackStopped {
        reason: StopReason,
    },
    ConditionChanged {
        previous: SessionCondition,
        current: SessionCondition,
    },
}

impl EngineEvent {
    /// Event name, matching the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::ProbeStarted { .. } => "probe-started",
            EngineEvent::PreloadProgress(_) => "preload-progress",
            EngineEvent::CatalogReady { .. } => "catalog-ready",
            EngineEvent::NoData { .. } => "no-data",
            EngineEvent::Layers(_) => "layers",
            EngineEvent::DisplayTime(_) => "display-time",
            EngineEvent::PlaybackChanged(_) => "playback-changed",
            EngineEvent::PlaybackStopped { .. } => "playback-stopped",
            EngineEvent::ConditionChanged { .. } => "condition-changed",
        }
    }
}

/// Receiver of session events. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

impl EventSink for mpsc::UnboundedSender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        // Receiver gone means nobody is watching; nothing to do.
        let _ = self.send(event);
    }
}
