// src/playback/scheduler.rs
//
// Playback state machine: Idle -> Playing <-> Paused, with Stopped when no
// frame can be reached and reset back to Idle from anywhere.
//
// The scheduler does not sleep itself. Each transition that needs a tick
// returns a `TickTimer` for the owner to arm, and the owner hands the timer
// token back through `on_tick` when it fires. Only the most recently armed
// token is honoured, so at most one tick is ever pending.

use serde::Serialize;
use std::time::Duration;

use crate::frames::FrameCatalog;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Paused,
    Stopped,
}

/// Snapshot published to controls and displays.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    pub current_frame_index: Option<usize>,
    pub is_playing: bool,
    pub speed_ms: u64,
}

/// Request to arm the single tick timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickTimer {
    pub token: u64,
    pub delay: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Cursor moved (or stayed, for a singleton catalog); arm `next`
    Advanced {
        index: usize,
        changed: bool,
        next: TickTimer,
    },
    /// No occupied frame within `total_frames` attempts; now Stopped
    Exhausted,
    /// Token was cancelled or superseded; nothing happened
    Stale,
}

pub struct PlaybackScheduler {
    phase: PlaybackPhase,
    current: Option<usize>,
    speed_ms: u64,
    /// Last token handed out; bumped on every arm and cancel
    token: u64,
    pending: Option<u64>,
}

impl PlaybackScheduler {
    pub fn new(speed_ms: u64) -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            current: None,
            speed_ms: speed_ms.max(1),
            token: 0,
            pending: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            phase: self.phase,
            current_frame_index: self.current,
            is_playing: self.phase == PlaybackPhase::Playing,
            speed_ms: self.speed_ms,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn current_frame_index(&self) -> Option<usize> {
        self.current
    }

    pub fn pending_token(&self) -> Option<u64> {
        self.pending
    }

    /// Start playing from `start_index`. Valid from any state; the catalog
    /// must contain `start_index`.
    pub fn start(&mut self, catalog: &FrameCatalog, start_index: usize) -> Result<TickTimer, String> {
        if catalog.is_empty() {
            return Err("Cannot start playback: catalog is empty".to_string());
        }
        if !catalog.contains(start_index) {
            return Err(format!(
                "Cannot start playback: frame {} is not in the catalog",
                start_index
            ));
        }
        self.current = Some(start_index);
        self.phase = PlaybackPhase::Playing;
        Ok(self.arm())
    }

    /// Playing -> Paused. Cancels the pending tick; the cursor is kept.
    pub fn pause(&mut self) -> bool {
        if self.phase != PlaybackPhase::Playing {
            return false;
        }
        self.cancel();
        self.phase = PlaybackPhase::Paused;
        true
    }

    /// Paused -> Playing, with a fresh tick after the current speed.
    pub fn resume(&mut self) -> Option<TickTimer> {
        if self.phase != PlaybackPhase::Paused {
            return None;
        }
        self.phase = PlaybackPhase::Playing;
        Some(self.arm())
    }

    /// Any state -> Idle. Cancels the pending tick and clears the cursor.
    pub fn reset(&mut self) {
        self.cancel();
        self.phase = PlaybackPhase::Idle;
        self.current = None;
    }

    /// Applies from the next armed tick; a pending one keeps its delay.
    pub fn set_speed(&mut self, speed_ms: u64) {
        self.speed_ms = speed_ms.max(1);
    }

    /// Handle a fired timer. Never fails: an unreachable next frame moves
    /// the scheduler to Stopped.
    pub fn on_tick(&mut self, token: u64, catalog: &FrameCatalog) -> TickOutcome {
        if self.pending != Some(token) || self.phase != PlaybackPhase::Playing {
            return TickOutcome::Stale;
        }
        self.pending = None;

        let current = self.current.unwrap_or(0);
        match catalog.next_occupied_after(current) {
            Some(index) => {
                self.current = Some(index);
                TickOutcome::Advanced {
                    index,
                    changed: index != current,
                    next: self.arm(),
                }
            }
            None => {
                self.phase = PlaybackPhase::Stopped;
                TickOutcome::Exhausted
            }
        }
    }

    fn arm(&mut self) -> TickTimer {
        self.token += 1;
        self.pending = Some(self.token);
        TickTimer {
            token: self.token,
            delay: Duration::from_millis(self.speed_ms),
        }
    }

    fn cancel(&mut self) {
        self.token += 1;
        self.pending = None;
    }
}
