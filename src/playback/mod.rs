// src/playback/mod.rs
//
// Timed, cancellable playback over a frame catalog.

mod scheduler;

pub use scheduler::{PlaybackPhase, PlaybackScheduler, PlaybackState, TickOutcome, TickTimer};
