// src/session/mod.rs
//
// Session = one controller task plus the handle used to drive it.
//
//   let handle = spawn_session(settings, check, sink, clock);
//   handle.start_range(range)?;   // or wait for the default range
//   handle.pause()?; handle.set_speed(500)?; handle.play()?;
//
// State is read through watch snapshots; changes are also pushed to the
// EventSink as EngineEvents.

mod controller;
mod events;

pub use events::{EngineEvent, EventSink, SessionCondition, StopReason};

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::check::ExistenceCheck;
use crate::frames::{Clock, PreloadStatus, TimeRange};
use crate::playback::{PlaybackScheduler, PlaybackState};
use crate::render::LayerStyle;
use crate::settings::EngineSettings;
use controller::{SessionCommand, SessionController, SnapshotSenders};

/// Spawn a session controller on the current tokio runtime.
pub fn spawn_session(
    settings: EngineSettings,
    check: Arc<dyn ExistenceCheck>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
) -> SessionHandle {
    let session_id = format!("session-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    spawn_session_with_id(session_id, settings, check, sink, clock)
}

pub fn spawn_session_with_id(
    session_id: String,
    settings: EngineSettings,
    check: Arc<dyn ExistenceCheck>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let initial_playback = PlaybackScheduler::new(settings.speed_ms).state();
    let (preload_tx, preload_rx) = watch::channel(PreloadStatus::default());
    let (playback_tx, playback_rx) = watch::channel(initial_playback);
    let (condition_tx, condition_rx) = watch::channel(SessionCondition::AwaitingRange);

    let controller = SessionController::new(
        session_id.clone(),
        settings.clone(),
        check,
        sink,
        clock,
        command_rx,
        SnapshotSenders {
            preload: preload_tx,
            playback: playback_tx,
            condition: condition_tx,
        },
    );
    let task = tokio::spawn(controller.run());

    SessionHandle {
        session_id,
        commands: command_tx,
        preload_rx,
        playback_rx,
        condition_rx,
        settings,
        task: Some(task),
    }
}

pub struct SessionHandle {
    session_id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
    preload_rx: watch::Receiver<PreloadStatus>,
    playback_rx: watch::Receiver<PlaybackState>,
    condition_rx: watch::Receiver<SessionCondition>,
    settings: EngineSettings,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Replace the current range. Invalidates the catalog and starts a new
    /// probe run.
    pub fn start_range(&self, range: TimeRange) -> Result<(), String> {
        self.send(SessionCommand::StartRange(range))
    }

    /// Start from the recommended frame, or resume if paused.
    pub fn play(&self) -> Result<(), String> {
        self.send(SessionCommand::Play)
    }

    pub fn pause(&self) -> Result<(), String> {
        self.send(SessionCommand::Pause)
    }

    /// Back to Idle; cancels the pending tick.
    pub fn reset(&self) -> Result<(), String> {
        self.send(SessionCommand::Reset)
    }

    /// Set the delay between ticks. Zero is rejected; other values are
    /// clamped to the configured speed range. Applies from the next tick.
    pub fn set_speed(&self, speed_ms: u64) -> Result<(), String> {
        if speed_ms == 0 {
            return Err("Speed must be greater than zero".to_string());
        }
        let clamped = self.settings.clamp_speed(speed_ms);
        if clamped != speed_ms {
            tlog!(
                "[Session:{}] set_speed: {}ms clamped to {}ms",
                self.session_id,
                speed_ms,
                clamped
            );
        }
        self.send(SessionCommand::SetSpeed(clamped))
    }

    /// Switch the rendered layer; playback restarts from the recommended frame.
    pub fn select_layer(&self, style: LayerStyle) -> Result<(), String> {
        self.send(SessionCommand::SelectLayer(style))
    }

    pub fn preload_status(&self) -> PreloadStatus {
        *self.preload_rx.borrow()
    }

    pub fn playback_state(&self) -> PlaybackState {
        *self.playback_rx.borrow()
    }

    pub fn condition(&self) -> SessionCondition {
        *self.condition_rx.borrow()
    }

    pub fn watch_preload(&self) -> watch::Receiver<PreloadStatus> {
        self.preload_rx.clone()
    }

    pub fn watch_playback(&self) -> watch::Receiver<PlaybackState> {
        self.playback_rx.clone()
    }

    pub fn watch_condition(&self) -> watch::Receiver<SessionCondition> {
        self.condition_rx.clone()
    }

    /// Stop the controller and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<(), String> {
        let _ = self.commands.send(SessionCommand::Shutdown);
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| format!("Session {} task failed: {}", self.session_id, e))?;
        }
        Ok(())
    }

    fn send(&self, command: SessionCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .map_err(|_| format!("Session {} is no longer running", self.session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::testing::StubCheck;
    use crate::frames::{default_base_time, FixedClock, FrameAddressing, TimePoint};
    use crate::playback::PlaybackPhase;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::Instant;

    fn settings() -> EngineSettings {
        EngineSettings {
            resource_root: "https://example.test/frames".to_string(),
            ..EngineSettings::default()
        }
    }

    fn addressing(s: &EngineSettings) -> FrameAddressing {
        FrameAddressing::new(&s.resource_root, &s.resource_suffix, s.interval_minutes)
    }

    fn base() -> TimePoint {
        Utc.with_ymd_and_hms(2025, 5, 12, 16, 40, 0).unwrap()
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 5, 13, 6, 47, 30).unwrap()))
    }

    fn spawn(check: StubCheck) -> (SessionHandle, UnboundedReceiver<EngineEvent>) {
        spawn_with(settings(), check)
    }

    fn spawn_with(
        settings: EngineSettings,
        check: StubCheck,
    ) -> (SessionHandle, UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_session_with_id(
            "test".to_string(),
            settings,
            Arc::new(check),
            Arc::new(tx),
            clock(),
        );
        (handle, rx)
    }

    async fn next_matching<F>(rx: &mut UnboundedReceiver<EngineEvent>, mut pred: F) -> EngineEvent
    where
        F: FnMut(&EngineEvent) -> bool,
    {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    async fn next_active_frame(rx: &mut UnboundedReceiver<EngineEvent>) -> usize {
        match next_matching(rx, |e| matches!(e, EngineEvent::Layers(_))).await {
            EngineEvent::Layers(layers) => {
                let active: Vec<_> = layers.iter().filter(|l| l.active).collect();
                assert_eq!(active.len(), 1, "exactly one active layer");
                active[0].index
            }
            _ => unreachable!(),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // Scenario: {0, 2} of 3 available; start at 0, first tick lands on 2.
    #[tokio::test(start_paused = true)]
    async fn test_sparse_range_plays_and_skips_gap() {
        let s = settings();
        let check = StubCheck::with_indices(&addressing(&s), base(), &[0, 2], Duration::from_millis(20));
        let (handle, mut rx) = spawn(check);
        handle.start_range(TimeRange::frames(base(), 3)).unwrap();

        match next_matching(&mut rx, |e| matches!(e, EngineEvent::CatalogReady { .. })).await {
            EngineEvent::CatalogReady {
                indices,
                recommended_start,
                total_frames,
                ..
            } => {
                assert_eq!(indices, vec![0, 2]);
                assert_eq!(recommended_start, Some(0));
                assert_eq!(total_frames, 3);
            }
            _ => unreachable!(),
        }

        assert_eq!(next_active_frame(&mut rx).await, 0);
        match next_matching(&mut rx, |e| matches!(e, EngineEvent::DisplayTime(_))).await {
            EngineEvent::DisplayTime(t) => {
                assert_eq!((t.hour.as_str(), t.minute.as_str()), ("16", "40"));
            }
            _ => unreachable!(),
        }

        let started = Instant::now();
        assert_eq!(next_active_frame(&mut rx).await, 2);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));

        let state = handle.playback_state();
        assert_eq!(state.phase, PlaybackPhase::Playing);
        assert_eq!(state.current_frame_index, Some(2));
        assert!(handle.preload_status().complete);

        // wraps back to 0
        assert_eq!(next_active_frame(&mut rx).await, 0);
        handle.shutdown().await.unwrap();
    }

    // Scenario: all four checks fail.
    #[tokio::test(start_paused = true)]
    async fn test_empty_catalog_reports_no_data() {
        let (handle, mut rx) = spawn(StubCheck::new(Vec::<String>::new(), Duration::ZERO));
        handle.start_range(TimeRange::frames(base(), 4)).unwrap();

        next_matching(&mut rx, |e| matches!(e, EngineEvent::NoData { .. })).await;
        assert_eq!(handle.condition(), SessionCondition::NoData);
        let status = handle.preload_status();
        assert!(status.complete && !status.in_flight);
        assert_eq!(status.progress_percent, 100);

        handle.play().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, EngineEvent::Layers(_))));
        assert_eq!(handle.playback_state().phase, PlaybackPhase::Idle);
        assert_eq!(handle.playback_state().current_frame_index, None);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_range_after_startup_wait() {
        let started = Instant::now();
        let (handle, mut rx) = spawn(StubCheck::new(Vec::<String>::new(), Duration::ZERO));

        match next_matching(&mut rx, |e| matches!(e, EngineEvent::ProbeStarted { .. })).await {
            EngineEvent::ProbeStarted {
                base: got_base,
                total_frames,
                ..
            } => {
                // 2025-05-13T06:47:30Z - 14h, floored to 10 minutes
                assert_eq!(got_base, base());
                assert_eq!(total_frames, 72);
            }
            _ => unreachable!(),
        }
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_range_prevents_default() {
        let (handle, mut rx) = spawn(StubCheck::new(Vec::<String>::new(), Duration::ZERO));
        handle.start_range(TimeRange::frames(base(), 2)).unwrap();

        next_matching(&mut rx, |e| matches!(e, EngineEvent::NoData { .. })).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, EngineEvent::ProbeStarted { .. })));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_range_supersedes_in_flight_run() {
        let s = settings();
        let a = addressing(&s);
        let other_base = Utc.with_ymd_and_hms(2025, 5, 12, 20, 0, 0).unwrap();
        let mut available: Vec<String> = (0..6).map(|i| a.address(base(), i).locator).collect();
        available.push(a.address(other_base, 1).locator);
        let (handle, mut rx) = spawn(StubCheck::new(available, Duration::from_millis(500)));

        handle.start_range(TimeRange::frames(base(), 6)).unwrap();
        handle.start_range(TimeRange::frames(other_base, 3)).unwrap();

        match next_matching(&mut rx, |e| matches!(e, EngineEvent::CatalogReady { .. })).await {
            EngineEvent::CatalogReady { run_id, indices, .. } => {
                assert_eq!(run_id, 2);
                assert_eq!(indices, vec![1]);
            }
            _ => unreachable!(),
        }
        assert_eq!(next_active_frame(&mut rx).await, 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::CatalogReady { run_id: 1, .. })));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_range_while_probing_is_ignored() {
        let (handle, mut rx) = spawn(StubCheck::new(Vec::<String>::new(), Duration::from_millis(200)));
        handle.start_range(TimeRange::frames(base(), 3)).unwrap();
        handle.start_range(TimeRange::frames(base(), 3)).unwrap();

        let mut probes_started = 0;
        loop {
            match rx.recv().await.unwrap() {
                EngineEvent::ProbeStarted { .. } => probes_started += 1,
                EngineEvent::NoData { run_id, .. } => {
                    assert_eq!(run_id, 1);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(probes_started, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::ProbeStarted { .. })));
        handle.shutdown().await.unwrap();
    }

    // Seven frames, batch size three: progress 0, 43, 86, 100.
    #[tokio::test(start_paused = true)]
    async fn test_progress_events_non_decreasing() {
        let s = settings();
        let check = StubCheck::with_indices(&addressing(&s), base(), &[0, 1, 2, 3, 4, 5, 6], Duration::from_millis(10));
        let (handle, mut rx) = spawn(check);
        handle.start_range(TimeRange::frames(base(), 7)).unwrap();

        let mut progress = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                EngineEvent::PreloadProgress(status) => {
                    progress.push(status);
                    if status.complete {
                        break;
                    }
                }
                _ => {}
            }
        }
        let pcts: Vec<u8> = progress.iter().map(|s| s.progress_percent).collect();
        assert_eq!(pcts, vec![0, 43, 86, 100, 100]);
        assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let s = settings();
        let check = StubCheck::with_indices(&addressing(&s), base(), &[0, 1, 2], Duration::ZERO);
        let (handle, mut rx) = spawn(check);
        handle.start_range(TimeRange::frames(base(), 3)).unwrap();
        assert_eq!(next_active_frame(&mut rx).await, 0);
        assert_eq!(next_active_frame(&mut rx).await, 1);

        handle.pause().unwrap();
        let mut playback = handle.watch_playback();
        playback
            .wait_for(|s| s.phase == PlaybackPhase::Paused)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!drain(&mut rx).iter().any(|e| matches!(e, EngineEvent::Layers(_))));
        assert_eq!(handle.playback_state().current_frame_index, Some(1));

        let resumed = Instant::now();
        handle.play().unwrap();
        assert_eq!(next_active_frame(&mut rx).await, 2);
        assert_eq!(resumed.elapsed(), Duration::from_millis(1500));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_tick() {
        let s = settings();
        let check = StubCheck::with_indices(&addressing(&s), base(), &[0, 1, 2], Duration::ZERO);
        let (handle, mut rx) = spawn(check);
        handle.start_range(TimeRange::frames(base(), 3)).unwrap();
        assert_eq!(next_active_frame(&mut rx).await, 0);

        handle.reset().unwrap();
        let mut playback = handle.watch_playback();
        playback.wait_for(|s| s.phase == PlaybackPhase::Idle).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!drain(&mut rx).iter().any(|e| matches!(e, EngineEvent::Layers(_))));
        assert_eq!(handle.playback_state().current_frame_index, None);

        // play from Idle restarts at the recommended frame
        handle.play().unwrap();
        assert_eq!(next_active_frame(&mut rx).await, 0);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_change_applies_to_next_tick() {
        let s = settings();
        let check = StubCheck::with_indices(&addressing(&s), base(), &[0, 1, 2, 3], Duration::ZERO);
        let (handle, mut rx) = spawn(check);
        handle.start_range(TimeRange::frames(base(), 4)).unwrap();
        assert_eq!(next_active_frame(&mut rx).await, 0);
        let t0 = Instant::now();

        handle.set_speed(500).unwrap();
        assert_eq!(next_active_frame(&mut rx).await, 1);
        // pending 1500ms wait was not shortened
        assert_eq!(t0.elapsed(), Duration::from_millis(1500));

        let t1 = Instant::now();
        assert_eq!(next_active_frame(&mut rx).await, 2);
        assert_eq!(t1.elapsed(), Duration::from_millis(500));
        assert_eq!(handle.playback_state().speed_ms, 500);
        handle.shutdown().await.unwrap();
    }

    // An end far in the future must not produce an unbounded probe run.
    #[tokio::test(start_paused = true)]
    async fn test_long_range_truncated_to_max_frames() {
        let s = EngineSettings {
            max_frame_count: 80,
            ..settings()
        };
        let check = StubCheck::with_indices(&addressing(&s), base(), &[0, 79], Duration::ZERO);
        let (handle, mut rx) = spawn_with(s, check);
        let range = TimeRange::from_params(Some("2025-05-12T16:40:00Z"), Some("9999-12-31"), base())
            .unwrap();
        handle.start_range(range).unwrap();

        match next_matching(&mut rx, |e| matches!(e, EngineEvent::ProbeStarted { .. })).await {
            EngineEvent::ProbeStarted { total_frames, .. } => assert_eq!(total_frames, 80),
            _ => unreachable!(),
        }
        match next_matching(&mut rx, |e| matches!(e, EngineEvent::CatalogReady { .. })).await {
            EngineEvent::CatalogReady {
                total_frames,
                indices,
                summary,
                ..
            } => {
                assert_eq!(total_frames, 80);
                assert_eq!(indices, vec![0, 79]);
                assert_eq!(summary.missing, 78);
            }
            _ => unreachable!(),
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_only_range_starts_at_default_base() {
        let s = settings();
        let check = StubCheck::with_indices(&addressing(&s), base(), &[1], Duration::ZERO);
        let (handle, mut rx) = spawn(check);
        let fallback = default_base_time(clock().now(), s.default_lag_hours, s.interval_minutes);
        let range = TimeRange::from_params(None, Some("2025-05-12T17:00:00Z"), fallback).unwrap();
        handle.start_range(range).unwrap();

        match next_matching(&mut rx, |e| matches!(e, EngineEvent::ProbeStarted { .. })).await {
            EngineEvent::ProbeStarted {
                base: got_base,
                total_frames,
                ..
            } => {
                assert_eq!(got_base, base());
                assert_eq!(total_frames, 3);
            }
            _ => unreachable!(),
        }
        assert_eq!(next_active_frame(&mut rx).await, 1);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_speed_validation() {
        let (handle, _rx) = spawn(StubCheck::new(Vec::<String>::new(), Duration::ZERO));
        assert!(handle.set_speed(0).is_err());

        handle.set_speed(10).unwrap();
        let mut playback = handle.watch_playback();
        let state = *playback.wait_for(|s| s.speed_ms != 1500).await.unwrap();
        assert_eq!(state.speed_ms, 100);

        handle.set_speed(60_000).unwrap();
        let state = *playback.wait_for(|s| s.speed_ms != 100).await.unwrap();
        assert_eq!(state.speed_ms, 3000);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_layer_restarts_with_new_style() {
        let s = settings();
        let check = StubCheck::with_indices(&addressing(&s), base(), &[1, 2], Duration::ZERO);
        let (handle, mut rx) = spawn(check);
        handle.start_range(TimeRange::frames(base(), 3)).unwrap();
        assert_eq!(next_active_frame(&mut rx).await, 1);
        assert_eq!(next_active_frame(&mut rx).await, 2);

        let style = LayerStyle {
            name: "tms_included".to_string(),
            colormap: "rainbow".to_string(),
            clim: [0.0, 10.0],
            ..LayerStyle::default()
        };
        handle.select_layer(style.clone()).unwrap();
        match next_matching(&mut rx, |e| matches!(e, EngineEvent::Layers(_))).await {
            EngineEvent::Layers(layers) => {
                assert!(layers.iter().all(|l| l.style == style));
                let active: Vec<_> = layers.iter().filter(|l| l.active).map(|l| l.index).collect();
                assert_eq!(active, vec![1]);
            }
            _ => unreachable!(),
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_fail_after_shutdown() {
        let (handle, _rx) = spawn(StubCheck::new(Vec::<String>::new(), Duration::ZERO));
        let commands = handle.commands.clone();
        handle.shutdown().await.unwrap();
        assert!(commands.send(SessionCommand::Play).is_err());
    }
}
