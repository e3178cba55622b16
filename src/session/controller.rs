// src/session/controller.rs
//
// Session controller task. Owns the catalog, the preload status and the
// playback scheduler; everything else sees snapshots (watch channels) or
// events (EventSink).
//
// One task, one select loop:
//   - commands from the SessionHandle
//   - messages from the current probe run (tagged with its run id)
//   - the single pending playback tick
//   - the startup timer that triggers the default range

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};

use super::events::{EngineEvent, EventSink, SessionCondition, StopReason};
use crate::check::ExistenceCheck;
use crate::frames::{
    default_base_time, probe_frames, Clock, FrameAddressing, FrameCatalog, PreloadStatus,
    ProbeOutcome, ProbeRequest, TimePoint, TimeRange,
};
use crate::playback::{PlaybackPhase, PlaybackScheduler, PlaybackState, TickOutcome, TickTimer};
use crate::render::{raster_layers, LayerStyle};
use crate::settings::EngineSettings;

#[derive(Debug)]
pub(crate) enum SessionCommand {
    StartRange(TimeRange),
    Play,
    Pause,
    Reset,
    SetSpeed(u64),
    SelectLayer(LayerStyle),
    Shutdown,
}

enum ProbeMessage {
    Progress { run_id: u64, status: PreloadStatus },
    Complete { run_id: u64, outcome: ProbeOutcome },
}

struct PendingTick {
    token: u64,
    sleep: Pin<Box<Sleep>>,
}

/// Resolves with the token of the pending tick, or never if none is armed.
async fn wait_for_tick(tick: &mut Option<PendingTick>) -> u64 {
    match tick {
        Some(t) => {
            t.sleep.as_mut().await;
            t.token
        }
        None => pending().await,
    }
}

pub(crate) struct SnapshotSenders {
    pub preload: watch::Sender<PreloadStatus>,
    pub playback: watch::Sender<PlaybackState>,
    pub condition: watch::Sender<SessionCondition>,
}

pub(crate) struct SessionController {
    session_id: String,
    settings: EngineSettings,
    addressing: FrameAddressing,
    check: Arc<dyn ExistenceCheck>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    style: LayerStyle,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    probe_tx: mpsc::UnboundedSender<ProbeMessage>,
    probe_rx: mpsc::UnboundedReceiver<ProbeMessage>,
    /// Id of the current probe run; messages from older runs are dropped
    run_id: u64,
    probe_task: Option<JoinHandle<()>>,
    /// (base, total_frames) of the current run
    active_range: Option<(TimePoint, usize)>,
    catalog: Option<Arc<FrameCatalog>>,
    preload: PreloadStatus,
    condition: SessionCondition,
    scheduler: PlaybackScheduler,
    tick: Option<PendingTick>,
    snapshots: SnapshotSenders,
}

impl SessionController {
    pub(crate) fn new(
        session_id: String,
        settings: EngineSettings,
        check: Arc<dyn ExistenceCheck>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        snapshots: SnapshotSenders,
    ) -> Self {
        let addressing = FrameAddressing::new(
            &settings.resource_root,
            &settings.resource_suffix,
            settings.interval_minutes,
        );
        let (probe_tx, probe_rx) = mpsc::unbounded_channel();
        Self {
            session_id,
            addressing,
            check,
            sink,
            clock,
            style: settings.layer.clone(),
            commands,
            probe_tx,
            probe_rx,
            run_id: 0,
            probe_task: None,
            active_range: None,
            catalog: None,
            preload: PreloadStatus::default(),
            condition: SessionCondition::AwaitingRange,
            scheduler: PlaybackScheduler::new(settings.speed_ms),
            tick: None,
            snapshots,
            settings,
        }
    }

    pub(crate) async fn run(mut self) {
        tlog!(
            "[Session:{}] Started; default range in {}ms unless one is supplied",
            self.session_id,
            self.settings.startup_wait_ms
        );
        let startup = sleep(Duration::from_millis(self.settings.startup_wait_ms));
        tokio::pin!(startup);
        let mut awaiting_range = true;

        loop {
            tokio::select! {
                _ = &mut startup, if awaiting_range => {
                    awaiting_range = false;
                    self.start_default_range();
                }
                command = self.commands.recv() => {
                    match command {
                        None | Some(SessionCommand::Shutdown) => break,
                        Some(SessionCommand::StartRange(range)) => {
                            awaiting_range = false;
                            self.start_range(range);
                        }
                        Some(command) => self.handle_command(command),
                    }
                }
                Some(message) = self.probe_rx.recv() => self.handle_probe_message(message),
                token = wait_for_tick(&mut self.tick) => {
                    self.tick = None;
                    self.handle_tick(token);
                }
            }
        }

        if let Some(task) = self.probe_task.take() {
            task.abort();
        }
        self.tick = None;
        self.scheduler.reset();
        self.publish_playback();
        tlog!("[Session:{}] Stopped", self.session_id);
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Play => self.play(),
            SessionCommand::Pause => {
                if self.scheduler.pause() {
                    self.tick = None;
                    tlog!(
                        "[Playback:{}] Paused at frame {:?}",
                        self.session_id,
                        self.scheduler.current_frame_index()
                    );
                    self.publish_playback();
                }
            }
            SessionCommand::Reset => self.reset_playback(),
            SessionCommand::SetSpeed(speed_ms) => {
                tlog!("[Playback:{}] set_speed: {}ms", self.session_id, speed_ms);
                self.scheduler.set_speed(speed_ms);
                self.publish_playback();
            }
            SessionCommand::SelectLayer(style) => {
                tlog!("[Session:{}] Layer changed to '{}'", self.session_id, style.name);
                self.style = style;
                self.reset_playback();
                self.start_from_recommended();
            }
            // Handled by the run loop.
            SessionCommand::StartRange(_) | SessionCommand::Shutdown => {}
        }
    }

    fn start_default_range(&mut self) {
        let base = default_base_time(
            self.clock.now(),
            self.settings.default_lag_hours,
            self.settings.interval_minutes,
        );
        tlog!(
            "[Session:{}] No range supplied, using default base {}",
            self.session_id,
            base.format("%Y-%m-%dT%H:%MZ")
        );
        self.begin_probe(base, self.settings.default_frame_count);
    }

    fn start_range(&mut self, range: TimeRange) {
        let interval = self.settings.interval_minutes;
        let base = range.base(interval);
        let requested = range.frame_count(interval, self.settings.default_frame_count);
        let total = requested.min(self.settings.max_frame_count);
        if total < requested {
            tlog!(
                "[Session:{}] Range {} x{} truncated to {} frames",
                self.session_id,
                base.format("%Y-%m-%dT%H:%MZ"),
                requested,
                total
            );
        }

        if self.preload.in_flight && self.active_range == Some((base, total)) {
            tlog!(
                "[Session:{}] Range {} x{} already probing, ignoring",
                self.session_id,
                base.format("%Y-%m-%dT%H:%MZ"),
                total
            );
            return;
        }
        self.begin_probe(base, total);
    }

    /// Invalidate the catalog and playback, then start probing a new range.
    /// Any previous run is aborted first, so only one run is ever in flight.
    fn begin_probe(&mut self, base: TimePoint, total_frames: usize) {
        if let Some(task) = self.probe_task.take() {
            task.abort();
            tlog!("[Session:{}] Aborted probe run {}", self.session_id, self.run_id);
        }
        self.tick = None;
        self.scheduler.reset();
        self.catalog = None;
        self.publish_playback();

        self.run_id += 1;
        let run_id = self.run_id;
        self.active_range = Some((base, total_frames));
        self.preload = PreloadStatus::started();
        self.snapshots.preload.send_replace(self.preload);
        self.set_condition(SessionCondition::Probing);
        self.sink.emit(EngineEvent::ProbeStarted {
            run_id,
            base,
            total_frames,
        });
        self.sink.emit(EngineEvent::PreloadProgress(self.preload));

        let request = ProbeRequest {
            base,
            total_frames,
            batch_size: self.settings.batch_size,
            check_timeout: Duration::from_millis(self.settings.check_timeout_ms),
        };
        let addressing = self.addressing.clone();
        let check = self.check.clone();
        let tx = self.probe_tx.clone();
        let tag = format!("{}#{}", self.session_id, run_id);

        self.probe_task = Some(tokio::spawn(async move {
            let progress_tx = tx.clone();
            let outcome = probe_frames(&addressing, &request, check.as_ref(), &tag, |status| {
                let _ = progress_tx.send(ProbeMessage::Progress { run_id, status });
            })
            .await;
            let _ = tx.send(ProbeMessage::Complete { run_id, outcome });
        }));
    }

    fn handle_probe_message(&mut self, message: ProbeMessage) {
        match message {
            ProbeMessage::Progress { run_id, status } => {
                if run_id != self.run_id || !status.in_flight {
                    return;
                }
                if status.progress_percent > self.preload.progress_percent {
                    self.preload = status;
                    self.snapshots.preload.send_replace(self.preload);
                    self.sink.emit(EngineEvent::PreloadProgress(self.preload));
                }
            }
            ProbeMessage::Complete { run_id, outcome } => {
                if run_id != self.run_id {
                    tlog!(
                        "[Session:{}] Discarding result of superseded run {}",
                        self.session_id,
                        run_id
                    );
                    return;
                }
                self.install_catalog(run_id, outcome);
            }
        }
    }

    fn install_catalog(&mut self, run_id: u64, outcome: ProbeOutcome) {
        self.probe_task = None;
        self.preload = PreloadStatus::finished();
        self.snapshots.preload.send_replace(self.preload);
        self.sink.emit(EngineEvent::PreloadProgress(self.preload));

        let catalog = Arc::new(outcome.catalog);
        self.catalog = Some(catalog.clone());
        self.sink.emit(EngineEvent::CatalogReady {
            run_id,
            total_frames: catalog.total_frames(),
            indices: catalog.indices_in_order(),
            recommended_start: outcome.recommended_start,
            summary: outcome.summary,
        });

        if catalog.is_empty() {
            tlog!("[Session:{}] No data in range", self.session_id);
            self.set_condition(SessionCondition::NoData);
            let (base, total_frames) = self
                .active_range
                .unwrap_or((self.clock.now(), catalog.total_frames()));
            self.sink.emit(EngineEvent::NoData {
                run_id,
                base,
                total_frames,
            });
            return;
        }

        self.set_condition(SessionCondition::Ready);
        self.start_from_recommended();
    }

    fn play(&mut self) {
        match self.scheduler.phase() {
            PlaybackPhase::Playing => {}
            PlaybackPhase::Paused => {
                if let Some(timer) = self.scheduler.resume() {
                    self.arm(timer);
                    tlog!("[Playback:{}] Resumed", self.session_id);
                    self.publish_playback();
                }
            }
            PlaybackPhase::Idle | PlaybackPhase::Stopped => {
                if !self.start_from_recommended() {
                    tlog!(
                        "[Playback:{}] play ignored: no frames available yet",
                        self.session_id
                    );
                }
            }
        }
    }

    /// Start playback at the catalog's recommended frame. False when there
    /// is no non-empty catalog.
    fn start_from_recommended(&mut self) -> bool {
        let Some(catalog) = self.catalog.clone() else {
            return false;
        };
        let Some(start) = catalog.recommended_start() else {
            return false;
        };
        match self.scheduler.start(&catalog, start) {
            Ok(timer) => {
                self.arm(timer);
                if self.condition == SessionCondition::NoValidFrames {
                    self.set_condition(SessionCondition::Ready);
                }
                tlog!(
                    "[Playback:{}] Playing from frame {} every {}ms",
                    self.session_id,
                    start,
                    self.scheduler.state().speed_ms
                );
                self.publish_playback();
                self.show_frame(&catalog, start);
                true
            }
            Err(e) => {
                tlog!("[Playback:{}] {}", self.session_id, e);
                false
            }
        }
    }

    fn reset_playback(&mut self) {
        self.tick = None;
        self.scheduler.reset();
        self.publish_playback();
    }

    fn handle_tick(&mut self, token: u64) {
        let Some(catalog) = self.catalog.clone() else {
            return;
        };
        match self.scheduler.on_tick(token, &catalog) {
            TickOutcome::Advanced {
                index,
                changed,
                next,
            } => {
                self.arm(next);
                self.publish_playback();
                if changed {
                    self.show_frame(&catalog, index);
                }
            }
            TickOutcome::Exhausted => {
                tlog!(
                    "[Playback:{}] No valid frames found, stopping",
                    self.session_id
                );
                self.tick = None;
                self.publish_playback();
                self.set_condition(SessionCondition::NoValidFrames);
                self.sink.emit(EngineEvent::PlaybackStopped {
                    reason: StopReason::NoValidFrames,
                });
            }
            TickOutcome::Stale => {}
        }
    }

    fn arm(&mut self, timer: TickTimer) {
        self.tick = Some(PendingTick {
            token: timer.token,
            sleep: Box::pin(sleep(timer.delay)),
        });
    }

    fn show_frame(&self, catalog: &FrameCatalog, index: usize) {
        self.sink
            .emit(EngineEvent::Layers(raster_layers(catalog, &self.style, Some(index))));
        if let Some(frame) = catalog.get(index) {
            self.sink.emit(EngineEvent::DisplayTime(frame.display_time()));
        }
    }

    fn publish_playback(&self) {
        let state = self.scheduler.state();
        if *self.snapshots.playback.borrow() != state {
            self.snapshots.playback.send_replace(state);
            self.sink.emit(EngineEvent::PlaybackChanged(state));
        }
    }

    fn set_condition(&mut self, condition: SessionCondition) {
        if self.condition == condition {
            return;
        }
        let previous = self.condition;
        self.condition = condition;
        self.snapshots.condition.send_replace(condition);
        self.sink.emit(EngineEvent::ConditionChanged {
            previous,
            current: condition,
        });
    }
}
