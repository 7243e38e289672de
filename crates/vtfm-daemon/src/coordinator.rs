//! The playback coordinator.
//!
//! A single task owns the selection, the load state, the displayed title and
//! the refresh timer.  Everything that wants to change them (client
//! commands, timer ticks, finished title fetches) arrives as a
//! [`CoordinatorEvent`] on one queue, so operations never interleave: a
//! toggle that is still loading the playlist finishes before the next
//! command is looked at.
//!
//! Failures never end the loop.  Engine errors are reported to clients as a
//! notice and leave the load state at a value that makes the next toggle do
//! the right thing.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vtfm_proto::catalog::{Catalog, QualityId, Selection, StationId, TrackKey};
use vtfm_proto::now_playing::{NowPlayingError, TitleSource, DEFAULT_TITLE};
use vtfm_proto::protocol::{Command, LoadState, PlaybackState, PlayerState};
use vtfm_proto::store::{KeyValueStore, Preferences};

use crate::engine::{EngineError, EngineOptions, PlaybackEngine};
use crate::refresh::RefreshTimer;
use crate::BroadcastMessage;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("unknown station {0}")]
    UnknownStation(StationId),
    #[error("unknown quality {0}")]
    UnknownQuality(QualityId),
    #[error("playback failed: {0}")]
    Engine(#[from] EngineError),
    #[error("coordinator is not running")]
    Closed,
}

type Reply = oneshot::Sender<Result<PlayerState, CoordinatorError>>;

/// Everything the coordinator task reacts to.
pub enum CoordinatorEvent {
    Request {
        command: Command,
        reply: Reply,
    },
    RefreshTick {
        station: StationId,
    },
    TitleFetched {
        generation: u64,
        station: StationId,
        result: Result<String, NowPlayingError>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub refresh_interval: Duration,
    /// Go back to the first station whenever playback is stopped.
    pub reset_station_on_stop: bool,
    pub onboarding_link: String,
    pub engine_options: EngineOptions,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            reset_station_on_stop: false,
            onboarding_link: String::new(),
            engine_options: EngineOptions::default(),
        }
    }
}

/// Collaborators handed to the coordinator at startup.
pub struct CoordinatorParts {
    pub catalog: Arc<Catalog>,
    pub engine: Arc<dyn PlaybackEngine>,
    pub store: Arc<dyn KeyValueStore>,
    pub titles: Arc<dyn TitleSource>,
    pub broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable entry point used by the socket server and the HTTP API.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    /// Queue `command` and wait for it to finish.  Returns the snapshot taken
    /// right after the command ran.
    pub async fn execute(&self, command: Command) -> Result<PlayerState, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorEvent::Request { command, reply })
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        rx.await.map_err(|_| CoordinatorError::Closed)?
    }

    pub async fn toggle_playback(&self) -> Result<PlayerState, CoordinatorError> {
        self.execute(Command::TogglePlayback).await
    }

    pub async fn change_station(&self, station: StationId) -> Result<PlayerState, CoordinatorError> {
        self.execute(Command::ChangeStation { station }).await
    }

    pub async fn change_quality(&self, quality: QualityId) -> Result<PlayerState, CoordinatorError> {
        self.execute(Command::ChangeQuality { quality }).await
    }

    pub async fn stop(&self) -> Result<PlayerState, CoordinatorError> {
        self.execute(Command::Stop).await
    }

    pub async fn dismiss_onboarding(&self, remember: bool) -> Result<PlayerState, CoordinatorError> {
        self.execute(Command::DismissOnboarding { remember }).await
    }

    pub async fn snapshot(&self) -> Result<PlayerState, CoordinatorError> {
        self.execute(Command::GetState).await
    }

    /// Tear the coordinator down and wait until it is gone.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(CoordinatorEvent::Shutdown { done }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

// ── coordinator ───────────────────────────────────────────────────────────────

pub struct Coordinator {
    catalog: Arc<Catalog>,
    engine: Arc<dyn PlaybackEngine>,
    prefs: Preferences,
    titles: Arc<dyn TitleSource>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    self_tx: mpsc::WeakSender<CoordinatorEvent>,
    settings: CoordinatorSettings,

    selection: Selection,
    load_state: LoadState,
    playback: PlaybackState,
    title: String,
    onboarding_pending: bool,
    notice: Option<String>,
    rev: u64,

    refresh: Option<RefreshTimer>,
    /// Bumped whenever a title fetch result would no longer be current.
    title_generation: u64,
}

impl Coordinator {
    /// Restore persisted choices, set up the engine and start the task.
    pub async fn spawn(
        parts: CoordinatorParts,
        settings: CoordinatorSettings,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let prefs = Preferences::new(parts.store);
        let selection = prefs.restore_selection(&parts.catalog).await;
        let onboarding_pending = prefs.onboarding_pending().await;
        info!(
            "coordinator: restored station {} quality {} (onboarding pending: {})",
            selection.station, selection.quality, onboarding_pending
        );

        let mut coordinator = Coordinator {
            catalog: parts.catalog,
            engine: parts.engine,
            prefs,
            titles: parts.titles,
            broadcast_tx: parts.broadcast_tx,
            self_tx: tx.downgrade(),
            settings,
            selection,
            load_state: LoadState::Empty,
            playback: PlaybackState::Idle,
            title: DEFAULT_TITLE.to_string(),
            onboarding_pending,
            notice: None,
            rev: 0,
            refresh: None,
            title_generation: 0,
        };
        coordinator.start_engine().await;

        let task = tokio::spawn(coordinator.run(rx));
        (CoordinatorHandle { tx }, task)
    }

    async fn start_engine(&mut self) {
        if let Err(e) = self.engine.setup().await {
            warn!("coordinator: engine setup failed: {}", e);
            self.notice = Some(format!("Audio engine unavailable: {}", e));
            return;
        }
        if let Err(e) = self
            .engine
            .update_options(self.settings.engine_options.clone())
            .await
        {
            warn!("coordinator: engine rejected options: {}", e);
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<CoordinatorEvent>) {
        self.arm_refresh();
        self.publish_state();

        while let Some(event) = rx.recv().await {
            match event {
                CoordinatorEvent::Request { command, reply } => {
                    let result = self.handle_request(command).await;
                    let _ = reply.send(result);
                }
                CoordinatorEvent::RefreshTick { station } => {
                    if station != self.selection.station {
                        debug!("coordinator: dropping tick for old station {}", station);
                        continue;
                    }
                    let changed = self.poll_engine().await;
                    self.refresh_title().await;
                    if changed {
                        self.publish_state();
                    }
                }
                CoordinatorEvent::TitleFetched {
                    generation,
                    station,
                    result,
                } => self.apply_title(generation, station, result),
                CoordinatorEvent::Shutdown { done } => {
                    self.teardown().await;
                    let _ = done.send(());
                    return;
                }
            }
        }
        self.teardown().await;
    }

    async fn handle_request(&mut self, command: Command) -> Result<PlayerState, CoordinatorError> {
        if command == Command::GetState {
            return Ok(self.snapshot());
        }
        debug!("coordinator: {:?}", command);

        let result = match command {
            Command::TogglePlayback => self.toggle_playback().await,
            Command::ChangeStation { station } => self.change_station(station).await,
            Command::ChangeQuality { quality } => self.change_quality(quality).await,
            Command::Stop => {
                self.stop().await;
                Ok(())
            }
            Command::DismissOnboarding { remember } => {
                self.dismiss_onboarding(remember).await;
                Ok(())
            }
            Command::GetState => Ok(()),
        };

        match &result {
            Ok(()) => self.notice = None,
            Err(CoordinatorError::Engine(e)) => self.report(format!("Playback failed: {}", e)),
            Err(e) => debug!("coordinator: rejected: {}", e),
        }
        self.publish_state();
        result.map(|()| self.snapshot())
    }

    // ── operations ────────────────────────────────────────────────────────────

    async fn toggle_playback(&mut self) -> Result<(), CoordinatorError> {
        self.reconcile_load_state().await;

        if self.load_state == LoadState::Empty {
            let result = self.cold_start().await;
            self.refresh_title().await;
            return result.map_err(Into::into);
        }

        let current = self.engine.playback_state().await?;
        if current.is_active() {
            self.engine.pause().await?;
            self.sync_playback(PlaybackState::Paused).await;
        } else {
            self.engine.play().await?;
            self.sync_playback(PlaybackState::Playing).await;
        }
        Ok(())
    }

    async fn change_station(&mut self, station: StationId) -> Result<(), CoordinatorError> {
        if self.catalog.station(station).is_none() {
            return Err(CoordinatorError::UnknownStation(station));
        }
        let changed = station != self.selection.station;
        self.selection.station = station;
        if let Err(e) = self.prefs.save_station(station).await {
            warn!("coordinator: failed to persist station {}: {}", station, e);
        }
        if changed {
            self.arm_refresh();
        }

        let result = self.readdress().await;
        self.refresh_title().await;
        result.map_err(Into::into)
    }

    async fn change_quality(&mut self, quality: QualityId) -> Result<(), CoordinatorError> {
        if self.catalog.quality(quality).is_none() {
            return Err(CoordinatorError::UnknownQuality(quality));
        }
        self.selection.quality = quality;
        if let Err(e) = self.prefs.save_quality(quality).await {
            warn!("coordinator: failed to persist quality {}: {}", quality, e);
        }

        let result = self.readdress().await;
        self.refresh_title().await;
        result.map_err(Into::into)
    }

    async fn stop(&mut self) {
        if let Err(e) = self.engine.stop().await {
            debug!("coordinator: ignoring engine error on stop: {}", e);
        }
        self.load_state = LoadState::Empty;
        self.playback = PlaybackState::Stopped;
        self.title_generation += 1;
        self.set_title(DEFAULT_TITLE.to_string());

        if self.settings.reset_station_on_stop {
            let first = self.catalog.first_station();
            if first != self.selection.station {
                self.selection.station = first;
                if let Err(e) = self.prefs.save_station(first).await {
                    warn!("coordinator: failed to persist station {}: {}", first, e);
                }
                self.arm_refresh();
            }
        }
        info!("coordinator: stopped");
    }

    async fn dismiss_onboarding(&mut self, remember: bool) {
        self.onboarding_pending = false;
        if remember {
            if let Err(e) = self.prefs.set_onboarding(false).await {
                warn!("coordinator: failed to persist onboarding flag: {}", e);
            }
        }
    }

    // ── engine sequences ──────────────────────────────────────────────────────

    /// Reset the engine, queue the whole catalog and start the selection.
    async fn cold_start(&mut self) -> Result<(), EngineError> {
        let key = self.selection.track_key();
        info!("coordinator: loading playlist, starting {}", key);
        self.load_state = LoadState::Loading;
        self.playback = PlaybackState::Connecting;
        self.publish_state();

        match self.load_and_play(&key).await {
            Ok(()) => {
                self.load_state = LoadState::Loaded;
                self.sync_playback(PlaybackState::Playing).await;
                Ok(())
            }
            Err(e) => {
                warn!("coordinator: cold start of {} failed: {}", key, e);
                self.load_state = LoadState::Empty;
                self.playback = PlaybackState::Idle;
                Err(e)
            }
        }
    }

    async fn load_and_play(&self, key: &TrackKey) -> Result<(), EngineError> {
        self.engine.reset().await?;
        self.engine.add(self.catalog.playlist()).await?;
        self.engine.skip(key).await?;
        self.engine.play().await
    }

    /// Point the engine at the current selection, loading first if needed.
    async fn readdress(&mut self) -> Result<(), EngineError> {
        self.reconcile_load_state().await;
        if self.load_state == LoadState::Empty {
            return self.cold_start().await;
        }
        self.switch_to_selection().await
    }

    /// `skip → play` on a loaded engine.  A queue that no longer holds the
    /// key (the engine restarted) gets a cold start; any other failure leaves
    /// the engine stopped and `Empty`.
    async fn switch_to_selection(&mut self) -> Result<(), EngineError> {
        let key = self.selection.track_key();
        let result = match self.engine.skip(&key).await {
            Ok(()) => self.engine.play().await,
            Err(EngineError::UnknownTrack(_)) => {
                info!("coordinator: engine lost its queue, reloading for {}", key);
                self.load_state = LoadState::Empty;
                return self.cold_start().await;
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("coordinator: switching to {} failed: {}", key, e);
            if let Err(stop_err) = self.engine.stop().await {
                debug!("coordinator: stop after failed switch: {}", stop_err);
            }
            self.load_state = LoadState::Empty;
            self.playback = PlaybackState::Stopped;
            return Err(e);
        }
        info!("coordinator: switched to {}", key);
        self.sync_playback(PlaybackState::Playing).await;
        Ok(())
    }

    /// Bring a loaded engine that moved to another queue entry on its own
    /// back to the selected track.
    async fn follow_selection(&mut self) {
        if self.load_state != LoadState::Loaded {
            return;
        }
        let expected = self.selection.track_key();
        match self.engine.current_track().await {
            Ok(Some(current)) if current != expected => {
                warn!(
                    "coordinator: engine drifted to {}, returning to {}",
                    current, expected
                );
                if let Err(e) = self.switch_to_selection().await {
                    self.report(format!("Playback failed: {}", e));
                }
            }
            Ok(_) => {}
            Err(e) => debug!("coordinator: engine query failed: {}", e),
        }
    }

    /// A `Loaded` coordinator whose engine lost its track is really `Empty`.
    async fn reconcile_load_state(&mut self) {
        if self.load_state != LoadState::Loaded {
            return;
        }
        match self.engine.current_track().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("coordinator: engine has no current track, treating as empty");
                self.load_state = LoadState::Empty;
            }
            Err(e) => warn!("coordinator: engine query failed: {}", e),
        }
    }

    /// Take the engine's view of playback; `expected` covers a failed query.
    async fn sync_playback(&mut self, expected: PlaybackState) {
        self.playback = match self.engine.playback_state().await {
            Ok(state) => state,
            Err(e) => {
                debug!("coordinator: playback state query failed: {}", e);
                expected
            }
        };
    }

    /// Pick up changes the engine made on its own.  Returns whether anything
    /// visible changed.
    async fn poll_engine(&mut self) -> bool {
        let before = (self.load_state, self.playback);
        self.reconcile_load_state().await;
        self.follow_selection().await;
        if let Ok(state) = self.engine.playback_state().await {
            self.playback = state;
        }
        before != (self.load_state, self.playback)
    }

    // ── now playing ───────────────────────────────────────────────────────────

    fn arm_refresh(&mut self) {
        if let Some(old) = self.refresh.take() {
            debug!("coordinator: cancelling refresh for station {}", old.station());
        }
        self.refresh = Some(RefreshTimer::arm(
            self.selection.station,
            self.settings.refresh_interval,
            self.self_tx.clone(),
        ));
    }

    /// Show the placeholder if nothing is loaded, otherwise start a fetch
    /// for the current station.  Results come back as `TitleFetched`.
    async fn refresh_title(&mut self) {
        let station = self.selection.station;
        let loaded = match self.engine.current_track().await {
            Ok(track) => track.is_some(),
            Err(e) => {
                warn!("coordinator: cannot tell whether a track is loaded: {}", e);
                return;
            }
        };

        self.title_generation += 1;
        if !loaded {
            if self.set_title(DEFAULT_TITLE.to_string()) {
                self.publish_state();
            }
            return;
        }

        let Some(slug) = self.catalog.station(station).map(|s| s.slug.clone()) else {
            return;
        };
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let generation = self.title_generation;
        let titles = self.titles.clone();
        tokio::spawn(async move {
            let result = titles.fetch_title(&slug).await;
            let _ = tx
                .send(CoordinatorEvent::TitleFetched {
                    generation,
                    station,
                    result,
                })
                .await;
        });
    }

    fn apply_title(
        &mut self,
        generation: u64,
        station: StationId,
        result: Result<String, NowPlayingError>,
    ) {
        if generation != self.title_generation || station != self.selection.station {
            debug!("coordinator: discarding stale title for station {}", station);
            return;
        }
        match result {
            Ok(title) => {
                if self.set_title(title) {
                    self.publish_state();
                }
            }
            Err(e) => warn!("[now-playing] station {}: {}", station, e),
        }
    }

    fn set_title(&mut self, title: String) -> bool {
        if self.title == title {
            return false;
        }
        debug!("coordinator: title -> {}", title);
        self.title = title.clone();
        let _ = self.broadcast_tx.send(BroadcastMessage::TitleUpdated(title));
        true
    }

    // ── publishing ────────────────────────────────────────────────────────────

    fn snapshot(&self) -> PlayerState {
        PlayerState {
            rev: self.rev,
            stations: self.catalog.stations().to_vec(),
            qualities: self.catalog.qualities().to_vec(),
            selection: self.selection,
            title: self.title.clone(),
            load_state: self.load_state,
            playback: self.playback,
            capabilities: self.settings.engine_options.capabilities.clone(),
            onboarding_pending: self.onboarding_pending,
            onboarding_link: self.settings.onboarding_link.clone(),
            notice: self.notice.clone(),
        }
    }

    fn publish_state(&mut self) {
        self.rev += 1;
        let _ = self
            .broadcast_tx
            .send(BroadcastMessage::StateUpdated(Arc::new(self.snapshot())));
    }

    fn report(&mut self, message: String) {
        self.notice = Some(message.clone());
        let _ = self.broadcast_tx.send(BroadcastMessage::Notice(message));
    }

    async fn teardown(&mut self) {
        self.refresh = None;
        self.title_generation += 1;
        if self.settings.engine_options.stop_with_app {
            if let Err(e) = self.engine.stop().await {
                debug!("coordinator: engine stop on shutdown: {}", e);
            }
        }
        info!("coordinator: shut down");
    }
}
