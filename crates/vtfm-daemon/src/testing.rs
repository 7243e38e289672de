//! Test doubles for the engine and the now-playing source.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use vtfm_proto::catalog::{Track, TrackKey};
use vtfm_proto::now_playing::{NowPlayingError, TitleSource};
use vtfm_proto::protocol::PlaybackState;
use vtfm_proto::store::{KeyValueStore, MemoryStore, KEY_CURRENT_QUALITY, KEY_CURRENT_STATION};

use crate::engine::{EngineError, EngineOptions, PlaybackEngine};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Reset,
    Add(Vec<String>),
    Skip(String),
    Play,
    Pause,
    Stop,
}

#[derive(Default)]
pub struct FakeState {
    pub calls: Vec<Call>,
    pub queue: Vec<TrackKey>,
    pub current: Option<TrackKey>,
    pub playback: PlaybackState,
    pub setups: usize,
    pub options: Option<EngineOptions>,
    pub fail_reset: bool,
    pub fail_skip: bool,
    pub fail_stop: bool,
    /// Persisted (station, quality) as seen by each `skip`, when a store is watched.
    pub persisted_at_skip: Vec<(Option<String>, Option<String>)>,
}

/// Records every mutating call and models a queue-based player.  Each
/// command yields once so callers observe a real suspension point.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
    watched: OnceLock<Arc<MemoryStore>>,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    /// How often `setup` ran and the options last pushed.
    pub fn setup_record(&self) -> (usize, Option<EngineOptions>) {
        let s = self.state.lock().unwrap();
        (s.setups, s.options.clone())
    }

    /// Read the persisted selection from `store` on every `skip`.
    pub fn watch_store(&self, store: Arc<MemoryStore>) {
        let _ = self.watched.set(store);
    }

    pub fn persisted_at_skip(&self) -> Vec<(Option<String>, Option<String>)> {
        self.state.lock().unwrap().persisted_at_skip.clone()
    }

    /// Simulate the engine moving to another queue entry by itself.
    pub fn drift_to(&self, key: TrackKey) {
        self.update(|s| s.current = Some(key));
    }

    /// Simulate the engine dropping its queue on its own.
    pub fn lose_track(&self) {
        self.update(|s| {
            s.queue.clear();
            s.current = None;
            s.playback = PlaybackState::Idle;
        });
    }
}

fn injected() -> EngineError {
    EngineError::Command("injected failure".into())
}

#[async_trait]
impl PlaybackEngine for FakeEngine {
    async fn setup(&self) -> Result<(), EngineError> {
        self.update(|s| s.setups += 1);
        Ok(())
    }

    async fn update_options(&self, options: EngineOptions) -> Result<(), EngineError> {
        self.update(|s| s.options = Some(options));
        Ok(())
    }

    async fn reset(&self) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Reset);
        if s.fail_reset {
            return Err(injected());
        }
        s.queue.clear();
        s.current = None;
        s.playback = PlaybackState::Idle;
        Ok(())
    }

    async fn add(&self, tracks: &[Track]) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        let mut s = self.state.lock().unwrap();
        s.calls
            .push(Call::Add(tracks.iter().map(|t| t.key.to_string()).collect()));
        s.queue.extend(tracks.iter().map(|t| t.key.clone()));
        Ok(())
    }

    async fn skip(&self, key: &TrackKey) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        let persisted = match self.watched.get() {
            Some(store) => Some((
                store.get(KEY_CURRENT_STATION).await.ok().flatten(),
                store.get(KEY_CURRENT_QUALITY).await.ok().flatten(),
            )),
            None => None,
        };
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Skip(key.to_string()));
        if let Some(persisted) = persisted {
            s.persisted_at_skip.push(persisted);
        }
        if s.fail_skip {
            return Err(injected());
        }
        if !s.queue.contains(key) {
            return Err(EngineError::UnknownTrack(key.clone()));
        }
        s.current = Some(key.clone());
        s.playback = PlaybackState::Connecting;
        Ok(())
    }

    async fn play(&self) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Play);
        if s.current.is_none() {
            return Err(EngineError::NotReady);
        }
        s.playback = PlaybackState::Playing;
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Pause);
        s.playback = PlaybackState::Paused;
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Stop);
        s.queue.clear();
        s.current = None;
        s.playback = PlaybackState::Stopped;
        if s.fail_stop {
            return Err(injected());
        }
        Ok(())
    }

    async fn current_track(&self) -> Result<Option<TrackKey>, EngineError> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    async fn playback_state(&self) -> Result<PlaybackState, EngineError> {
        Ok(self.state.lock().unwrap().playback)
    }
}

#[derive(Clone)]
pub struct ScriptedReply {
    title: Option<String>,
    delay: Duration,
}

/// Answers per slug; slugs without a scripted title fail.
#[derive(Default)]
pub struct ScriptedTitles {
    replies: Mutex<HashMap<String, ScriptedReply>>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedTitles {
    pub fn answer(&self, slug: &str, title: Option<&str>) {
        self.answer_after(slug, title, Duration::ZERO);
    }

    pub fn answer_after(&self, slug: &str, title: Option<&str>, delay: Duration) {
        self.replies.lock().unwrap().insert(
            slug.to_string(),
            ScriptedReply {
                title: title.map(str::to_string),
                delay,
            },
        );
    }

    pub fn take_requested(&self) -> Vec<String> {
        std::mem::take(&mut *self.requested.lock().unwrap())
    }
}

#[async_trait]
impl TitleSource for ScriptedTitles {
    async fn fetch_title(&self, slug: &str) -> Result<String, NowPlayingError> {
        self.requested.lock().unwrap().push(slug.to_string());
        let reply = self.replies.lock().unwrap().get(slug).cloned();
        let Some(reply) = reply else {
            return Err(NowPlayingError::Empty);
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.title.ok_or(NowPlayingError::MissingTitle)
    }
}

