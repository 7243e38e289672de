//! The audio playback seam.
//!
//! The coordinator only talks to the engine through [`PlaybackEngine`]; the
//! mpv-backed implementation lives in `mpv.rs`.  Every call may suspend and
//! every call may fail.

use async_trait::async_trait;
use thiserror::Error;
use vtfm_proto::catalog::{Track, TrackKey};
use vtfm_proto::protocol::{Capability, PlaybackState};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is not set up")]
    NotReady,
    #[error("track {0} is not queued")]
    UnknownTrack(TrackKey),
    #[error("engine process unavailable: {0}")]
    Process(String),
    #[error("engine command failed: {0}")]
    Command(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Command(e.to_string())
    }
}

/// Options pushed to the engine once after setup.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Stop audio when the daemon exits.
    pub stop_with_app: bool,
    /// Controls advertised to remote surfaces.
    pub capabilities: Vec<Capability>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            stop_with_app: true,
            capabilities: vec![Capability::Play, Capability::Pause, Capability::Stop],
        }
    }
}

#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    async fn setup(&self) -> Result<(), EngineError>;
    async fn update_options(&self, options: EngineOptions) -> Result<(), EngineError>;
    /// Drop the queue and stop.
    async fn reset(&self) -> Result<(), EngineError>;
    /// Append tracks to the queue in order.
    async fn add(&self, tracks: &[Track]) -> Result<(), EngineError>;
    /// Make the queued track with `key` current.
    async fn skip(&self, key: &TrackKey) -> Result<(), EngineError>;
    async fn play(&self) -> Result<(), EngineError>;
    async fn pause(&self) -> Result<(), EngineError>;
    /// Stop playback.  The queue does not survive a stop.
    async fn stop(&self) -> Result<(), EngineError>;
    async fn current_track(&self) -> Result<Option<TrackKey>, EngineError>;
    async fn playback_state(&self) -> Result<PlaybackState, EngineError>;
}
