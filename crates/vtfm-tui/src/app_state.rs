//! AppState: shared read-only data passed to all components during render/event.
//!
//! Components read this for daemon state, but never mutate it.
//! The App event-loop is the only thing that writes to AppState.

use std::collections::VecDeque;

use vtfm_proto::catalog::QualityId;
use vtfm_proto::protocol::PlayerState;

/// Daemon log lines kept for the log panel.
pub const MAX_LOG_LINES: usize = 200;

#[derive(Debug, Default)]
pub struct AppState {
    /// Latest snapshot from the daemon.  `None` until the first Hello.
    pub player: Option<PlayerState>,
    pub connected: bool,
    /// Local override of the onboarding prompt (dismissed before the daemon
    /// has confirmed).
    pub onboarding_hidden: bool,
    pub logs: VecDeque<String>,
}

impl AppState {
    pub fn push_log(&mut self, line: String) {
        self.logs.push_back(line);
        while self.logs.len() > MAX_LOG_LINES {
            self.logs.pop_front();
        }
    }

    pub fn apply_snapshot(&mut self, state: PlayerState) {
        if !state.onboarding_pending {
            self.onboarding_hidden = false;
        }
        self.player = Some(state);
    }

    pub fn set_title(&mut self, title: String) {
        if let Some(player) = self.player.as_mut() {
            player.title = title;
        }
    }

    pub fn show_onboarding(&self) -> bool {
        !self.onboarding_hidden && self.player.as_ref().is_some_and(|p| p.onboarding_pending)
    }

    /// The quality after the current one, wrapping around.
    pub fn next_quality(&self) -> Option<QualityId> {
        let player = self.player.as_ref()?;
        let qualities = &player.qualities;
        let pos = qualities
            .iter()
            .position(|q| q.id == player.selection.quality)
            .unwrap_or(0);
        qualities.get((pos + 1) % qualities.len().max(1)).map(|q| q.id)
    }

    /// The quality shown at `slot` (0-based) in the quality bar.
    pub fn quality_at(&self, slot: usize) -> Option<QualityId> {
        self.player.as_ref()?.qualities.get(slot).map(|q| q.id)
    }
}
