//! Action enum: all user-initiated intents and internal events.

use vtfm_proto::catalog::{QualityId, StationId};
use vtfm_proto::protocol::Command;

/// Unique identifier for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    Header,
    StationList,
    QualityBar,
    LogPanel,
    Onboarding,
}

/// All actions that can flow through the system.
/// Components produce Actions; the App dispatches them.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Playback ─────────────────────────────────────────────────────────────
    TogglePlayback,
    Stop,
    ChangeStation(StationId),
    ChangeQuality(QualityId),
    CycleQuality,

    // ── Navigation ───────────────────────────────────────────────────────────
    SelectUp(usize),
    SelectDown(usize),
    SelectFirst,
    SelectLast,

    // ── Onboarding ───────────────────────────────────────────────────────────
    DismissOnboarding { remember: bool },

    // ── UI toggles ───────────────────────────────────────────────────────────
    ToggleLogs,

    // ── System ───────────────────────────────────────────────────────────────
    Quit,
    Noop,
}

impl Action {
    /// The daemon command this action maps to, if any.
    pub fn to_command(&self) -> Option<Command> {
        match self {
            Action::TogglePlayback => Some(Command::TogglePlayback),
            Action::Stop => Some(Command::Stop),
            Action::ChangeStation(station) => Some(Command::ChangeStation { station: *station }),
            Action::ChangeQuality(quality) => Some(Command::ChangeQuality { quality: *quality }),
            Action::DismissOnboarding { remember } => Some(Command::DismissOnboarding {
                remember: *remember,
            }),
            _ => None,
        }
    }
}
