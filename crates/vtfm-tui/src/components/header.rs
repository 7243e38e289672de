//! Header component: station, play state and the scrolling track title.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use unicode_width::UnicodeWidthStr;
use vtfm_proto::protocol::{LoadState, PlaybackState};

use crate::{
    action::ComponentId,
    app_state::AppState,
    component::Component,
    theme::{C_ACCENT, C_CONNECTING, C_ERROR, C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY},
    widgets::marquee,
    widgets::pane_chrome::{pane_chrome, Badge},
};

/// Ticks between marquee steps (ui tick is 100ms).
const SCROLL_EVERY: u32 = 3;

pub struct Header {
    offset: usize,
    ticks: u32,
    last_title: String,
}

impl Header {
    pub fn new() -> Self {
        Self {
            offset: 0,
            ticks: 0,
            last_title: String::new(),
        }
    }
}

/// Badge text and color for the current daemon state.
pub fn status_badge(state: &AppState) -> Badge<'static> {
    let Some(player) = state.player.as_ref().filter(|_| state.connected) else {
        return Badge {
            text: "OFFLINE",
            color: C_ERROR,
        };
    };
    if player.load_state == LoadState::Loading {
        return Badge {
            text: "LOADING",
            color: C_CONNECTING,
        };
    }
    let (text, color) = match player.playback {
        PlaybackState::Playing => ("PLAYING", C_PLAYING),
        PlaybackState::Connecting => ("CONNECTING", C_CONNECTING),
        PlaybackState::Buffering => ("BUFFERING", C_CONNECTING),
        PlaybackState::Paused => ("PAUSED", C_SECONDARY),
        PlaybackState::Stopped => ("STOPPED", C_MUTED),
        PlaybackState::Idle => ("IDLE", C_MUTED),
    };
    Badge { text, color }
}

impl Component for Header {
    fn id(&self) -> ComponentId {
        ComponentId::Header
    }

    fn tick(&mut self, state: &AppState) -> Vec<crate::action::Action> {
        let title = state.player.as_ref().map(|p| p.title.as_str()).unwrap_or("");
        if title != self.last_title {
            self.last_title = title.to_string();
            self.offset = 0;
            self.ticks = 0;
            return Vec::new();
        }
        self.ticks += 1;
        if self.ticks >= SCROLL_EVERY {
            self.ticks = 0;
            self.offset = self.offset.wrapping_add(1);
        }
        Vec::new()
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let block = pane_chrome("vtfm", None, focused, Some(status_badge(state)));
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let Some(player) = state.player.as_ref() else {
            frame.render_widget(
                Paragraph::new(Span::styled(
                    " waiting for daemon...",
                    Style::default().fg(C_MUTED),
                )),
                inner,
            );
            return;
        };

        let station = player
            .current_station()
            .map(|s| s.title.as_str())
            .unwrap_or("?");
        let prefix = format!(" {}  ", station);
        let room = (inner.width as usize).saturating_sub(prefix.width() + 1);

        // Scroll only when the title does not fit
        let title = if player.title.width() <= room {
            player.title.clone()
        } else {
            marquee::window(&player.title, room, self.offset)
        };

        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(
                    prefix,
                    Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD),
                ),
                Span::styled(title, Style::default().fg(C_PRIMARY)),
            ])),
            inner,
        );
    }
}
