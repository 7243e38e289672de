//! Onboarding prompt: a centered modal pointing first-time listeners at
//! the station website.  `esc` hides it for this session, `y` for good.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph, Wrap},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{style_muted, C_ACCENT, C_PRIMARY},
    widgets::pane_chrome::pane_chrome,
};

pub struct Onboarding;

impl Onboarding {
    pub fn new() -> Self {
        Self
    }

    pub fn popup_area(area: Rect) -> Rect {
        let width = area.width.min(60);
        let height = area.height.min(8);
        Rect {
            x: area.x + (area.width - width) / 2,
            y: area.y + (area.height - height) / 2,
            width,
            height,
        }
    }
}

impl Component for Onboarding {
    fn id(&self) -> ComponentId {
        ComponentId::Onboarding
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release || !state.show_onboarding() {
            return vec![];
        }
        match key.code {
            KeyCode::Esc => vec![Action::DismissOnboarding { remember: false }],
            KeyCode::Char('y') => vec![Action::DismissOnboarding { remember: true }],
            _ => vec![],
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, state: &AppState) {
        let Some(player) = state.player.as_ref() else {
            return;
        };
        let popup = Self::popup_area(area);
        frame.render_widget(Clear, popup);

        let block = pane_chrome("welcome", None, true, None);
        let lines = vec![
            Line::from(Span::styled(
                "Enjoying the music? Support the station:",
                Style::default().fg(C_PRIMARY),
            )),
            Line::from(""),
            Line::from(Span::styled(
                player.onboarding_link.clone(),
                Style::default().fg(C_ACCENT).add_modifier(Modifier::UNDERLINED),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "esc  later     y  don't show again",
                style_muted(),
            )),
        ];
        frame.render_widget(
            Paragraph::new(lines)
                .block(block)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            popup,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;
    use vtfm_proto::catalog::Catalog;
    use vtfm_proto::protocol::{LoadState, PlaybackState, PlayerState};

    fn pending_state(pending: bool) -> AppState {
        let catalog = Catalog::builtin();
        let mut state = AppState::default();
        state.apply_snapshot(PlayerState {
            rev: 1,
            stations: catalog.stations().to_vec(),
            qualities: catalog.qualities().to_vec(),
            selection: catalog.default_selection(),
            title: String::new(),
            load_state: LoadState::Empty,
            playback: PlaybackState::Idle,
            capabilities: Vec::new(),
            onboarding_pending: pending,
            onboarding_link: "https://example.test/join".into(),
            notice: None,
        });
        state
    }

    fn press(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    #[test]
    fn test_keys_dismiss_while_pending() {
        let state = pending_state(true);
        let mut prompt = Onboarding::new();
        assert_eq!(
            prompt.handle_key(press('y'), &state),
            vec![Action::DismissOnboarding { remember: true }]
        );
        assert_eq!(
            prompt.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE), &state),
            vec![Action::DismissOnboarding { remember: false }]
        );
    }

    #[test]
    fn test_keys_ignored_when_not_shown() {
        let state = pending_state(false);
        let mut prompt = Onboarding::new();
        assert!(prompt.handle_key(press('y'), &state).is_empty());
    }
}
