//! StationList component: station picker with its own cursor.
//!
//! The cursor is view state; the daemon's selection only changes when the
//! user presses enter.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{List, ListItem, ListState},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{style_accent, style_default, style_selected_focused, C_NUMBER_HINT, C_PLAYING},
    widgets::pane_chrome::pane_chrome,
};

pub struct StationList {
    cursor: usize,
    /// Cursor follows the daemon selection until the user moves it.
    synced: bool,
    list_state: ListState,
}

impl StationList {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            synced: false,
            list_state: ListState::default(),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn len(state: &AppState) -> usize {
        state.player.as_ref().map(|p| p.stations.len()).unwrap_or(0)
    }

    fn sync_to_selection(&mut self, state: &AppState) {
        if self.synced {
            return;
        }
        if let Some(player) = state.player.as_ref() {
            if let Some(pos) = player
                .stations
                .iter()
                .position(|s| s.id == player.selection.station)
            {
                self.cursor = pos;
                self.synced = true;
            }
        }
    }

    fn move_by(&mut self, delta: isize, state: &AppState) {
        let len = Self::len(state);
        if len == 0 {
            return;
        }
        self.synced = true;
        let pos = self.cursor as isize + delta;
        self.cursor = pos.clamp(0, len as isize - 1) as usize;
    }
}

impl Component for StationList {
    fn id(&self) -> ComponentId {
        ComponentId::StationList
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => vec![Action::SelectUp(1)],
            KeyCode::Down | KeyCode::Char('j') => vec![Action::SelectDown(1)],
            KeyCode::Home | KeyCode::Char('g') => vec![Action::SelectFirst],
            KeyCode::End | KeyCode::Char('G') => vec![Action::SelectLast],
            KeyCode::Enter => state
                .player
                .as_ref()
                .and_then(|p| p.stations.get(self.cursor))
                .map(|s| vec![Action::ChangeStation(s.id)])
                .unwrap_or_default(),
            _ => vec![],
        }
    }

    fn tick(&mut self, state: &AppState) -> Vec<Action> {
        self.sync_to_selection(state);
        vec![]
    }

    fn on_action(&mut self, action: &Action, state: &AppState) -> Vec<Action> {
        match action {
            Action::SelectUp(n) => self.move_by(-(*n as isize), state),
            Action::SelectDown(n) => self.move_by(*n as isize, state),
            Action::SelectFirst => self.move_by(isize::MIN / 2, state),
            Action::SelectLast => self.move_by(isize::MAX / 2, state),
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        self.sync_to_selection(state);
        let block = pane_chrome("stations", Some("\u{2191}\u{2193} enter"), focused, None);

        let Some(player) = state.player.as_ref() else {
            frame.render_widget(block, area);
            return;
        };

        let items: Vec<ListItem> = player
            .stations
            .iter()
            .enumerate()
            .map(|(i, station)| {
                let current = station.id == player.selection.station;
                let marker = if current && player.playback.is_active() {
                    Span::styled(" \u{25b6} ", Style::default().fg(C_PLAYING))
                } else if current {
                    Span::styled(" \u{2022} ", style_accent())
                } else {
                    Span::raw("   ")
                };
                let name_style = if current { style_accent() } else { style_default() };
                ListItem::new(Line::from(vec![
                    marker,
                    Span::styled(format!("{:>3} ", i + 1), Style::default().fg(C_NUMBER_HINT)),
                    Span::styled(station.title.clone(), name_style),
                ]))
            })
            .collect();

        self.list_state.select(Some(self.cursor));
        let list = List::new(items)
            .block(block)
            .highlight_style(style_selected_focused());
        frame.render_stateful_widget(list, area, &mut self.list_state);
    }
}
