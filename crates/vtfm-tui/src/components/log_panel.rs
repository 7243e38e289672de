//! LogPanel component: daemon warnings and errors.
//!
//! Shows the most recent line when collapsed; `l` expands it to a panel
//! that scrolls with PageUp/PageDown.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Clear, Paragraph, Wrap},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{C_MUTED, C_SECONDARY},
    widgets::pane_chrome::pane_chrome,
};

pub struct LogPanel {
    pub expanded: bool,
    pub scroll: usize,
    /// Last log count, to auto-scroll on new entries
    last_log_count: usize,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            expanded: false,
            scroll: 0,
            last_log_count: 0,
        }
    }

    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
        if self.expanded {
            // Jump to bottom on open
            self.scroll = usize::MAX;
        }
    }

    /// Rows the panel wants in the layout.
    pub fn height(&self) -> u16 {
        if self.expanded {
            10
        } else {
            1
        }
    }
}

impl Component for LogPanel {
    fn id(&self) -> ComponentId {
        ComponentId::LogPanel
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release || !self.expanded {
            return vec![];
        }
        match key.code {
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(5),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_add(5),
            _ => {}
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        if let Action::ToggleLogs = action {
            self.toggle();
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        if area.height == 0 {
            return;
        }
        frame.render_widget(Clear, area);

        if !self.expanded || area.height <= 2 {
            let last = state
                .logs
                .back()
                .cloned()
                .unwrap_or_else(|| "(no log)".to_string());
            frame.render_widget(
                Paragraph::new(Line::from(vec![
                    Span::styled(" log ", Style::default().fg(C_MUTED)),
                    Span::styled(last, Style::default().fg(C_SECONDARY)),
                ])),
                area,
            );
            return;
        }

        let block = pane_chrome("log", Some("l"), focused, None);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let height = inner.height as usize;
        let log_count = state.logs.len();

        if log_count > self.last_log_count {
            let max_scroll = log_count.saturating_sub(height);
            if self.scroll >= max_scroll.saturating_sub(1) {
                self.scroll = usize::MAX;
            }
            self.last_log_count = log_count;
        }

        let max_scroll = log_count.saturating_sub(height);
        self.scroll = self.scroll.min(max_scroll);

        let lines: Vec<Line> = state
            .logs
            .iter()
            .skip(self.scroll)
            .take(height)
            .map(|msg| Line::from(Span::styled(format!(" {}", msg), Style::default().fg(C_MUTED))))
            .collect();

        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    }
}
