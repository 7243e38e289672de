//! QualityBar component: one line of stream qualities, current one highlighted.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::{
    action::ComponentId,
    app_state::AppState,
    component::Component,
    theme::{style_muted, C_ACCENT, C_NUMBER_HINT, C_SECONDARY},
};

pub struct QualityBar;

impl QualityBar {
    pub fn new() -> Self {
        Self
    }
}

impl Component for QualityBar {
    fn id(&self) -> ComponentId {
        ComponentId::QualityBar
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, state: &AppState) {
        let Some(player) = state.player.as_ref() else {
            return;
        };

        let mut spans = vec![Span::styled(" quality ", style_muted())];
        for (slot, quality) in player.qualities.iter().enumerate() {
            // Only the first nine get a number key
            if slot < 9 {
                spans.push(Span::styled(
                    format!("{} ", slot + 1),
                    Style::default().fg(C_NUMBER_HINT),
                ));
            }
            let label = format!("{} {}k", quality.title, quality.bitrate);
            if quality.id == player.selection.quality {
                spans.push(Span::styled(
                    format!("[{}]", label),
                    Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD),
                ));
            } else {
                spans.push(Span::styled(
                    format!(" {} ", label),
                    Style::default().fg(C_SECONDARY),
                ));
            }
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled("q cycles", style_muted()));

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}
