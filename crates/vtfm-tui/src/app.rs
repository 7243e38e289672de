//! App: component-based event loop.
//!
//! Architecture:
//! - `App` owns all components and `AppState` (shared read-only data for components).
//! - A `tokio::mpsc` channel carries `AppMessage` events in from background tasks
//!   (terminal input, daemon connection).
//! - Components return `Vec<Action>`; App dispatches each Action.
//! - Commands to the daemon flow out through a separate `cmd_tx` channel.

use std::io;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use vtfm_proto::protocol::{Broadcast, Command, PlayerState, PROTOCOL_VERSION};

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    components::{
        header::Header, log_panel::LogPanel, onboarding::Onboarding, quality_bar::QualityBar,
        station_list::StationList,
    },
    connection,
    theme::{style_muted, C_BG, C_ERROR, C_NUMBER_HINT},
    widgets::toast::ToastManager,
};

/// Everything that can wake the event loop.
#[derive(Debug)]
pub enum AppMessage {
    Event(Event),
    Connected,
    Disconnected,
    Daemon(Broadcast),
}

pub struct App {
    state: AppState,
    header: Header,
    station_list: StationList,
    quality_bar: QualityBar,
    log_panel: LogPanel,
    onboarding: Onboarding,
    toast: ToastManager,
    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: Option<mpsc::Receiver<Command>>,
    daemon_address: String,
    should_quit: bool,
}

/// Keys that work regardless of focus.  Returns `None` for keys the focused
/// component should see.
pub fn global_action(key: &KeyEvent, state: &AppState) -> Option<Action> {
    if key.kind == KeyEventKind::Release {
        return Some(Action::Noop);
    }
    if key.modifiers == KeyModifiers::CONTROL {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Quit),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Char('x') => Some(Action::Quit),
        KeyCode::Char(' ') => Some(Action::TogglePlayback),
        KeyCode::Char('s') => Some(Action::Stop),
        KeyCode::Char('q') => Some(Action::CycleQuality),
        KeyCode::Char('l') => Some(Action::ToggleLogs),
        KeyCode::Char(c @ '1'..='9') => {
            let slot = c as usize - '1' as usize;
            Some(
                state
                    .quality_at(slot)
                    .map(Action::ChangeQuality)
                    .unwrap_or(Action::Noop),
            )
        }
        _ => None,
    }
}

impl App {
    pub fn new(daemon_address: String) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(64);
        Self {
            state: AppState::default(),
            header: Header::new(),
            station_list: StationList::new(),
            quality_bar: QualityBar::new(),
            log_panel: LogPanel::new(),
            onboarding: Onboarding::new(),
            toast: ToastManager::new(),
            cmd_tx,
            cmd_rx: Some(cmd_rx),
            daemon_address,
            should_quit: false,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let (tx, mut rx) = mpsc::channel::<AppMessage>(1024);

        // ── Background task: keyboard events ──────────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Background task: daemon connection ────────────────────────────────
        if let Some(cmd_rx) = self.cmd_rx.take() {
            tokio::spawn(connection::run(
                self.daemon_address.clone(),
                connection::RECONNECT_DELAY,
                cmd_rx,
                tx.clone(),
            ));
        }

        // Marquee, toast expiry, list sync
        let mut ui_tick = tokio::time::interval(Duration::from_millis(100));
        ui_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let result = loop {
            if let Err(e) = terminal.draw(|f| self.draw(f)) {
                break Err(e.into());
            }
            if self.should_quit {
                break Ok(());
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    self.handle_message(msg);
                    // Drain whatever queued up behind it before redrawing
                    while let Ok(next) = rx.try_recv() {
                        self.handle_message(next);
                    }
                }

                _ = ui_tick.tick() => {
                    self.toast.tick();
                    let actions: Vec<Action> = {
                        let s = &self.state;
                        let mut all = Vec::new();
                        all.extend(self.header.tick(s));
                        all.extend(self.station_list.tick(s));
                        all
                    };
                    for action in actions {
                        self.dispatch(action);
                    }
                }
            }
        };

        // ── Teardown ──────────────────────────────────────────────────────────
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    // ── Messages ──────────────────────────────────────────────────────────────

    fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Event(Event::Key(key)) => {
                for action in self.handle_key(key) {
                    self.dispatch(action);
                }
            }
            AppMessage::Event(_) => {}
            AppMessage::Connected => {
                self.state.connected = true;
                self.toast.info("Connected to daemon");
            }
            AppMessage::Disconnected => {
                self.state.connected = false;
                self.toast.warning("Daemon disconnected, retrying");
            }
            AppMessage::Daemon(broadcast) => self.handle_broadcast(broadcast),
        }
    }

    fn handle_broadcast(&mut self, broadcast: Broadcast) {
        match broadcast {
            Broadcast::Hello {
                protocol_version,
                state,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    warn!(
                        "Daemon speaks protocol {}, expected {}",
                        protocol_version, PROTOCOL_VERSION
                    );
                    self.toast.warning(format!(
                        "Daemon protocol {} differs from ours ({})",
                        protocol_version, PROTOCOL_VERSION
                    ));
                }
                info!("Hello from daemon, rev {}", state.rev);
                self.apply_state(state);
            }
            Broadcast::State { data } => self.apply_state(data),
            Broadcast::Title { title } => {
                debug!("Title: {}", title);
                self.state.set_title(title);
            }
            Broadcast::Notice { message } => self.toast.warning(message),
            Broadcast::Log { message } => self.state.push_log(message),
        }
    }

    fn apply_state(&mut self, state: PlayerState) {
        let previous = self.state.player.as_ref().and_then(|p| p.notice.clone());
        if let Some(notice) = state.notice.as_ref() {
            if previous.as_ref() != Some(notice) {
                self.toast.error(notice.clone());
            }
        }
        self.state.apply_snapshot(state);
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        // Prompt gets first look while it is up
        if self.state.show_onboarding() {
            let actions = self.onboarding.handle_key(key, &self.state);
            if !actions.is_empty() {
                return actions;
            }
        }

        if let Some(action) = global_action(&key, &self.state) {
            return vec![action];
        }

        let mut actions = self.station_list.handle_key(key, &self.state);
        actions.extend(self.log_panel.handle_key(key, &self.state));
        actions
    }

    fn dispatch(&mut self, action: Action) {
        match action {
            Action::Noop => {}
            Action::Quit => {
                info!("Quit requested");
                self.should_quit = true;
            }
            Action::CycleQuality => {
                if let Some(quality) = self.state.next_quality() {
                    self.dispatch(Action::ChangeQuality(quality));
                }
            }
            Action::DismissOnboarding { remember } => {
                self.state.onboarding_hidden = true;
                self.send(Command::DismissOnboarding { remember });
            }
            Action::SelectUp(_)
            | Action::SelectDown(_)
            | Action::SelectFirst
            | Action::SelectLast => {
                let follow_up = self.station_list.on_action(&action, &self.state);
                for a in follow_up {
                    self.dispatch(a);
                }
            }
            Action::ToggleLogs => {
                self.log_panel.on_action(&action, &self.state);
            }
            other => {
                if let Some(cmd) = other.to_command() {
                    self.send(cmd);
                }
            }
        }
    }

    fn send(&mut self, cmd: Command) {
        if !self.state.connected {
            self.toast.warning("Not connected to daemon");
            return;
        }
        if let Err(e) = self.cmd_tx.try_send(cmd) {
            warn!("Command dropped: {}", e);
        }
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let area = frame.area();
        frame.render_widget(Block::default().style(Style::default().bg(C_BG)), area);

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(self.log_panel.height()),
                Constraint::Length(1),
            ])
            .split(area);

        self.header.draw(frame, outer[0], false, &self.state);
        self.station_list.draw(frame, outer[1], true, &self.state);
        self.quality_bar.draw(frame, outer[2], false, &self.state);
        self.log_panel
            .draw(frame, outer[3], self.log_panel.expanded, &self.state);
        self.draw_status(frame, outer[4]);

        if self.state.show_onboarding() {
            self.onboarding.draw(frame, area, true, &self.state);
        }
        self.toast.draw(frame, area);
    }

    fn draw_status(&self, frame: &mut ratatui::Frame, area: Rect) {
        let notice = self.state.player.as_ref().and_then(|p| p.notice.as_deref());
        let line = match notice {
            Some(notice) => Line::from(Span::styled(
                format!(" ! {}", notice),
                Style::default().fg(C_ERROR),
            )),
            None => {
                let hints = [
                    ("space", "play/pause"),
                    ("s", "stop"),
                    ("enter", "station"),
                    ("q", "quality"),
                    ("l", "log"),
                    ("x", "quit"),
                ];
                let mut spans = Vec::new();
                for (key, label) in hints {
                    spans.push(Span::styled(
                        format!(" {} ", key),
                        Style::default().fg(C_NUMBER_HINT),
                    ));
                    spans.push(Span::styled(format!("{} ", label), style_muted()));
                }
                Line::from(spans)
            }
        };
        frame.render_widget(Paragraph::new(line), area);
    }
}
