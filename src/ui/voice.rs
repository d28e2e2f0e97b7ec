//! Terminal screen shared by the profile player and the voice setup flow.
//!
//! The screen only draws what it is given and turns key presses into
//! [`ScreenCommand`]s. Controllers stay in the command handlers.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};
use std::io::{self, Stdout};
use std::time::Duration;

use super::error::draw_notice;
use crate::voice::{PlaybackState, PlaybackView};

const ACCENT: Color = Color::Rgb(108, 92, 231);
const MUTED: Color = Color::Rgb(185, 207, 212);

/// Seconds moved by the skip keys.
pub const SKIP_SECONDS: f64 = 5.0;

/// User input on a voice screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenCommand {
    /// No key, or a key with no binding
    Continue,
    Record,
    Stop,
    TogglePlay,
    SkipBack,
    SkipForward,
    Rewind,
    Rerecord,
    Save,
    Recalibrate,
    Delete,
    Quit,
}

/// Maps a key press to its command. Bindings a screen does not offer are ignored by it.
pub fn command_for(key: KeyEvent) -> ScreenCommand {
    if key.kind == KeyEventKind::Release {
        return ScreenCommand::Continue;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => ScreenCommand::Quit,
        KeyCode::Char('q') | KeyCode::Esc => ScreenCommand::Quit,
        KeyCode::Char('r') => ScreenCommand::Record,
        KeyCode::Char('s') => ScreenCommand::Stop,
        KeyCode::Char(' ') => ScreenCommand::TogglePlay,
        KeyCode::Left => ScreenCommand::SkipBack,
        KeyCode::Right => ScreenCommand::SkipForward,
        KeyCode::Char('0') => ScreenCommand::Rewind,
        KeyCode::Char('x') => ScreenCommand::Rerecord,
        KeyCode::Enter => ScreenCommand::Save,
        KeyCode::Char('v') => ScreenCommand::Recalibrate,
        KeyCode::Char('d') => ScreenCommand::Delete,
        _ => ScreenCommand::Continue,
    }
}

/// Everything one frame shows.
#[derive(Debug, Clone)]
pub struct ScreenModel {
    pub title: String,
    /// Label/value rows, or free text when the label is empty.
    pub details: Vec<(String, String)>,
    pub status: String,
    pub recording: bool,
    /// `None` hides the player.
    pub playback: Option<PlaybackView>,
    pub busy: Option<String>,
    pub message: Option<String>,
    pub hints: &'static str,
}

impl ScreenModel {
    pub fn new(title: impl Into<String>, hints: &'static str) -> Self {
        Self {
            title: title.into(),
            details: Vec::new(),
            status: String::new(),
            recording: false,
            playback: None,
            busy: None,
            message: None,
            hints,
        }
    }
}

pub struct VoiceScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl VoiceScreen {
    /// Enters raw mode and the alternate screen.
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(VoiceScreen { terminal })
    }

    pub fn render(&mut self, model: &ScreenModel) -> anyhow::Result<()> {
        self.terminal.draw(|frame| draw(frame, model))?;
        Ok(())
    }

    /// Waits up to 50ms for a key.
    pub fn handle_input(&mut self) -> anyhow::Result<ScreenCommand> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                let command = command_for(key);
                if command != ScreenCommand::Continue {
                    tracing::debug!("Key {:?}: {:?}", key.code, command);
                }
                return Ok(command);
            }
        }
        Ok(ScreenCommand::Continue)
    }

    /// Shows `message` full screen until a key is pressed.
    pub fn show_notice(&mut self, message: &str) -> anyhow::Result<()> {
        // Drop keys typed before the notice appeared.
        while event::poll(Duration::ZERO)? {
            event::read()?;
        }
        loop {
            self.terminal.draw(|frame| draw_notice(frame, message))?;
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Release {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Leaves the alternate screen and restores the cursor.
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for VoiceScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

fn draw(frame: &mut Frame, model: &ScreenModel) {
    let player_height = if model.playback.is_some() { 3 } else { 0 };
    let [title_area, body_area, player_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Min(3),
        Constraint::Length(player_height),
        Constraint::Length(2),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(" ● ", Style::default().fg(ACCENT)),
            Span::styled(model.title.as_str(), Style::default().bold()),
        ])),
        title_area,
    );

    let lines: Vec<Line> = model
        .details
        .iter()
        .map(|(label, value)| {
            if label.is_empty() {
                Line::from(Span::styled(value.as_str(), Style::default().italic()))
            } else {
                Line::from(vec![
                    Span::styled(format!("{label:>10}  "), Style::default().fg(MUTED)),
                    Span::raw(value.as_str()),
                ])
            }
        })
        .collect();
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::TOP | Borders::BOTTOM)),
        body_area,
    );

    if let Some(view) = &model.playback {
        frame.render_widget(player_gauge(view), player_area);
    }

    let mut status = vec![if model.recording {
        Span::styled("● ", Style::default().fg(Color::Red))
    } else {
        Span::raw("  ")
    }];
    status.push(Span::raw(model.status.as_str()));
    if let Some(busy) = &model.busy {
        status.push(Span::styled(
            format!("  {busy}"),
            Style::default().fg(Color::Yellow),
        ));
    }
    let mut status_lines = vec![Line::from(status)];
    if let Some(message) = &model.message {
        status_lines.push(Line::from(Span::styled(
            format!("  {message}"),
            Style::default().fg(ACCENT),
        )));
    }
    frame.render_widget(Paragraph::new(status_lines), status_area);

    frame.render_widget(
        Paragraph::new(model.hints).style(Style::default().fg(MUTED).bg(Color::Rgb(0, 0, 0))),
        footer_area,
    );
}

fn player_gauge(view: &PlaybackView) -> Gauge<'static> {
    let icon = match view.state {
        PlaybackState::Loading => "…",
        PlaybackState::Error => "✕",
        _ if view.is_playing => "⏸",
        _ => "▶",
    };
    Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(ACCENT).bg(Color::Rgb(224, 224, 224)))
        .ratio(view.progress().clamp(0.0, 1.0))
        .label(format!("{icon} {} / {}", view.elapsed(), view.total()))
}
