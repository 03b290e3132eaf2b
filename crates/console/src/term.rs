//! Terminal front end: the simulator stand-in for the LCD HAT. Maps the
//! core's display-list frames onto a ratatui paragraph and keyboard input
//! onto the panel's button vocabulary.
//!
//! Keys: arrows = joystick, Enter = press, 1/2/3 = side keys,
//! q / Ctrl-C = quit.

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line as UiLine, Span as UiSpan, Text};
use ratatui::widgets::Paragraph;
use ratatui::Terminal;

use opsdeck_core::{Frame, Tone};

use crate::display::{Button, DisplaySink, InputEvent};

pub struct TermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    backlight: bool,
}

impl TermDisplay {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self {
            terminal,
            backlight: true,
        })
    }

    pub fn restore(&mut self) -> Result<()> {
        disable_raw_mode()?;
        self.terminal.backend_mut().execute(LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    /// Poll the keyboard for up to `timeout`; `None` when nothing
    /// actionable arrived.
    pub fn poll_event(&mut self, timeout: Duration) -> Result<Option<InputEvent>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    return Ok(Some(InputEvent::Quit));
                }
                Ok(map_key(key.code))
            }
            _ => Ok(None),
        }
    }
}

impl DisplaySink for TermDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let text = if self.backlight {
            frame_to_text(frame)
        } else {
            Text::default()
        };
        let footer = frame
            .footer
            .as_ref()
            .filter(|_| self.backlight)
            .map(line_to_ui)
            .unwrap_or_default();
        self.terminal.draw(|ui| {
            let [body, hint] =
                Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(ui.area());
            ui.render_widget(Paragraph::new(text), body);
            ui.render_widget(Paragraph::new(footer), hint);
        })?;
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> Result<()> {
        self.backlight = on;
        Ok(())
    }
}

fn map_key(code: KeyCode) -> Option<InputEvent> {
    let button = match code {
        KeyCode::Up => Button::Up,
        KeyCode::Down => Button::Down,
        KeyCode::Left => Button::Left,
        KeyCode::Right => Button::Right,
        KeyCode::Enter => Button::Press,
        KeyCode::Char('1') => Button::Key1,
        KeyCode::Char('2') => Button::Key2,
        KeyCode::Char('3') => Button::Key3,
        KeyCode::Char('q') => return Some(InputEvent::Quit),
        _ => return None,
    };
    Some(InputEvent::Button(button))
}

fn frame_to_text(frame: &Frame) -> Text<'static> {
    Text::from(frame.lines.iter().map(line_to_ui).collect::<Vec<_>>())
}

fn line_to_ui(line: &opsdeck_core::canvas::Line) -> UiLine<'static> {
    let spans = line
        .spans
        .iter()
        .map(|span| UiSpan::styled(span.text.clone(), tone_style(span.tone)))
        .collect::<Vec<_>>();
    let ui = UiLine::from(spans);
    if line.selected {
        ui.style(Style::default().bg(Color::Rgb(40, 60, 100)))
    } else {
        ui
    }
}

fn tone_style(tone: Tone) -> Style {
    let style = Style::default();
    match tone {
        Tone::Title => style.fg(Color::Cyan).add_modifier(Modifier::BOLD),
        Tone::Text => style.fg(Color::White),
        Tone::Dim => style.fg(Color::DarkGray),
        Tone::Highlight => style.fg(Color::Yellow),
        Tone::Ok => style.fg(Color::Green),
        Tone::Warning => style.fg(Color::LightYellow),
        Tone::Error => style.fg(Color::Red),
        Tone::Info => style.fg(Color::LightBlue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_map_to_joystick() {
        assert_eq!(map_key(KeyCode::Up), Some(InputEvent::Button(Button::Up)));
        assert_eq!(
            map_key(KeyCode::Enter),
            Some(InputEvent::Button(Button::Press))
        );
        assert_eq!(
            map_key(KeyCode::Char('3')),
            Some(InputEvent::Button(Button::Key3))
        );
        assert_eq!(map_key(KeyCode::Char('q')), Some(InputEvent::Quit));
        assert_eq!(map_key(KeyCode::Char('x')), None);
    }
}
