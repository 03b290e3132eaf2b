//! Display-list canvas consumed by the operational modes.
//!
//! Modes never draw pixels. They append styled text rows to a [`Canvas`]
//! and the active display sink (terminal simulator, LCD driver) decides
//! how a finished [`Frame`] reaches the glass.

use crate::mode::Menu;
use crate::util::truncate;

/// Text columns the 1.44" panel fits at the menu font size.
pub const DISPLAY_COLS: usize = 26;

const MENU_LABEL_COLS: usize = 18;
const GAUGE_CELLS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Title,
    Text,
    Dim,
    Highlight,
    Ok,
    Warning,
    Error,
    Info,
}

/// Colour bucket for a utilisation percentage.
pub fn tone_for_percent(percent: f32, thresholds: (f32, f32)) -> Tone {
    if percent >= thresholds.1 {
        Tone::Error
    } else if percent >= thresholds.0 {
        Tone::Warning
    } else {
        Tone::Ok
    }
}

#[derive(Clone, Debug)]
pub struct Span {
    pub text: String,
    pub tone: Tone,
}

impl Span {
    pub fn new(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Line {
    pub spans: Vec<Span>,
    pub selected: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub lines: Vec<Line>,
    pub footer: Option<Line>,
}

pub struct Canvas {
    cols: usize,
    lines: Vec<Line>,
    footer: Option<Line>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::with_cols(DISPLAY_COLS)
    }

    pub fn with_cols(cols: usize) -> Self {
        Self {
            cols,
            lines: Vec::new(),
            footer: None,
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn blank(&mut self) {
        self.lines.push(Line::default());
    }

    pub fn text(&mut self, tone: Tone, text: impl AsRef<str>) {
        let text = truncate(text.as_ref(), self.cols);
        self.lines.push(Line {
            spans: vec![Span::new(text, tone)],
            selected: false,
        });
    }

    pub fn spans(&mut self, spans: Vec<Span>) {
        self.lines.push(Line {
            spans,
            selected: false,
        });
    }

    pub fn title(&mut self, text: impl AsRef<str>) {
        self.text(Tone::Title, text);
    }

    /// Label/value row, value right-toned.
    pub fn pair(&mut self, label: impl AsRef<str>, value: impl AsRef<str>, value_tone: Tone) {
        self.spans(vec![
            Span::new(format!("{} ", label.as_ref()), Tone::Dim),
            Span::new(truncate(value.as_ref(), self.cols), value_tone),
        ]);
    }

    /// Textual utilisation bar, e.g. `CPU  42% ████▒▒▒▒▒▒`.
    pub fn gauge(&mut self, label: &str, percent: f32, tone: Tone) {
        let clamped = percent.clamp(0.0, 100.0);
        let filled = ((clamped / 100.0) * GAUGE_CELLS as f32).round() as usize;
        let mut bar = "█".repeat(filled.min(GAUGE_CELLS));
        bar.push_str(&"▒".repeat(GAUGE_CELLS - filled.min(GAUGE_CELLS)));
        self.spans(vec![
            Span::new(format!("{label:<4}{clamped:>3.0}% "), tone),
            Span::new(bar, tone),
        ]);
    }

    pub fn separator(&mut self) {
        let rule = "─".repeat(self.cols);
        self.text(Tone::Dim, rule);
    }

    pub fn footer(&mut self, text: impl AsRef<str>) {
        self.footer = Some(Line {
            spans: vec![Span::new(truncate(text.as_ref(), self.cols), Tone::Dim)],
            selected: false,
        });
    }

    /// Render the visible window of a menu: cursor, icon, label and an
    /// optional status column, with overflow markers when scrolled.
    pub fn menu(&mut self, menu: &Menu) {
        let window = menu.visible_window();
        let has_above = window.start > 0;
        let has_below = window.end < menu.len();
        for idx in window.clone() {
            let item = &menu.items()[idx];
            let is_selected = idx == menu.selected();
            let marker = if is_selected { ">" } else { " " };
            let label_tone = if is_selected { Tone::Text } else { Tone::Dim };
            let icon_tone = if is_selected { Tone::Highlight } else { Tone::Info };
            let mut spans = vec![
                Span::new(marker, Tone::Highlight),
                Span::new(format!("{} ", item.icon), icon_tone),
                Span::new(
                    format!("{:<width$}", truncate(&item.label, MENU_LABEL_COLS), width = MENU_LABEL_COLS),
                    label_tone,
                ),
            ];
            if let Some((status, tone)) = &item.status {
                spans.push(Span::new(format!(" {status}"), *tone));
            }
            if idx == window.start && has_above {
                spans.push(Span::new("▲", Tone::Dim));
            }
            if idx + 1 == window.end && has_below {
                spans.push(Span::new("▼", Tone::Dim));
            }
            self.lines.push(Line {
                spans,
                selected: is_selected,
            });
        }
    }

    pub fn finish(self) -> Frame {
        Frame {
            lines: self.lines,
            footer: self.footer,
        }
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}
