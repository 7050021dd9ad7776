//! Transcript pane: the display surface owned by the UI thread.
//!
//! Entries are append-only styled runs separated by line breaks. The pane is
//! only ever touched by the owning thread; everything else goes through the
//! console queue.

use crate::model::MessageLevel;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

/// One styled piece of transcript text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Run(StyledRun),
    LineBreak,
}

/// Ordered transcript content. Created lazily on the first entry.
#[derive(Debug, Default)]
pub struct Transcript {
    segments: Vec<Segment>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_run(&mut self, text: &str, color: Color) {
        self.segments.push(Segment::Run(StyledRun {
            text: text.to_string(),
            color,
        }));
    }

    pub fn append_line_break(&mut self) {
        self.segments.push(Segment::LineBreak);
    }

    pub fn run_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Run(_)))
            .count()
    }

    pub fn line_break_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::LineBreak))
            .count()
    }

    /// Render the transcript as one line per break-separated group of runs.
    pub fn to_lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        let mut current: Vec<Span<'static>> = Vec::new();
        for seg in &self.segments {
            match seg {
                Segment::Run(run) => current.push(Span::styled(
                    run.text.clone(),
                    Style::default().fg(run.color),
                )),
                Segment::LineBreak => lines.push(Line::from(std::mem::take(&mut current))),
            }
        }
        if !current.is_empty() {
            lines.push(Line::from(current));
        }
        lines
    }
}

/// Operations the owning context performs on its display surface.
pub trait DisplaySurface {
    fn append_run(&mut self, text: &str, color: Color);
    fn append_line_break(&mut self);
    fn scroll_to_end(&mut self);
    /// Terminal and idempotent: closing a closed surface is a no-op.
    fn close(&mut self);
    fn is_closed(&self) -> bool;
    fn has_entries(&self) -> bool;
}

/// Severity-to-color mapping. These match the colors the package-manager
/// console uses for the same levels.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    high_contrast: bool,
}

impl Palette {
    pub fn new(high_contrast: bool) -> Self {
        Self { high_contrast }
    }

    pub fn color(&self, level: MessageLevel) -> Color {
        if self.high_contrast {
            // Single plain color, leave contrast to the terminal theme.
            return Color::Reset;
        }
        match level {
            MessageLevel::Debug => Color::DarkGray,
            MessageLevel::Error => Color::Red,
            MessageLevel::Warning => Color::Magenta,
            MessageLevel::Info => Color::Reset,
        }
    }
}

/// Owning-context append step: pick the severity color, separate from the
/// previous entry with exactly one line break, and keep the tail in view.
pub fn append_message(
    surface: &mut dyn DisplaySurface,
    palette: &Palette,
    level: MessageLevel,
    text: &str,
) {
    let color = palette.color(level);
    if surface.has_entries() {
        surface.append_line_break();
    }
    surface.append_run(text, color);
    surface.scroll_to_end();
}

/// The TUI-backed surface: a lazily created transcript plus scroll state.
pub struct LogPane {
    doc: Option<Transcript>,
    follow: bool,
    scroll: usize,
    closed: bool,
}

impl LogPane {
    pub fn new() -> Self {
        Self {
            doc: None,
            follow: true,
            scroll: 0,
            closed: false,
        }
    }

    pub fn lines(&self) -> Vec<Line<'static>> {
        self.doc.as_ref().map(Transcript::to_lines).unwrap_or_default()
    }

    pub fn line_count(&self) -> usize {
        self.doc
            .as_ref()
            .map(|d| d.line_break_count() + usize::from(d.run_count() > 0))
            .unwrap_or(0)
    }

    fn max_offset(&self, height: usize) -> usize {
        self.line_count().saturating_sub(height)
    }

    pub fn scroll_up(&mut self, height: usize) {
        if self.follow {
            self.scroll = self.max_offset(height);
            self.follow = false;
        }
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self, height: usize) {
        let max = self.max_offset(height);
        self.scroll = self.scroll.saturating_add(1).min(max);
        if self.scroll == max {
            self.follow = true;
        }
    }

    /// Paragraph scroll offset for a viewport of `height` rows.
    pub fn scroll_offset(&self, height: usize) -> u16 {
        let max = self.max_offset(height);
        let offset = if self.follow { max } else { self.scroll.min(max) };
        offset.min(u16::MAX as usize) as u16
    }
}

impl Default for LogPane {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for LogPane {
    fn append_run(&mut self, text: &str, color: Color) {
        self.doc
            .get_or_insert_with(Transcript::new)
            .append_run(text, color);
    }

    fn append_line_break(&mut self) {
        self.doc
            .get_or_insert_with(Transcript::new)
            .append_line_break();
    }

    fn scroll_to_end(&mut self) {
        self.follow = true;
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn has_entries(&self) -> bool {
        self.doc.as_ref().map(|d| d.run_count() > 0).unwrap_or(false)
    }
}
