//! Report output
//!
//! The orchestrator pushes every human readable line through an
//! [`OutputSink`]. The console prints with colors, the status pane of the
//! interactive form prints plain text, tests collect fragments in memory.

use colored::Colorize;
use log::error;
use std::io::{self, Write};

/// Presentation hint attached to a fragment; sinks may ignore it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StyleHint {
    #[default]
    Plain,
    /// Names and counts the operator should spot
    Emphasis,
    /// Verbatim server data: urls, raw responses, fault text
    Code,
    Success,
    Failure,
}

/// A piece of report text and what follows it (`"\n"`, `" "` or nothing)
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub hint: StyleHint,
    pub end: &'static str,
}

pub trait OutputSink {
    fn emit(&mut self, text: &str, hint: StyleHint, end: &'static str);

    fn line(&mut self, text: &str) {
        self.emit(text, StyleHint::Plain, "\n");
    }

    fn part(&mut self, text: &str) {
        self.emit(text, StyleHint::Plain, "");
    }

    fn styled_line(&mut self, text: &str, hint: StyleHint) {
        self.emit(text, hint, "\n");
    }

    fn styled_part(&mut self, text: &str, hint: StyleHint) {
        self.emit(text, hint, "");
    }
}

/// Colored output on stdout
#[derive(Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn emit(&mut self, text: &str, hint: StyleHint, end: &'static str) {
        let styled = match hint {
            StyleHint::Plain | StyleHint::Code => text.normal(),
            StyleHint::Emphasis => text.bold(),
            StyleHint::Success => text.green(),
            StyleHint::Failure => text.red(),
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = write!(stdout, "{styled}{end}").and_then(|_| stdout.flush()) {
            error!("failed to write to console: {e}");
        }
    }
}

/// Plain text output for the interactive status pane
pub struct StatusPaneSink<W: Write> {
    out: W,
}

impl<W: Write> StatusPaneSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> OutputSink for StatusPaneSink<W> {
    fn emit(&mut self, text: &str, _hint: StyleHint, end: &'static str) {
        if let Err(e) = write!(self.out, "{text}{end}").and_then(|_| self.out.flush()) {
            error!("failed to write to status pane: {e}");
        }
    }
}

/// Keeps every fragment, used by tests and embedders that render later
#[derive(Debug, Default)]
pub struct MemorySink {
    pub fragments: Vec<Fragment>,
}

impl MemorySink {
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| format!("{}{}", f.text, f.end))
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(String::from).collect()
    }
}

impl OutputSink for MemorySink {
    fn emit(&mut self, text: &str, hint: StyleHint, end: &'static str) {
        self.fragments.push(Fragment {
            text: text.to_string(),
            hint,
            end,
        });
    }
}
