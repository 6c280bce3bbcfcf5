//! Presentation shells
//!
//! Both shells build a config, hand it to the orchestrator and turn the
//! [`RunReport`] into an exit status.

pub mod console;
pub mod interactive;

use crate::services::{
    fault_log::{LogKind, LogStore},
    output::{OutputSink, StyleHint},
    run_context::CancellationToken,
    upgrade::RunReport,
};
use anyhow::{Context, Result};
use log::{error, warn};

const SHORTENED_EDGE: usize = 100;

pub fn exit_code(report: &RunReport) -> i32 {
    if report.is_success() { 0 } else { 1 }
}

/// First Ctrl+C cancels a pending wait, the second one ends the process
pub fn install_interrupt_handler(cancel: CancellationToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        warn!("interrupted, press Ctrl+C again to quit");
        cancel.cancel();
    })
    .context("Failed to set Ctrl+C handler")
}

/// Persist an error the orchestrator did not expect and show a shortened copy
pub fn report_unexpected_error(sink: &mut dyn OutputSink, logs: &LogStore, e: &anyhow::Error) {
    error!("update request failed: {e:#}");

    let text = format!("{e:?}");

    sink.line("\n---");
    sink.styled_part("Error: ", StyleHint::Emphasis);
    sink.line("The update request error, shorten logs:");
    sink.styled_line(&shorten(&text), StyleHint::Code);

    match logs.write(LogKind::Execute, &text) {
        Ok(path) => {
            sink.styled_part("Log file: ", StyleHint::Emphasis);
            sink.line(&path.display().to_string());
        }
        Err(e) => error!("{e:#}"),
    }
}

fn shorten(text: &str) -> String {
    let count = text.chars().count();
    let head: String = text.chars().take(SHORTENED_EDGE).collect();
    let tail: String = text
        .chars()
        .skip(count.saturating_sub(SHORTENED_EDGE))
        .collect();

    format!("{head}\n...\n...{tail}")
}
