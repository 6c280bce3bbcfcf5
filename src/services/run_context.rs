//! Per-run context handed to the orchestrator by a shell
//!
//! Cancellation is a single token: it is only honoured while waiting before
//! the run starts. Once modules are being processed the run goes on until it
//! completes or aborts.

use crate::services::output::{OutputSink, StyleHint};
use anyhow::Result;
use log::info;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the token for the next run of a long lived form
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// One-shot command line run, confirms before touching modules
    Console,
    /// Interactive form, prints the current time and never blocks
    StatusPane,
}

type Confirmation = Box<dyn FnMut() -> Result<bool> + Send>;

pub struct RunContext {
    pub mode: RunMode,
    pub cancel: CancellationToken,
    wait: Duration,
    tick: Duration,
    confirmation: Option<Confirmation>,
}

impl RunContext {
    const REMAINING_NOTICE_EVERY: u64 = 5;

    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            cancel: CancellationToken::new(),
            wait: Duration::ZERO,
            tick: Duration::from_secs(1),
            confirmation: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Length of one countdown step; one second outside of tests
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Asked once before module processing in console mode; `false` declines the run
    pub fn with_confirmation(
        mut self,
        confirmation: impl FnMut() -> Result<bool> + Send + 'static,
    ) -> Self {
        self.confirmation = Some(Box::new(confirmation));
        self
    }

    pub fn confirm(&mut self) -> Result<bool> {
        match (self.mode, self.confirmation.as_mut()) {
            (RunMode::Console, Some(confirmation)) => confirmation(),
            _ => Ok(true),
        }
    }

    /// Count down the configured delay
    ///
    /// Returns `false` if the run was cancelled before or during the wait.
    pub fn wait_before_start(&self, sink: &mut dyn OutputSink) -> bool {
        let seconds = self.wait.as_secs();

        if seconds > 0 && !self.cancel.is_cancelled() {
            sink.line(&format!("Wait for {seconds} seconds..."));

            for elapsed in 1..=seconds {
                if self.cancel.is_cancelled() {
                    break;
                }
                thread::sleep(self.tick);
                if elapsed % Self::REMAINING_NOTICE_EVERY == 0 && elapsed < seconds {
                    sink.line(&format!(
                        "Time wait remain: {} seconds...",
                        seconds - elapsed
                    ));
                }
            }
        }

        if self.cancel.is_cancelled() {
            info!("run cancelled before start");
            sink.styled_line("=== CANCEL ===", StyleHint::Emphasis);
            return false;
        }

        true
    }
}
