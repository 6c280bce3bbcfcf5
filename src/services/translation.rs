//! Translation refresh
//!
//! Servers from major version 11 on need the `remote_update_translation`
//! extension; older ones use the native `update_translations`, which always
//! fails to encode its empty result.

use crate::{
    odoo_client::{RemoteClient, RpcError, Session},
    services::{
        fault_log::LogKind,
        output::{OutputSink, StyleHint},
        upgrade::{MODULE_MODEL, UpdateOrchestrator},
    },
};
use log::{error, info, warn};
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

const LANGUAGE_MODEL: &str = "res.lang";
const PATCHED_METHOD: &str = "remote_update_translation";
const NATIVE_METHOD: &str = "update_translations";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranslationStatus {
    Success,
    Failed,
    /// The server answered with a shape we do not know
    Unknown,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TranslationOutcome {
    pub language_code: String,
    pub found: bool,
    pub module_count: usize,
    pub status: TranslationStatus,
    pub error_detail: Option<String>,
    /// Whole seconds are reported, the full value is kept
    pub duration: Option<Duration>,
    pub log_file: Option<PathBuf>,
}

impl TranslationOutcome {
    fn new(language_code: &str) -> Self {
        Self {
            language_code: language_code.to_string(),
            found: false,
            module_count: 0,
            status: TranslationStatus::Failed,
            error_detail: None,
            duration: None,
            log_file: None,
        }
    }
}

/// Error text collected during one refresh, persisted at the end
#[derive(Debug, Default)]
struct TranslationLog(String);

impl TranslationLog {
    fn append(&mut self, label: &str, text: &str) {
        if self.0.is_empty() {
            self.0.push_str(text);
        } else {
            self.0.push_str(&format!("\n{label}:\n{text}"));
        }
    }

    /// Like [`append`](Self::append) but the label is written even as first entry
    fn append_labelled(&mut self, label: &str, text: &str) {
        if !self.0.is_empty() {
            self.0.push('\n');
        }
        self.0.push_str(&format!("{label}:\n{text}"));
    }
}

impl<C: RemoteClient + ?Sized, S: OutputSink + ?Sized> UpdateOrchestrator<'_, C, S> {
    /// Refresh all translations of `code` on every installed module
    ///
    /// Never fails the run: every remote error ends up in the outcome and in
    /// a translation log file.
    pub fn update_translation(&mut self, session: &Session, code: &str) -> TranslationOutcome {
        let patched = match session.version.requires_patched_translation() {
            Some(patched) => patched,
            None => {
                warn!("unknown server version {}, using native translation update", session.version);
                self.sink
                    .part("- Cannot get remote server version from text: ");
                self.sink
                    .styled_line(&session.version.to_string(), StyleHint::Emphasis);
                false
            }
        };

        self.sink
            .part("- Updating translation for language code: ");
        self.sink.styled_line(code, StyleHint::Emphasis);

        let mut outcome = TranslationOutcome::new(code);
        let mut log = TranslationLog::default();

        if let Err(e) = self.refresh(session, code, patched, &mut outcome, &mut log) {
            error!("translation update for {code} failed: {e}");
            log.append("XMLRPC error", &e.to_string());
            outcome.status = TranslationStatus::Failed;
            outcome.error_detail.get_or_insert_with(|| e.to_string());
            self.sink.part("  - Remote error: ");
            self.sink.styled_line(&e.to_string(), StyleHint::Code);
        }

        if !log.0.is_empty() {
            outcome.log_file = self.persist(LogKind::Translation, &log.0);
            if let Some(path) = outcome.log_file.clone() {
                self.log_file_line(&path);
            }
        }

        outcome
    }

    fn refresh(
        &mut self,
        session: &Session,
        code: &str,
        patched: bool,
        outcome: &mut TranslationOutcome,
        log: &mut TranslationLog,
    ) -> Result<(), RpcError> {
        let languages = session.call(
            self.client,
            LANGUAGE_MODEL,
            "search",
            json!([[["code", "=", code]]]),
            None,
        )?;

        if !is_truthy(&languages) {
            warn!("language {code} is not active");
            self.sink.part("  - Could not find the language code: ");
            self.sink.styled_part(code, StyleHint::Emphasis);
            self.sink
                .line(" active in database, please check it is correct and installed");
            return Ok(());
        }
        outcome.found = true;

        let started = Instant::now();
        let installed = session.call(
            self.client,
            MODULE_MODEL,
            "search",
            json!([[["state", "=", "installed"]]]),
            None,
        )?;
        outcome.module_count = installed.as_array().map_or(0, Vec::len);

        self.sink.part("  - ");
        self.sink
            .styled_part(&outcome.module_count.to_string(), StyleHint::Emphasis);
        self.sink.line(" modules to update translate");

        let args = json!([installed]);
        let kwargs = json!({"filter_lang": code, "context": {"overwrite": true}});

        let result = if patched {
            info!("refreshing {code} translations through {PATCHED_METHOD}");
            session.call(self.client, MODULE_MODEL, PATCHED_METHOD, args, Some(kwargs))?
        } else {
            info!("refreshing {code} translations through {NATIVE_METHOD}");
            match session.call(self.client, MODULE_MODEL, NATIVE_METHOD, args, Some(kwargs)) {
                Ok(_) => Value::Bool(true),
                Err(e) if e.is_null_marshalling() => Value::Bool(true),
                Err(e) => {
                    warn!("native translation update raised: {e}");
                    log.append("Error report", &e.to_string());
                    outcome.error_detail = Some(e.to_string());
                    Value::Bool(false)
                }
            }
        };

        self.report_result(&result, started.elapsed(), outcome, log);

        Ok(())
    }

    fn report_result(
        &mut self,
        result: &Value,
        elapsed: Duration,
        outcome: &mut TranslationOutcome,
        log: &mut TranslationLog,
    ) {
        match result {
            Value::Object(fields) if fields.contains_key("status") => {
                if fields.get("status").is_some_and(is_truthy) {
                    self.report_success(elapsed, outcome);
                } else {
                    let detail = match fields.get("error") {
                        Some(Value::String(text)) => text.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    log.append_labelled("Update error logs", &detail);

                    self.sink.part("  - Update ");
                    self.sink.styled_line("failed", StyleHint::Failure);
                    self.sink.part("  - Error message: ");
                    self.sink.styled_line(&detail, StyleHint::Code);

                    outcome.status = TranslationStatus::Failed;
                    outcome.error_detail = Some(detail);
                }
            }
            Value::Bool(true) => self.report_success(elapsed, outcome),
            Value::Bool(false) => {
                self.sink.part("  - Update ");
                self.sink.styled_part("failed", StyleHint::Failure);
                self.sink.line(". Please check server logs.");
                outcome.status = TranslationStatus::Failed;
            }
            other => {
                self.sink.part("  - Unknown response: ");
                self.sink.styled_line(&other.to_string(), StyleHint::Code);
                outcome.status = TranslationStatus::Unknown;
            }
        }
    }

    fn report_success(&mut self, elapsed: Duration, outcome: &mut TranslationOutcome) {
        self.sink.part("  - Update ");
        self.sink.styled_line("success", StyleHint::Success);
        self.sink.part("  - Duration: ");
        self.sink
            .styled_part(&elapsed.as_secs().to_string(), StyleHint::Emphasis);
        self.sink.line(" second(s)");

        outcome.status = TranslationStatus::Success;
        outcome.duration = Some(elapsed);
    }
}

/// Python style truthiness of a decoded value
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
