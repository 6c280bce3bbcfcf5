//! Module upgrade orchestration
//!
//! Connects, authenticates, upgrades every configured module in order and
//! finally hands over to the translation refresh. Every step is reported
//! through the [`OutputSink`]; the returned [`RunReport`] carries the same
//! information in structured form.

use crate::{
    config::UpdateConfig,
    odoo_client::{AuthError, RemoteClient, RpcError, ServerVersion, Session},
    services::{
        fault_log::{LogKind, LogStore},
        output::{OutputSink, StyleHint},
        run_context::{RunContext, RunMode},
        translation::TranslationOutcome,
    },
};
use anyhow::Result;
use log::{error, info, warn};
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

pub const MODULE_MODEL: &str = "ir.module.module";
const UPGRADE_METHOD: &str = "button_immediate_upgrade";
const SEPARATOR_WIDTH: usize = 70;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleStatus {
    Ok,
    /// The server refused the request as busy; counted as success
    OkServerBusy,
    Failed,
    NotFound,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateOutcome {
    pub module_name: String,
    /// 1-based position in the configured module list
    pub sequence_index: usize,
    pub found: bool,
    pub status: ModuleStatus,
    /// Only set for [`ModuleStatus::Ok`]
    pub elapsed: Option<Duration>,
    /// Only set for [`ModuleStatus::Failed`]; `Null` when the call faulted
    pub raw_response: Option<Value>,
    pub log_file: Option<PathBuf>,
}

/// Why a run stopped before finishing its work
#[derive(Clone, Debug, PartialEq)]
pub enum AbortReason {
    AuthenticationRefused(String),
    /// The server answered the login with a fault, a protocol or a transport error
    AuthenticationFault(String),
    InvalidCredentials(String),
    PermissionDenied { module: String },
    LookupFault { module: String, fault: String },
    Declined,
}

impl From<&AuthError> for AbortReason {
    fn from(e: &AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials { .. } => AbortReason::InvalidCredentials(e.to_string()),
            AuthError::Refused(_) => AbortReason::AuthenticationRefused(e.to_string()),
            AuthError::Rpc(_) => AbortReason::AuthenticationFault(e.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub server_version: Option<ServerVersion>,
    pub modules: Vec<UpdateOutcome>,
    pub translation: Option<TranslationOutcome>,
    pub aborted: Option<AbortReason>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.aborted.is_none()
    }
}

/// Classify the answer of an immediate upgrade request
///
/// A busy server wins over everything else. Otherwise only a client reload
/// or a redirect to the web client count as success.
pub fn classify_response(response: Option<&Value>, fault: Option<&RpcError>) -> ModuleStatus {
    if fault.is_some_and(RpcError::is_server_busy) {
        return ModuleStatus::OkServerBusy;
    }

    match response {
        Some(Value::Object(action))
            if action.get("tag") == Some(&json!("reload"))
                || action.get("url") == Some(&json!("/web")) =>
        {
            ModuleStatus::Ok
        }
        _ => ModuleStatus::Failed,
    }
}

pub struct UpdateOrchestrator<'a, C: RemoteClient + ?Sized, S: OutputSink + ?Sized> {
    pub(super) client: &'a C,
    pub(super) sink: &'a mut S,
    pub(super) logs: &'a LogStore,
    ctx: &'a mut RunContext,
}

impl<'a, C: RemoteClient + ?Sized, S: OutputSink + ?Sized> UpdateOrchestrator<'a, C, S> {
    pub fn new(
        client: &'a C,
        sink: &'a mut S,
        logs: &'a LogStore,
        ctx: &'a mut RunContext,
    ) -> Self {
        Self {
            client,
            sink,
            logs,
            ctx,
        }
    }

    /// Run the whole update sequence once
    ///
    /// Returns `Err` only when asking the operator for confirmation fails;
    /// every remote failure ends up in the report.
    pub fn run(&mut self, config: &UpdateConfig) -> Result<RunReport> {
        let mut report = RunReport::default();

        self.sink.part("- ERP server: ");
        self.sink.styled_line(&config.url, StyleHint::Code);
        self.sink.part("- Database: ");
        self.sink.styled_line(&config.db, StyleHint::Code);

        if self.ctx.mode == RunMode::StatusPane {
            self.sink.line(&format!("- Time now: {}", now()));
        }

        self.sink
            .emit("- Connecting remote server...", StyleHint::Plain, " ");

        let session = match Session::authenticate(
            self.client,
            &config.db,
            &config.username,
            &config.password,
        ) {
            Ok(session) => session,
            Err(e) => {
                error!("authentication failed: {e}");
                self.sink.styled_line("error!", StyleHint::Failure);
                self.sink.styled_line(&e.to_string(), StyleHint::Code);
                report.aborted = Some(AbortReason::from(&e));
                return Ok(report);
            }
        };

        self.sink.styled_line("connected!", StyleHint::Success);
        self.sink.part("- Remote server version: ");
        self.sink
            .styled_line(&session.version.to_string(), StyleHint::Emphasis);
        report.server_version = Some(session.version.clone());

        let modules = &config.modules_to_update;
        let console = self.ctx.mode == RunMode::Console;

        if console {
            self.sink.line("");
            self.sink.line(&"=".repeat(SEPARATOR_WIDTH));
        }

        if modules.is_empty() {
            self.sink.line("- No module to update");
        } else {
            self.sink.part("- Total module to update: ");
            self.sink
                .styled_part(&modules.len().to_string(), StyleHint::Emphasis);
            let list: String = modules.iter().map(|m| format!("\n    + {m}")).collect();
            self.sink.line(&format!(", module list:{list}"));
        }

        if console {
            self.sink.line(&"=".repeat(SEPARATOR_WIDTH));
            self.sink.line("");

            if !self.ctx.confirm()? {
                info!("run declined by operator");
                report.aborted = Some(AbortReason::Declined);
                return Ok(report);
            }

            self.sink
                .line(&format!("Running (current time is: {})...", now()));
            self.sink.line("");
        }

        self.update_modules(&session, modules, &mut report);

        if report.aborted.is_some() {
            return Ok(report);
        }

        if let Some(code) = config.language_code() {
            report.translation = Some(self.update_translation(&session, code));
        }

        Ok(report)
    }

    fn update_modules(&mut self, session: &Session, modules: &[String], report: &mut RunReport) {
        let total = modules.len();

        for (position, name) in modules.iter().enumerate() {
            let sequence_index = position + 1;

            self.sink.part("- Requesting update module: ");
            self.sink.styled_part(name, StyleHint::Emphasis);
            self.sink.line("...");

            let ids = match session.call(
                self.client,
                MODULE_MODEL,
                "search",
                json!([[["name", "=", name.trim()]]]),
                None,
            ) {
                Ok(ids) => ids,
                Err(e) if e.is_access_denied() => {
                    error!("access denied while looking up module {name}: {e}");
                    self.sink.part("- ");
                    self.sink.styled_part("'Access denied'", StyleHint::Emphasis);
                    self.sink
                        .line(" please check user account and login password!");
                    report.aborted = Some(AbortReason::PermissionDenied {
                        module: name.clone(),
                    });
                    return;
                }
                Err(e) => {
                    error!("failed to look up module {name}: {e}");
                    self.sink.part("- ");
                    self.sink.styled_part("Error: ", StyleHint::Emphasis);
                    self.sink.styled_line(&e.to_string(), StyleHint::Code);
                    report.aborted = Some(AbortReason::LookupFault {
                        module: name.clone(),
                        fault: e.to_string(),
                    });
                    return;
                }
            };

            let outcome = match ids {
                Value::Array(ids) if !ids.is_empty() => {
                    self.upgrade_module(session, name, sequence_index, total, Value::Array(ids))
                }
                _ => {
                    warn!("module {name} not found");
                    self.report_prefix(sequence_index, total, name);
                    self.sink
                        .styled_line("module is not found!", StyleHint::Failure);
                    UpdateOutcome {
                        module_name: name.clone(),
                        sequence_index,
                        found: false,
                        status: ModuleStatus::NotFound,
                        elapsed: None,
                        raw_response: None,
                        log_file: None,
                    }
                }
            };

            report.modules.push(outcome);
        }
    }

    fn upgrade_module(
        &mut self,
        session: &Session,
        name: &str,
        sequence_index: usize,
        total: usize,
        ids: Value,
    ) -> UpdateOutcome {
        let started = Instant::now();
        let result = session.call(self.client, MODULE_MODEL, UPGRADE_METHOD, json!([ids]), None);
        let elapsed = started.elapsed();

        let (response, fault) = match result {
            Ok(response) => (Some(response), None),
            Err(e) => {
                warn!("upgrade of {name} raised: {e}");
                (None, Some(e))
            }
        };

        let log_file = fault
            .as_ref()
            .and_then(|fault| self.persist(LogKind::Execute, &fault.to_string()));

        let status = classify_response(response.as_ref(), fault.as_ref());

        self.report_prefix(sequence_index, total, name);
        let mut outcome = UpdateOutcome {
            module_name: name.to_string(),
            sequence_index,
            found: true,
            status,
            elapsed: None,
            raw_response: None,
            log_file: log_file.clone(),
        };

        match status {
            ModuleStatus::Ok => {
                self.sink.styled_part("OK", StyleHint::Success);
                self.sink.line(&format!(
                    ", run-time: {:.2} seconds",
                    elapsed.as_secs_f64()
                ));
                outcome.elapsed = Some(elapsed);
            }
            ModuleStatus::OkServerBusy => {
                self.sink.styled_part("OK (server busy!)", StyleHint::Success);
                self.sink.line(", run-time: n/a");
            }
            ModuleStatus::Failed | ModuleStatus::NotFound => {
                let raw = response.unwrap_or(Value::Null);
                self.sink.styled_part("FAILED", StyleHint::Failure);
                self.sink.part(", RESPONSE: ");
                self.sink.styled_line(&raw.to_string(), StyleHint::Code);
                outcome.raw_response = Some(raw);
            }
        }

        if let Some(path) = log_file {
            self.log_file_line(&path);
        }

        outcome
    }

    fn report_prefix(&mut self, sequence_index: usize, total: usize, name: &str) {
        self.sink
            .part(&format!("- [{sequence_index}/{total}] Update module "));
        self.sink.styled_part(name, StyleHint::Emphasis);
        self.sink.part(" --- ");
    }

    pub(super) fn log_file_line(&mut self, path: &std::path::Path) {
        self.sink.part("    - Log file: ");
        self.sink
            .styled_line(&path.display().to_string(), StyleHint::Code);
    }

    /// Persist `text`; a failure to write is reported but never stops the run
    pub(super) fn persist(&mut self, kind: LogKind, text: &str) -> Option<PathBuf> {
        match self.logs.write(kind, text) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("failed to persist {kind:?} log: {e:#}");
                self.sink
                    .styled_line(&format!("    - {e:#}"), StyleHint::Failure);
                None
            }
        }
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
