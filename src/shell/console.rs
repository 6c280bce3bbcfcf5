//! One-shot command line run

use crate::{
    cli::{Cli, usage},
    config::{ConfigError, UpdateConfig},
    odoo_client::OdooClient,
    services::{
        fault_log::LogStore,
        output::ConsoleSink,
        run_context::{CancellationToken, RunContext, RunMode},
        upgrade::{RunReport, UpdateOrchestrator},
    },
    shell::{exit_code, install_interrupt_handler, report_unexpected_error},
};
use anyhow::Result;
use colored::Colorize;
use inquire::{Confirm, InquireError};
use log::{error, info};

pub fn run(cli: &Cli) -> Result<i32> {
    let Some(path) = cli.config.as_deref() else {
        println!("{}", usage());
        return Ok(0);
    };

    let mut config = match UpdateConfig::load(path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(path)) => {
            println!(
                "The config file: {} is not found!",
                path.display().to_string().red()
            );
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };
    cli.apply_to(&mut config);
    info!("loaded config {}", path.display());

    if let Err(e) = config.ensure_runnable() {
        error!("refusing to run {}: {e}", path.display());
        println!("{}", e.to_string().red());
        return Ok(1);
    }

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone())?;

    let mut ctx = RunContext::new(RunMode::Console)
        .with_cancellation(cancel)
        .with_wait(cli.wait());
    if !cli.yes {
        ctx = ctx.with_confirmation(confirm_start);
    }

    let mut sink = ConsoleSink;
    if !ctx.wait_before_start(&mut sink) {
        return Ok(1);
    }

    let logs = cli.log_store(&config);
    match execute(cli, &config, &logs, &mut ctx, &mut sink) {
        Ok(report) => Ok(exit_code(&report)),
        Err(e) => {
            report_unexpected_error(&mut sink, &logs, &e);
            Ok(1)
        }
    }
}

fn execute(
    cli: &Cli,
    config: &UpdateConfig,
    logs: &LogStore,
    ctx: &mut RunContext,
    sink: &mut ConsoleSink,
) -> Result<RunReport> {
    let client = OdooClient::connect(&config.url, cli.timeout())?;
    UpdateOrchestrator::new(&client, sink, logs, ctx).run(config)
}

fn confirm_start() -> Result<bool> {
    match Confirm::new("Press Enter to continue...")
        .with_default(true)
        .prompt()
    {
        Ok(answer) => Ok(answer),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Prompt cancelled: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::{ffi::OsStr, net::TcpListener, path::PathBuf};
    use tempfile::TempDir;

    #[test]
    fn without_config_prints_usage_and_succeeds() {
        let cli = Cli::try_parse_from(["odoo-remote-update"]).expect("should parse");
        assert_eq!(run(&cli).expect("should run"), 0);
    }

    #[test]
    fn missing_config_file_fails() {
        let cli = Cli::try_parse_from(["odoo-remote-update", "/nonexistent/prod.json"])
            .expect("should parse");
        assert_eq!(run(&cli).expect("should run"), 1);
    }

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("prod.json");
        std::fs::write(&path, content).expect("should write config");
        path
    }

    /// Runs `-y` against a listener and returns the exit code and whether it was contacted
    fn run_against_listener(config: impl Fn(&str) -> String) -> (i32, bool) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("should bind listener");
        listener
            .set_nonblocking(true)
            .expect("should set listener nonblocking");
        let url = format!("http://{}", listener.local_addr().expect("should have address"));

        let dir = TempDir::new().expect("should create temp dir");
        let path = write_config(&dir, &config(&url));
        let cli = Cli::try_parse_from([
            OsStr::new("odoo-remote-update"),
            OsStr::new("-y"),
            OsStr::new("--log-dir"),
            dir.path().as_os_str(),
            path.as_os_str(),
        ])
        .expect("should parse");

        let code = run(&cli).expect("should run");
        (code, listener.accept().is_ok())
    }

    #[test]
    fn missing_database_is_refused_before_connecting() {
        let (code, contacted) = run_against_listener(|url| {
            format!(
                r#"{{"url": "{url}", "db": "", "password": "pw", "modules_to_update": ["sale"]}}"#
            )
        });

        assert_eq!(code, 1);
        assert!(!contacted);
    }

    #[test]
    fn nothing_to_do_is_refused_before_connecting() {
        let (code, contacted) = run_against_listener(|url| {
            format!(r#"{{"url": "{url}", "db": "prod", "password": "pw", "modules_to_update": []}}"#)
        });

        assert_eq!(code, 1);
        assert!(!contacted);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = TempDir::new().expect("should create temp dir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").expect("should write config");
        let cli = Cli::try_parse_from([OsStr::new("odoo-remote-update"), path.as_os_str()])
            .expect("should parse");

        let err = run(&cli).expect_err("should fail");
        assert!(err.to_string().contains("failed to read config file"));
    }
}
