use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env, Target};
use log::{error, info};
use odoo_remote_update::{
    cli::Cli,
    shell::{console, interactive},
};
use std::io::Write;

fn main() {
    let cli = Cli::parse();

    initialize();

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("application error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    if cli.interactive {
        interactive::run(cli)
    } else {
        console::run(cli)
    }
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("warn"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    // stdout carries the report
    builder.target(Target::Stderr).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}
