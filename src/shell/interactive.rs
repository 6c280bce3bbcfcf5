//! Terminal form
//!
//! Asks for config file, modules, language, password and waiting time, then
//! runs the update with plain output between start and end markers. The form
//! is offered again after every run until the operator leaves.

use crate::{
    cli::Cli,
    config::{UpdateConfig, parse_module_list},
    odoo_client::OdooClient,
    services::{
        output::{OutputSink, StatusPaneSink, StyleHint},
        run_context::{CancellationToken, RunContext, RunMode},
        upgrade::UpdateOrchestrator,
    },
    shell::{exit_code, install_interrupt_handler, report_unexpected_error},
};
use anyhow::Result;
use inquire::{
    Confirm, InquireError, Password, PasswordDisplayMode, Select, Text,
    error::InquireResult,
};
use log::info;
use std::{
    io::{self, Stdout},
    time::Duration,
};

const LANGUAGES: [&str; 6] = [
    "",
    "vi_VN (Vietnamese)",
    "en_US (English)",
    "fr_FR (French)",
    "es_ES (Spanish)",
    "zh_CN (Chinese (Simplified))",
];
const NO_LANGUAGE_LABEL: &str = "(no translation)";
const WAIT_CHOICES: [u64; 10] = [0, 30, 60, 120, 180, 300, 600, 900, 1800, 3600];

type PaneSink = StatusPaneSink<Stdout>;

/// What the operator filled in, ready to run
struct FormInput {
    config: UpdateConfig,
    password_from_input: bool,
    wait: Duration,
}

pub fn run(cli: &Cli) -> Result<i32> {
    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone())?;

    let mut sink = StatusPaneSink::new(io::stdout());
    let mut code = 0;

    loop {
        if let Some(input) = prompt_form(cli, &mut sink)? {
            code = execute(cli, input, &cancel, &mut sink);
            cancel.reset();
        }

        let again = answer(
            Confirm::new("Start another update?")
                .with_default(false)
                .prompt(),
        )?;
        if again != Some(true) {
            return Ok(code);
        }
    }
}

fn execute(cli: &Cli, input: FormInput, cancel: &CancellationToken, sink: &mut PaneSink) -> i32 {
    let FormInput {
        config,
        password_from_input,
        wait,
    } = input;
    let logs = cli.log_store(&config);

    if password_from_input {
        sink.line("- Auth using password is set from input");
    }

    let mut ctx = RunContext::new(RunMode::StatusPane)
        .with_cancellation(cancel.clone())
        .with_wait(wait);
    if !ctx.wait_before_start(sink) {
        return 1;
    }

    sink.styled_line("=== UPDATE START ===", StyleHint::Emphasis);

    let result = OdooClient::connect(&config.url, cli.timeout())
        .and_then(|client| UpdateOrchestrator::new(&client, &mut *sink, &logs, &mut ctx).run(&config));

    let code = match result {
        Ok(report) => exit_code(&report),
        Err(e) => {
            report_unexpected_error(sink, &logs, &e);
            1
        }
    };

    sink.styled_line("=== UPDATE END ===", StyleHint::Emphasis);
    code
}

/// Ask for every field; `None` when the input cannot be run
fn prompt_form(cli: &Cli, sink: &mut PaneSink) -> Result<Option<FormInput>> {
    let initial_path = cli
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    let Some(path) = answer(
        Text::new("Config file:")
            .with_initial_value(&initial_path)
            .with_help_message("JSON file with url, db, username, password")
            .prompt(),
    )?
    else {
        return Ok(None);
    };
    let path = path.trim();

    if path.is_empty() {
        sink.line("Please select a config file...");
        return Ok(None);
    }

    let mut config = match UpdateConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            sink.styled_line("=== ERROR ===", StyleHint::Emphasis);
            sink.styled_line(&e.to_string(), StyleHint::Failure);
            return Ok(None);
        }
    };
    info!("form loaded config {path}");
    preview(&config, sink);

    let initial_modules = if cli.modules.is_empty() {
        config.modules_to_update.join(", ")
    } else {
        cli.modules.join(", ")
    };
    let Some(modules) = answer(
        Text::new("Modules to update:")
            .with_initial_value(&initial_modules)
            .with_help_message("comma separated, leave empty to only refresh translations")
            .prompt(),
    )?
    else {
        return Ok(None);
    };
    config.modules_to_update = parse_module_list(&modules);

    let current_language = cli
        .language
        .as_deref()
        .unwrap_or(&config.language_to_update);
    let (options, cursor) = language_options(current_language);
    let Some(language) = answer(
        Select::new("Language to update:", options)
            .with_starting_cursor(cursor)
            .prompt(),
    )?
    else {
        return Ok(None);
    };
    config.language_to_update = language_value(&language).to_string();

    let Some(password) = answer(
        Password::new("Admin password:")
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Masked)
            .with_help_message("leave empty to use the password from the config file")
            .prompt(),
    )?
    else {
        return Ok(None);
    };
    let password_from_input = !password.is_empty() || cli.password.is_some();
    if !password.is_empty() {
        config.override_password(password);
    } else if let Some(password) = &cli.password {
        config.override_password(password.clone());
    }

    let Some(wait) = answer(
        Select::new("Waiting time (sec):", WAIT_CHOICES.to_vec())
            .with_starting_cursor(wait_cursor(cli.wait))
            .prompt(),
    )?
    else {
        return Ok(None);
    };

    if let Err(e) = config.ensure_runnable() {
        sink.styled_part("---\nError: ", StyleHint::Emphasis);
        sink.line(&e.to_string());
        return Ok(None);
    }

    Ok(Some(FormInput {
        config,
        password_from_input,
        wait: Duration::from_secs(wait),
    }))
}

/// Escape leaves the form, Ctrl+C and broken terminals end the program
fn answer<T>(result: InquireResult<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled) => Ok(None),
        Err(e) => Err(anyhow::anyhow!("Prompt cancelled: {}", e)),
    }
}

fn preview(config: &UpdateConfig, sink: &mut dyn OutputSink) {
    sink.line("---");
    sink.styled_part("Config file: ", StyleHint::Emphasis);
    sink.line(&config.source_path.display().to_string());
    sink.part("  - ERP server: ");
    sink.styled_line(&config.url, StyleHint::Code);
    sink.part("  - Database: ");
    sink.styled_line(&config.db, StyleHint::Code);
    sink.part("  - Username: ");
    sink.styled_line(&config.username, StyleHint::Code);
    sink.part("  - Password: ");
    if config.password_is_set() {
        sink.styled_line("YES", StyleHint::Success);
    } else {
        sink.styled_line("NO", StyleHint::Failure);
    }
}

fn language_label(language: &'static str) -> &'static str {
    if language.is_empty() {
        NO_LANGUAGE_LABEL
    } else {
        language
    }
}

fn language_value(label: &str) -> &str {
    if label == NO_LANGUAGE_LABEL { "" } else { label }
}

fn language_code(language: &str) -> &str {
    language.split_whitespace().next().unwrap_or_default()
}

/// Select entries with the cursor on the one matching `current`, e.g. `vi_VN`
/// or `vi_VN (Vietnamese)`. A configured language that is not offered is
/// appended so that it stays selectable.
fn language_options(current: &str) -> (Vec<String>, usize) {
    let mut options: Vec<String> = LANGUAGES
        .iter()
        .map(|l| language_label(l).to_string())
        .collect();
    let code = language_code(current);

    if let Some(cursor) = LANGUAGES.iter().position(|l| language_code(l) == code) {
        return (options, cursor);
    }

    options.push(current.trim().to_string());
    (options, LANGUAGES.len())
}

fn wait_cursor(wait: u64) -> usize {
    WAIT_CHOICES.iter().position(|w| *w == wait).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::output::MemorySink;
    use std::path::PathBuf;

    fn config(password: &str) -> UpdateConfig {
        UpdateConfig {
            url: "http://erp:8069".to_string(),
            db: "prod".to_string(),
            username: "admin".to_string(),
            password: password.to_string(),
            modules_to_update: vec![],
            language_to_update: String::new(),
            source_path: PathBuf::from("/etc/erp/prod.json"),
        }
    }

    #[test]
    fn preview_shows_connection_and_password_state() {
        let mut sink = MemorySink::default();
        preview(&config("secret"), &mut sink);

        assert_eq!(
            sink.lines(),
            vec![
                "---",
                "Config file: /etc/erp/prod.json",
                "  - ERP server: http://erp:8069",
                "  - Database: prod",
                "  - Username: admin",
                "  - Password: YES",
            ]
        );
    }

    #[test]
    fn preview_flags_missing_password() {
        let mut sink = MemorySink::default();
        preview(&config(""), &mut sink);

        assert_eq!(
            sink.lines().last().map(String::as_str),
            Some("  - Password: NO")
        );
    }

    #[test]
    fn empty_language_round_trips_through_its_label() {
        assert_eq!(language_value(language_label("")), "");
        assert_eq!(
            language_value(language_label("fr_FR (French)")),
            "fr_FR (French)"
        );
    }

    #[test]
    fn language_options_preselect_on_code() {
        assert_eq!(language_options("").1, 0);
        assert_eq!(language_options("   ").1, 0);
        assert_eq!(language_options("en_US").1, 2);
        assert_eq!(language_options("vi_VN (Vietnamese)").1, 1);

        let (options, cursor) = language_options("zh_CN (Chinese (Simplified))");
        assert_eq!(cursor, 5);
        assert_eq!(options.len(), LANGUAGES.len());
        assert_eq!(options[0], NO_LANGUAGE_LABEL);
    }

    #[test]
    fn configured_language_outside_the_list_is_kept() {
        let (options, cursor) = language_options("de_DE (German)");

        assert_eq!(options.len(), LANGUAGES.len() + 1);
        assert_eq!(options[cursor], "de_DE (German)");
        assert_eq!(language_value(&options[cursor]), "de_DE (German)");
    }

    #[test]
    fn wait_cursor_falls_back_to_no_wait() {
        assert_eq!(wait_cursor(300), 5);
        assert_eq!(wait_cursor(42), 0);
    }
}
