use crate::{config::UpdateConfig, services::fault_log::LogStore};
use clap::Parser;
use colored::Colorize;
use std::{path::PathBuf, time::Duration};

/// Command line of `odoo-remote-update`
///
/// Everything but the config file itself is optional: the file carries the
/// server, credentials and work list, flags only override parts of it.
#[derive(Parser, Debug, Clone)]
#[command(name = "odoo-remote-update", version, about, long_about = None)]
pub struct Cli {
    /// JSON config file with url, db, username, password and modules_to_update
    pub config: Option<PathBuf>,

    /// Login password, replaces the one stored in the config file
    pub password: Option<String>,

    /// Module to upgrade, repeat for several; replaces the config module list
    #[arg(short, long = "module", value_name = "NAME")]
    pub modules: Vec<String>,

    /// Language to refresh translations for, e.g. "vi_VN"
    #[arg(short, long, value_name = "CODE")]
    pub language: Option<String>,

    /// Start without asking for confirmation
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub yes: bool,

    /// Seconds to wait before starting, Ctrl+C cancels
    #[arg(short, long, value_name = "SECONDS", default_value_t = 0)]
    pub wait: u64,

    /// Fill in a terminal form instead of running right away
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub interactive: bool,

    /// Seconds a single remote call may take; module upgrades are slow
    #[arg(long, env = "ODOO_RPC_TIMEOUT", value_name = "SECONDS", default_value_t = 900)]
    pub timeout: u64,

    /// Directory for fault logs, defaults to `logs` next to the executable
    #[arg(long, env = "ODOO_UPDATE_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait)
    }

    /// Apply password, module and language overrides to a loaded config
    pub fn apply_to(&self, config: &mut UpdateConfig) {
        if let Some(password) = &self.password {
            config.override_password(password.clone());
        }
        if !self.modules.is_empty() {
            config.modules_to_update = self.modules.clone();
        }
        if let Some(language) = &self.language {
            config.language_to_update = language.clone();
        }
    }

    pub fn log_store(&self, config: &UpdateConfig) -> LogStore {
        let dir = self.log_dir.clone().unwrap_or_else(LogStore::default_dir);
        LogStore::new(dir, config.log_stem())
    }
}

/// Hint printed when the program is started without a config file
pub fn usage() -> String {
    let bin = env!("CARGO_PKG_NAME");
    format!(
        "Required call with config file path, ex: {} or to overwrite password: {}{}\n\
         Use {} to fill in a form instead.",
        format!("{bin} /path/to/config.json").green(),
        format!("{bin} /path/to/config.json ").green(),
        "my-password".red(),
        format!("{bin} --interactive").green(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("should parse")
    }

    fn config() -> UpdateConfig {
        UpdateConfig {
            url: "http://erp:8069".to_string(),
            db: "prod".to_string(),
            username: "admin".to_string(),
            password: "from-file".to_string(),
            modules_to_update: vec!["sale".to_string()],
            language_to_update: String::new(),
            source_path: PathBuf::from("/etc/erp/prod.json"),
        }
    }

    #[test]
    fn positional_config_and_password() {
        let cli = parse(&["odoo-remote-update", "prod.json", "s3cret"]);
        assert_eq!(cli.config.as_deref(), Some(Path::new("prod.json")));
        assert_eq!(cli.password.as_deref(), Some("s3cret"));
        assert!(!cli.yes);
        assert!(!cli.interactive);
        assert_eq!(cli.wait(), Duration::ZERO);
    }

    #[test]
    fn no_arguments_is_accepted() {
        let cli = parse(&["odoo-remote-update"]);
        assert!(cli.config.is_none());
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = parse(&[
            "odoo-remote-update",
            "prod.json",
            "s3cret",
            "-m",
            "stock",
            "--module",
            "account",
            "-l",
            "vi_VN (Vietnamese)",
        ]);
        let mut config = config();

        cli.apply_to(&mut config);

        assert_eq!(config.password, "s3cret");
        assert_eq!(config.modules_to_update, vec!["stock", "account"]);
        assert_eq!(config.language_code(), Some("vi_VN"));
    }

    #[test]
    fn missing_overrides_keep_config_values() {
        let cli = parse(&["odoo-remote-update", "prod.json"]);
        let mut config = config();

        cli.apply_to(&mut config);

        assert_eq!(config, self::config());
    }

    #[test]
    fn log_dir_flag_sets_log_location() {
        let cli = parse(&["odoo-remote-update", "prod.json", "--log-dir", "/tmp/erp-logs"]);
        let store = cli.log_store(&config());
        assert_eq!(store.dir(), Path::new("/tmp/erp-logs"));
    }

    #[test]
    fn wait_and_yes_flags() {
        let cli = parse(&["odoo-remote-update", "-y", "-w", "30", "prod.json"]);
        assert!(cli.yes);
        assert_eq!(cli.wait(), Duration::from_secs(30));
    }

    #[test]
    fn usage_mentions_both_invocations() {
        colored::control::set_override(false);
        let text = usage();
        assert!(text.contains("odoo-remote-update /path/to/config.json or to overwrite password"));
        assert!(text.contains("my-password"));
    }
}
