//! Fault log files
//!
//! Raw fault text of failed upgrade or translation calls is kept in
//! `<config-stem>_<kind>_<unix-ts>.txt` files next to the program, so the
//! report itself can stay one line per module.

use anyhow::{Context, Result};
use log::info;
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    /// Module upgrade faults and unexpected run failures
    Execute,
    Translation,
}

impl LogKind {
    fn suffix(self) -> &'static str {
        match self {
            LogKind::Execute => "execute_log_",
            LogKind::Translation => "trans_log_",
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogStore {
    dir: PathBuf,
    stem: String,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    /// `logs` next to the executable, or `./logs` if that cannot be resolved
    pub fn default_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("logs")))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `attempt` 0 is the plain name, later attempts get a `_<n>` suffix
    pub fn file_name(&self, kind: LogKind, timestamp: i64, attempt: u32) -> String {
        match attempt {
            0 => format!("{}_{}{timestamp}.txt", self.stem, kind.suffix()),
            n => format!("{}_{}{timestamp}_{n}.txt", self.stem, kind.suffix()),
        }
    }

    /// Write `text` to a new log file and return its path
    ///
    /// Never overwrites: files written within the same second get numbered.
    pub fn write(&self, kind: LogKind, text: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create log directory {}", self.dir.display()))?;

        let timestamp = chrono::Utc::now().timestamp();
        let content = unescape_newlines(text);

        let mut attempt = 0;
        loop {
            let path = self.dir.join(self.file_name(kind, timestamp, attempt));

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    attempt += 1;
                    continue;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to create log file {}", path.display()));
                }
            };

            file.write_all(content.as_bytes())
                .with_context(|| format!("failed to write log file {}", path.display()))?;

            info!("wrote {kind:?} log: {}", path.display());

            return Ok(path);
        }
    }
}

/// Turn escaped `\n` sequences of fault text back into line breaks
pub fn unescape_newlines(text: &str) -> String {
    text.replace("\\\\n", "\n").replace("\\n", "\n")
}
