//! 🍞 Logging -- one log file, one console, opened once, closed on the way out.
//!
//! The log file is the only thing storyview leaves behind besides the email.
//! When somebody asks in April why March's report never showed up, this file
//! is the answer. So it gets flushed and synced on every exit path, via a
//! [`LogGuard`] the binary holds for the whole run.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 🔧 Where the breadcrumbs go.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// 📁 Append-only log file. Always on.
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// 🖥️ Mirror to stderr as well.
    #[serde(default = "default_console")]
    pub console: bool,
    /// 🔍 `EnvFilter` directive. `RUST_LOG` wins if set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_file_name() -> String {
    "storyview.log".to_string()
}

fn default_console() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            console: default_console(),
            filter: default_filter(),
        }
    }
}

/// 🔒 Keeps the log file handle; flushes and syncs it on `close` (or drop).
#[derive(Debug)]
pub struct LogGuard {
    file: Option<Arc<File>>,
}

impl LogGuard {
    /// 🗑️ Sync the file to disk. Call before `process::exit`, which skips destructors.
    pub fn close(mut self) {
        self.sync();
    }

    fn sync(&mut self) {
        if let Some(file) = self.file.take() {
            // -- 💀 nowhere left to report a failed sync; the log IS the report channel
            let _ = file.sync_all();
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.sync();
    }
}

/// 📁 Open (or create) the log file for appending.
pub(crate) fn open_log_file(path: &Path) -> anyhow::Result<Arc<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| {
            format!(
                "💀 The log file '{}' could not be opened. Without it, future-you gets no breadcrumbs.",
                path.display()
            )
        })?;
    Ok(Arc::new(file))
}

/// 📡 Install the global subscriber: env filter, file layer, optional console layer.
pub fn init(config: &LoggingConfig) -> anyhow::Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .with_context(|| format!("💀 '{}' is not a log filter tracing understands", config.filter))?;

    let file = open_log_file(Path::new(&config.file_name))?;

    let file_layer = fmt::layer().with_ansi(false).with_writer(file.clone());
    let console_layer = config
        .console
        .then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("💀 A tracing subscriber was already installed. Someone got here first.")?;

    Ok(LogGuard { file: Some(file) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn the_one_where_defaults_log_to_a_file_and_the_console() {
        let config = LoggingConfig::default();
        assert_eq!(config.file_name, "storyview.log");
        assert!(config.console);
        assert_eq!(config.filter, "info");
    }

    #[test]
    fn the_one_where_the_log_file_appends_and_survives_the_guard() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("storyview.log");
        std::fs::write(&path, "last month's run\n")?;

        let file = open_log_file(&path)?;
        writeln!(&*file, "this month's run")?;
        LogGuard { file: Some(file) }.close();

        let contents = std::fs::read_to_string(&path)?;
        assert_eq!(contents, "last month's run\nthis month's run\n");
        Ok(())
    }

    #[test]
    fn the_one_where_a_missing_directory_is_reported() {
        let err = open_log_file(Path::new("/definitely/not/a/real/dir/storyview.log"))
            .expect_err("💀 a log file in a missing directory cannot open");
        assert!(format!("{err:#}").contains("could not be opened"));
    }
}
