// 📝 Logging - csv_import.log plus the console reporter
// Log lines carry the run's operation id through the root span opened by the caller.
// The Reporter prints user-facing lines (prefixed with the configured identifier)
// and mirrors them into the log.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "csv_import.log";

/// Install the global subscriber. Keep the returned guard alive until the
/// run ends so buffered lines are flushed.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

// ============================================================================
// REPORTER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Reporter {
    identifier: Option<String>,
    console: bool,
}

impl Reporter {
    pub fn new(identifier: Option<String>) -> Self {
        Reporter {
            identifier,
            console: true,
        }
    }

    /// Reporter that only writes to the log
    pub fn log_only(identifier: Option<String>) -> Self {
        Reporter {
            identifier,
            console: false,
        }
    }

    pub fn format(&self, message: &str) -> String {
        match &self.identifier {
            Some(id) => format!("{}: {}", id, message),
            None => message.to_string(),
        }
    }

    pub fn line(&self, message: &str) {
        let text = self.format(message);
        if self.console {
            println!("{}", text);
        }
        info!("{}", text);
    }

    pub fn lines<I, S>(&self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for message in messages {
            self.line(message.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_prefix() {
        let reporter = Reporter::new(Some("facility-east".to_string()));
        assert_eq!(reporter.format("saving batch 1"), "facility-east: saving batch 1");

        let reporter = Reporter::new(None);
        assert_eq!(reporter.format("saving batch 1"), "saving batch 1");
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        // another test may already own the global subscriber
        let _ = init(&log_dir);
        assert!(log_dir.exists());
    }
}
