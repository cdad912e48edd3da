//! Tracing setup for the job binaries.
//!
//! Every job log entry is mirrored as a tracing event under
//! [`JOB_LOG_TARGET`]. A binary that prints the job log itself should turn
//! that mirror off, otherwise each entry shows up twice. `RUST_LOG` always
//! wins and can switch it back on.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Target of the events mirroring job log entries.
pub const JOB_LOG_TARGET: &str = "evolve::job_log";

/// How the global subscriber is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingOptions {
    /// Newline-delimited JSON instead of text
    pub json: bool,
    /// Default verbosity when `RUST_LOG` is not set
    pub level: Level,
    /// Emit job log entries as tracing events
    pub mirror_job_log: bool,
}

impl TracingOptions {
    pub fn new(json: bool, level: Level) -> Self {
        Self {
            json,
            level,
            mirror_job_log: true,
        }
    }

    /// Drop the job log mirror (the caller renders the log itself).
    pub fn without_job_log(mut self) -> Self {
        self.mirror_job_log = false;
        self
    }

    /// Filter directives used when `RUST_LOG` is not set.
    pub fn default_directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        if self.mirror_job_log {
            level
        } else {
            format!("{level},{JOB_LOG_TARGET}=off")
        }
    }
}

/// Install the global subscriber. Output goes to stderr so stdout stays free
/// for the job log. Later calls are ignored.
pub fn init_tracing(options: TracingOptions) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_directives()));

    if options.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .flatten_event(true),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_mirror_job_log() {
        let options = TracingOptions::new(false, Level::INFO);
        assert!(options.mirror_job_log);
        assert_eq!(options.default_directives(), "info");
    }

    #[test]
    fn test_default_directives_silence_job_log() {
        let options = TracingOptions::new(true, Level::WARN).without_job_log();
        assert_eq!(options.default_directives(), "warn,evolve::job_log=off");
        EnvFilter::try_new(options.default_directives()).unwrap();
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(TracingOptions::new(false, Level::WARN));
        init_tracing(TracingOptions::new(true, Level::DEBUG).without_job_log());
    }
}
