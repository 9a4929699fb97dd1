//! Tracing subscriber setup.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_level(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Progress bars replace per-file log lines at warn and quieter.
    pub fn shows_progress(self) -> bool {
        matches!(self, LogLevel::Warn | LogLevel::Error)
    }
}

/// Install the global subscriber on stderr. `RUST_LOG` wins over `level`.
pub fn init(level: LogLevel, color: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.as_level().into()));
    // Already installed (tests, embedding): keep the existing one
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(color)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
