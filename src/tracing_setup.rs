//! Subscriber installation for the `color-daq` binary.
//!
//! The library crates only emit events. The binary installs one fmt layer in the
//! configured [`LogFormat`] behind an [`EnvFilter`]; `RUST_LOG` overrides
//! `application.log_level` when set. Thread names are always printed so events from
//! the acquisition thread stand out from publisher tasks.

use crate::config::{LogFormat, TrackerConfig};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    /// Line format
    pub format: LogFormat,
    /// Log span open/close
    pub span_events: bool,
    /// Print source file and line
    pub source_location: bool,
    /// Colors (pretty format only)
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl TracingConfig {
    /// Options at `level`, pretty output with colors.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: LogFormat::Pretty,
            span_events: false,
            source_location: false,
            ansi: true,
        }
    }

    /// Options from the `[application]` section.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, String> {
        Ok(Self::new(parse_log_level(&config.application.log_level)?)
            .format(config.application.log_format))
    }

    /// Set the line format.
    #[must_use]
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Log span open/close events.
    #[must_use]
    pub fn span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Enable colors.
    #[must_use]
    pub fn ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_span_events(spans)
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_thread_names(true);

        let filter = self.filter();
        match self.format {
            LogFormat::Pretty => base.pretty().with_ansi(self.ansi).with_filter(filter).boxed(),
            LogFormat::Compact => base.compact().with_ansi(false).with_filter(filter).boxed(),
            LogFormat::Json => base.json().with_filter(filter).boxed(),
        }
    }
}

/// Install the subscriber described by `[application]`.
pub fn init_from_config(config: &TrackerConfig) -> Result<(), String> {
    init(TracingConfig::from_config(config)?)
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(config: TracingConfig) -> Result<(), String> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    tracing_subscriber::registry()
        .with(config.layer())
        .try_init()
        .map_err(|e| format!("Failed to initialize tracing: {e}"))
}

fn parse_log_level(level: &str) -> Result<Level, String> {
    Level::from_str(level).map_err(|_| {
        format!("Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Ok(Level::TRACE));
        assert_eq!(parse_log_level("warn"), Ok(Level::WARN));
        assert_eq!(parse_log_level("Debug"), Ok(Level::DEBUG));
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_from_tracker_config() {
        let mut config = TrackerConfig::default();
        config.application.log_level = "debug".to_string();
        config.application.log_format = LogFormat::Compact;

        let tracing_config = TracingConfig::from_config(&config).unwrap();
        assert_eq!(tracing_config.level, Level::DEBUG);
        assert_eq!(tracing_config.format, LogFormat::Compact);
    }

    #[test]
    fn test_bad_level_in_config() {
        let mut config = TrackerConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(init_from_config(&config).unwrap_err().contains("verbose"));
    }

    #[test]
    fn test_builder() {
        let config = TracingConfig::new(Level::WARN)
            .format(LogFormat::Json)
            .span_events(true)
            .ansi(false);

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert!(!config.ansi);
    }

    #[test]
    fn test_init_twice() {
        assert!(init(TracingConfig::new(Level::ERROR)).is_ok());
        assert!(init(TracingConfig::new(Level::ERROR)).is_ok());
    }
}
