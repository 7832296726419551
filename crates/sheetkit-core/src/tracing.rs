//! Subscriber setup for programs built on the sheetkit crates.
//!
//! The libraries only emit events. A binary calls [`init_tracing`] once:
//!
//! ```ignore
//! use sheetkit_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli_debug())?;
//! ```
//!
//! The filter comes from the config alone; `RUST_LOG` is ignored. Events are
//! written to stderr, which stays visible while stdout is silenced.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Targets covered by the default directive.
const TARGET_PREFIX: &str = "sheetkit";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a global tracing subscriber is already installed: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid tracing filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// How events are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, for reading by eye.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Settings for [`init_tracing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for `sheetkit*` targets when `filter` is unset.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Add file and line to each event.
    pub show_location: bool,
    /// Add a timestamp to each event.
    pub show_time: bool,
    /// Complete `EnvFilter` directive; replaces the level-based default.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Compact,
            show_location: false,
            show_time: true,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Debug level, compact lines with locations and no timestamps.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            show_location: true,
            show_time: false,
            ..Self::default()
        }
    }

    /// JSON lines for unattended runs.
    #[must_use]
    pub fn service() -> Self {
        Self {
            format: TracingOutputFormat::Json,
            show_location: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// The directive that [`init_tracing`] installs.
    pub fn directive(&self) -> String {
        self.filter
            .clone()
            .unwrap_or_else(|| format!("{}={}", TARGET_PREFIX, self.level))
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        Ok(EnvFilter::try_new(self.directive())?)
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(self.show_location)
            .with_line_number(self.show_location);

        match (self.format, self.show_time) {
            (TracingOutputFormat::Pretty, true) => base.pretty().boxed(),
            (TracingOutputFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (TracingOutputFormat::Compact, true) => base.compact().boxed(),
            (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
            (TracingOutputFormat::Json, true) => base.json().boxed(),
            (TracingOutputFormat::Json, false) => base.json().without_time().boxed(),
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// Fails if the filter does not parse or a subscriber is already set.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    let subscriber = tracing_subscriber::registry().with(config.fmt_layer().with_filter(filter));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_covers_sheetkit_targets() {
        let config = TracingConfig::default();
        assert_eq!(config.format, TracingOutputFormat::Compact);
        assert_eq!(config.directive(), "sheetkit=INFO");
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn presets() {
        let cli = TracingConfig::cli_debug();
        assert_eq!(cli.directive(), "sheetkit=DEBUG");
        assert!(!cli.show_time);

        let service = TracingConfig::service();
        assert_eq!(service.format, TracingOutputFormat::Json);
        assert_eq!(service.level, Level::INFO);
    }

    #[test]
    fn explicit_filter_wins_over_level() {
        let config = TracingConfig::default()
            .with_level(Level::WARN)
            .with_filter("sheetkit_google=trace");
        assert_eq!(config.directive(), "sheetkit_google=trace");
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let config = TracingConfig::default().with_filter("sheetkit=loudest");
        assert!(matches!(init_tracing(config), Err(TracingError::Filter(_))));
    }
}
