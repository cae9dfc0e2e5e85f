//! Structured logging setup
//!
//! tendist emits `tracing` events for topology enumeration and rejection,
//! mapping selection, plan construction, executor sweeps and
//! redistribution. This module installs a subscriber for them.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directive (e.g. `RUST_LOG=tendist_planner=debug`)
//! - `TENDIST_LOG_FORMAT`: `pretty` (default), `json` or `compact`
//!
//! # Example
//!
//! ```ignore
//! use tendist_comm::tracing_support::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::default())?;
//! ```

use anyhow::Result;
#[cfg(feature = "subscriber")]
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line human-readable output
    Pretty,
    /// One JSON object per event
    Json,
    /// One line per event
    Compact,
}

impl TracingFormat {
    /// Parse from string; unknown values fall back to `Pretty`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => TracingFormat::Json,
            "compact" => TracingFormat::Compact,
            _ => TracingFormat::Pretty,
        }
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub format: TracingFormat,
    /// Filter directive, e.g. `tendist_exec=debug,info`
    pub filter: String,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        let format = std::env::var("TENDIST_LOG_FORMAT")
            .map(|s| TracingFormat::parse(&s))
            .unwrap_or(TracingFormat::Pretty);
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "tendist=info,warn".to_string());

        Self {
            format,
            filter,
            with_ansi: true,
            with_target: true,
            // ranks run as named threads under ThreadComm
            with_thread_names: true,
        }
    }
}

impl TracingConfig {
    /// Override the output format
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Override the filter directive
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

/// Install a global subscriber. Call once at startup.
///
/// Fails if the filter does not parse or a global subscriber is already set.
#[cfg(feature = "subscriber")]
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let base = fmt::layer()
        .with_target(config.with_target)
        .with_thread_names(config.with_thread_names);

    let layer = match config.format {
        TracingFormat::Pretty => base.pretty().with_ansi(config.with_ansi).with_filter(filter).boxed(),
        TracingFormat::Json => base.json().with_filter(filter).boxed(),
        TracingFormat::Compact => base.compact().with_ansi(config.with_ansi).with_filter(filter).boxed(),
    };
    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}

/// No-op when the `subscriber` feature is disabled
#[cfg(not(feature = "subscriber"))]
pub fn init_tracing(_config: TracingConfig) -> Result<()> {
    Ok(())
}
