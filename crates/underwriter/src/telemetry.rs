use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{directive}' from {origin}")]
    Filter {
        directive: String,
        origin: FilterOrigin,
        #[source]
        source: ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Where the active filter directive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOrigin {
    RustLog,
    AppLogLevel,
}

impl std::fmt::Display for FilterOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FilterOrigin::RustLog => "RUST_LOG",
            FilterOrigin::AppLogLevel => "APP_LOG_LEVEL",
        })
    }
}

/// Filter for the underwriting services. A non-blank `RUST_LOG` overrides the configured level
/// and is not silently replaced when it fails to parse.
pub fn filter_for(
    config: &TelemetryConfig,
    rust_log: Option<&str>,
) -> Result<EnvFilter, TelemetryError> {
    let (directive, origin) = match rust_log.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => (value, FilterOrigin::RustLog),
        None => (config.log_level.trim(), FilterOrigin::AppLogLevel),
    };

    EnvFilter::try_new(directive).map_err(|source| TelemetryError::Filter {
        directive: directive.to_string(),
        origin,
        source,
    })
}

/// Install the global subscriber: compact lines, no ANSI colours, no targets.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = filter_for(config, rust_log.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
