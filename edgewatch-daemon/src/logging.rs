//! Logging initialization for edgewatch-daemon.
//!
//! Configures `tracing-subscriber` based on the `[general]` section
//! of `EdgewatchConfig`. Supports JSON structured logging and
//! human-readable pretty format.
//!
//! Diagnostic tracing is separate from the audit log kept by the
//! system log store.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use edgewatch_core::config::GeneralConfig;

/// Dependencies that are too chatty at the daemon's own level.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "metrics_exporter_prometheus=warn"];

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
/// `RUST_LOG` takes precedence over `config.log_level`.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines (default for production)
/// * `"pretty"` - Human-readable colored output (for development)
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(config, rust_log.as_deref())?;

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)
                })?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)
                })?;
        }
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    }

    Ok(())
}

/// Build the level filter.
///
/// A non-empty, parseable `rust_log` wins. Otherwise `config.log_level`
/// applies to everything except [`QUIET_TARGETS`].
fn build_filter(config: &GeneralConfig, rust_log: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.map(str::trim).filter(|d| !d.is_empty())
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return Ok(filter);
    }

    let mut directives = vec![config.log_level.as_str()];
    directives.extend_from_slice(QUIET_TARGETS);
    EnvFilter::try_new(directives.join(","))
        .map_err(|e| anyhow::anyhow!("invalid log level '{}': {}", config.log_level, e))
}
