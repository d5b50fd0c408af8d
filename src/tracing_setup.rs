use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::models::LoggingConfig, ports::handler::Context};

/// Initialize logging from the `[logging]` section.
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .wrap_err_with(|| format!("Invalid log level: {}", config.level))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let registry = Registry::default().with(env_filter);
    let result = if config.json {
        registry
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        registry.with(fmt_layer.pretty()).try_init()
    };
    result.wrap_err("Failed to install the global tracing subscriber")?;

    tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

/// Span covering one request's trip through the router.
pub fn request_span(context: &Context, method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        request.id = %context.id(),
        http.method = method,
        http.path = path,
        route.id = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
    )
}

/// Span covering one reload pass.
pub fn reload_span(trigger: &'static str) -> tracing::Span {
    tracing::info_span!("reload", trigger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        // SAFETY: tests in this module do not read RUST_LOG concurrently.
        unsafe { std::env::remove_var("RUST_LOG") };
        let config = LoggingConfig {
            level: "switchyard=verbose".to_string(),
            json: true,
        };
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_request_span() {
        let span = request_span(&Context::new(), "GET", "/api/test");
        assert_eq!(span.metadata().map(|m| m.name()), Some("request"));
    }

    #[test]
    fn test_reload_span() {
        let span = reload_span("scan");
        assert_eq!(span.metadata().map(|m| m.name()), Some("reload"));
    }
}
