use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Prefix of environment overrides, e.g. `SWITCHYARD_ROUTES__WATCH=true`.
pub const ENV_PREFIX: &str = "SWITCHYARD";

/// Load configuration from a file, then apply `SWITCHYARD_*` environment
/// overrides. Supports TOML, YAML, JSON and INI, chosen by extension.
///
/// A relative `routes.directory` is resolved against the config file's
/// directory.
pub fn load_config(config_path: impl AsRef<Path>) -> Result<GatewayConfig> {
    let config_path = config_path.as_ref();

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let mut gateway_config: GatewayConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    let relative = gateway_config.routes.directory.is_relative();
    if let Some(base) = config_path.parent().filter(|_| relative) {
        gateway_config.routes.directory = base.join(&gateway_config.routes.directory);
    }

    Ok(gateway_config)
}

/// Starter configuration written by `switchyard init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# Address the gateway listens on
listen_addr = "127.0.0.1:8080"
# Grace period for in-flight requests on shutdown
shutdown_timeout = "30s"

[routes]
# One route per file; relative to this file
directory = "routes"
extension = "json"
# Seconds, a duration such as "500ms", or "disabled"
scan_interval = "10s"
# Also rescan on file system notifications
watch = false

[admin]
enabled = true
prefix = "/_router"

[logging]
level = "info"
json = false

[client]
request_timeout = "30s"

[default_handler]
status = 404
body = "No route matched"
"#;
