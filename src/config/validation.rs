#![allow(clippy::collapsible_if)]

use std::net::SocketAddr;

use http::StatusCode;
use regex::Regex;
use tracing_subscriber::EnvFilter;

use crate::config::models::{AdminConfig, GatewayConfig, RoutesConfig};

pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Debug, thiserror::Error, Clone)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Checks a loaded [`GatewayConfig`] before anything is started.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the whole configuration, reporting every problem at once.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }
        errors.extend(Self::validate_routes(&config.routes));
        if let Err(e) = Self::validate_admin(&config.admin) {
            errors.push(e);
        }
        if let Err(e) = EnvFilter::try_new(&config.logging.level) {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            });
        }
        if config.client.request_timeout.is_zero() {
            errors.push(ValidationError::InvalidField {
                field: "client.request_timeout".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if let Some(default_handler) = &config.default_handler {
            if StatusCode::from_u16(default_handler.status).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "default_handler.status".to_string(),
                    message: format!("{} is not an HTTP status code", default_handler.status),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "listen_addr".to_string(),
            });
        }
        address
            .parse::<SocketAddr>()
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })
    }

    fn validate_routes(routes: &RoutesConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if routes.directory.as_os_str().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes.directory".to_string(),
            });
        } else if routes.directory.is_file() {
            errors.push(ValidationError::InvalidField {
                field: "routes.directory".to_string(),
                message: format!("{} is a file", routes.directory.display()),
            });
        }

        let extension = routes.extension.as_str();
        if extension.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes.extension".to_string(),
            });
        } else if extension.contains(['.', '/', '\\']) {
            errors.push(ValidationError::InvalidField {
                field: "routes.extension".to_string(),
                message: format!("'{extension}' must not contain dots or separators"),
            });
        }
        errors
    }

    fn validate_admin(admin: &AdminConfig) -> ValidationResult<()> {
        if !admin.enabled {
            return Ok(());
        }
        let pattern = Regex::new(r"^(/[A-Za-z0-9._~-]+)+$").map_err(|e| {
            ValidationError::ValidationFailed {
                message: e.to_string(),
            }
        })?;
        if pattern.is_match(&admin.prefix) {
            Ok(())
        } else {
            Err(ValidationError::InvalidField {
                field: "admin.prefix".to_string(),
                message: format!(
                    "'{}' must start with '/', have no trailing '/' and use URL-safe segments",
                    admin.prefix
                ),
            })
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
