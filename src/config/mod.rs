pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{DEFAULT_CONFIG_TOML, load_config};
pub use models::*;
pub use validation::{GatewayConfigValidator, ValidationError, ValidationResult};
