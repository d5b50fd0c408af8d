//! Configuration data structures for the gateway process.
//!
//! These types map to TOML (also JSON / YAML) configuration files and include
//! defaults so that a minimal config only names what differs.
use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::core::scanner::DEFAULT_SCAN_INTERVAL;

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub client: ClientConfig,
    /// Response for requests no route accepts; `404 Not Found` when absent.
    #[serde(default)]
    pub default_handler: Option<DefaultHandlerConfig>,
    /// Time in-flight requests get to finish on shutdown.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde_compat")]
    pub shutdown_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            routes: RoutesConfig::default(),
            admin: AdminConfig::default(),
            logging: LoggingConfig::default(),
            client: ClientConfig::default(),
            default_handler: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Where route files live and how they are picked up.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RoutesConfig {
    /// Directory holding one file per route.
    pub directory: PathBuf,
    /// Route file extension, without the dot.
    pub extension: String,
    pub scan_interval: ScanInterval,
    /// Rescan as soon as the file system reports a change.
    pub watch: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("config/routes"),
            extension: "json".to_string(),
            scan_interval: ScanInterval::Every(DEFAULT_SCAN_INTERVAL),
            watch: false,
        }
    }
}

/// Period of the directory scan: `"disabled"`, whole seconds, or a
/// humantime string such as `"2s"` or `"1m 30s"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScanInterval", into = "RawScanInterval")]
pub enum ScanInterval {
    Disabled,
    Every(Duration),
}

impl ScanInterval {
    pub fn period(&self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Every(period) => Some(*period),
        }
    }
}

impl fmt::Display for ScanInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Every(period) => write!(f, "{}", humantime::format_duration(*period)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawScanInterval {
    Seconds(i64),
    Text(String),
}

impl TryFrom<RawScanInterval> for ScanInterval {
    type Error = String;

    fn try_from(raw: RawScanInterval) -> Result<Self, Self::Error> {
        let period = match raw {
            RawScanInterval::Seconds(seconds) => seconds_to_period(seconds)?,
            RawScanInterval::Text(text) if text.eq_ignore_ascii_case("disabled") => {
                return Ok(Self::Disabled);
            }
            RawScanInterval::Text(text) => match text.trim().parse::<i64>() {
                Ok(seconds) => seconds_to_period(seconds)?,
                Err(_) => humantime::parse_duration(&text)
                    .map_err(|e| format!("invalid scan interval '{text}': {e}"))?,
            },
        };
        if period.is_zero() {
            return Err("scan interval must be positive".to_string());
        }
        Ok(Self::Every(period))
    }
}

fn seconds_to_period(seconds: i64) -> Result<Duration, String> {
    u64::try_from(seconds)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("scan interval must be positive, got {seconds}"))
}

impl From<ScanInterval> for RawScanInterval {
    fn from(interval: ScanInterval) -> Self {
        Self::Text(interval.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    /// Path prefix of the admin endpoints.
    pub prefix: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "/_router".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"switchyard=debug,info"`.
    pub level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Outbound client shared by every route (`HttpClient` in the root heap).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "humantime_serde_compat")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DefaultHandlerConfig {
    #[serde(default = "default_status_code")]
    pub status: u16,
    #[serde(default)]
    pub body: Option<String>,
}

fn default_status_code() -> u16 {
    404
}

/// Durations as humantime strings (`"30s"`), also accepting whole seconds.
mod humantime_serde_compat {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
            Raw::Text(text) => match text.trim().parse::<u64>() {
                Ok(seconds) => Ok(Duration::from_secs(seconds)),
                Err(_) => humantime::parse_duration(&text).map_err(D::Error::custom),
            },
        }
    }
}
