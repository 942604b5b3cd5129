use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_FILTER: &str = "homestock=info,sqlx=warn";
pub const DEFAULT_LOG_MAX_SIZE_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_LOG_MAX_FILES: usize = 5;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
    pub dir: Option<PathBuf>,
    pub max_size_bytes: usize,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
            dir: None,
            max_size_bytes: DEFAULT_LOG_MAX_SIZE_BYTES,
            max_files: DEFAULT_LOG_MAX_FILES,
        }
    }
}

/// Twilio credentials. The messenger is disabled unless sid, token and at
/// least one sender are present.
#[derive(Debug, Clone, Default)]
pub struct MessengerConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub sms_from: Option<String>,
    pub whatsapp_from: Option<String>,
}

impl MessengerConfig {
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some()
            && self.auth_token.is_some()
            && (self.sms_from.is_some() || self.whatsapp_from.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind: SocketAddr,
    pub log: LogConfig,
    pub messenger: MessengerConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let log = LogConfig {
            filter: var("HOMESTOCK_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json: var("HOMESTOCK_LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            dir: var("HOMESTOCK_LOG_DIR").map(PathBuf::from),
            max_size_bytes: try_load("HOMESTOCK_LOG_MAX_SIZE_BYTES", DEFAULT_LOG_MAX_SIZE_BYTES),
            max_files: try_load("HOMESTOCK_LOG_MAX_FILES", DEFAULT_LOG_MAX_FILES),
        };

        let default_bind = SocketAddr::from(([0, 0, 0, 0], 3000));
        Self {
            db_path: var("HOMESTOCK_DB")
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            bind: try_load("HOMESTOCK_BIND", default_bind),
            log,
            messenger: MessengerConfig {
                account_sid: var("TWILIO_ACCOUNT_SID"),
                auth_token: var("TWILIO_AUTH_TOKEN"),
                sms_from: var("TWILIO_FROM"),
                whatsapp_from: var("TWILIO_WHATSAPP_FROM"),
            },
        }
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("homestock")
        .join("homestock.sqlite3")
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        None => {
            info!(target: "homestock", "{key} not set, using default: {default}");
            default
        }
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!(target: "homestock", "Invalid {key} value {raw:?}: {e}; using default: {default}");
            default
        }),
    }
}
