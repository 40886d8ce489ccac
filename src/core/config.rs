//! Configuration constants and the runtime [`Config`] value
//!
//! Constants live in small submodules; the per-deployment values (token,
//! operator chat, paths) are read once at startup by [`Config::from_env`]
//! and passed down explicitly.

use secrecy::SecretString;
use std::env;
use std::time::Duration;

/// Network configuration
pub mod network {
    use super::Duration;

    /// Timeout for a single Bot API call (in seconds)
    /// A timed-out call counts as a failed delivery and is never retried.
    pub const TELEGRAM_TIMEOUT_SECS: u64 = 10;

    /// Bot API request timeout duration
    pub fn telegram_timeout() -> Duration {
        Duration::from_secs(TELEGRAM_TIMEOUT_SECS)
    }

    /// Default port for the webhook + collaborator API server
    pub const DEFAULT_WEB_PORT: u16 = 8080;
}

/// Checkout configuration
pub mod checkout {
    /// Whether a map point is mandatory when placing an order
    pub const REQUIRE_MAP_POINT: bool = true;

    /// Maximum stored length of a phone number
    pub const MAX_PHONE_LEN: usize = 32;

    /// Maximum stored length of a delivery address
    pub const MAX_ADDRESS_LEN: usize = 255;
}

/// Rendering configuration
pub mod render {
    /// Currency label appended to every amount
    pub const CURRENCY: &str = "сум";

    /// Telegram caps photo captions at 1024 characters
    pub const CAPTION_LIMIT: usize = 1024;

    /// Telegram caps message text at 4096 characters
    pub const MESSAGE_LIMIT: usize = 4096;

    /// Escaped characters the phone may take in a receipt caption
    pub const CAPTION_PHONE_BUDGET: usize = 64;

    /// Escaped characters the operator note may take in a prompt
    pub const NOTE_BUDGET: usize = 1500;
}

/// Header Telegram attaches to webhook deliveries when a secret is registered
pub const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Runtime configuration for one deployment.
#[derive(Debug)]
pub struct Config {
    /// Bot token; `None` disables every outbound Telegram call
    pub bot_token: Option<SecretString>,
    /// Chat where operator prompts are posted
    pub operator_chat_id: Option<i64>,
    /// Custom Bot API server (local `telegram-bot-api`, tests)
    pub bot_api_url: Option<url::Url>,
    /// SQLite database file
    pub database_path: String,
    /// Log file
    pub log_file_path: String,
    /// Port for the HTTP server
    pub web_port: u16,
    /// Public prefix for receipt refs that are relative paths (e.g. `/media/payments/x.jpg`)
    pub media_base_url: Option<url::Url>,
    /// Expected value of the webhook secret-token header
    pub webhook_secret: Option<String>,
    /// Reject checkouts without coordinates
    pub require_map_point: bool,
    /// Per-call Bot API timeout
    pub telegram_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            operator_chat_id: None,
            bot_api_url: None,
            database_path: "database.sqlite".to_string(),
            log_file_path: "app.log".to_string(),
            web_port: network::DEFAULT_WEB_PORT,
            media_base_url: None,
            webhook_secret: None,
            require_map_point: checkout::REQUIRE_MAP_POINT,
            telegram_timeout: network::telegram_timeout(),
        }
    }
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// Malformed optional values are logged and ignored rather than aborting
    /// startup; a missing token only disables notifications.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bot_token = env::var("BOT_TOKEN")
            .or_else(|_| env::var("TELOXIDE_TOKEN"))
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        Self {
            bot_token,
            operator_chat_id: parse_var("OPERATOR_CHAT_ID"),
            bot_api_url: parse_url_var("BOT_API_URL"),
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            log_file_path: log_file_path(),
            web_port: parse_var("WEB_PORT").unwrap_or(defaults.web_port),
            media_base_url: parse_url_var("MEDIA_BASE_URL"),
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            require_map_point: parse_bool_var("REQUIRE_MAP_POINT").unwrap_or(defaults.require_map_point),
            telegram_timeout: parse_var::<u64>("TELEGRAM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.telegram_timeout),
        }
    }

    /// True when outbound notifications can actually be delivered.
    pub fn notifications_enabled(&self) -> bool {
        self.bot_token.is_some() && self.operator_chat_id.is_some()
    }
}

/// Log file location, needed before the rest of the config is read.
pub fn log_file_path() -> String {
    env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid {}={:?}", name, raw);
            None
        }
    }
}

fn parse_url_var(name: &str) -> Option<url::Url> {
    let raw = env::var(name).ok().filter(|s| !s.trim().is_empty())?;
    match url::Url::parse(raw.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            log::warn!("Ignoring invalid {}: {}", name, e);
            None
        }
    }
}

fn parse_bool_var(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    parse_bool(&raw).or_else(|| {
        log::warn!("Ignoring invalid {}={:?}", name, raw);
        None
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
