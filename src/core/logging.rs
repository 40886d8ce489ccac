//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A startup summary of the notification configuration

use anyhow::Result;
use secrecy::ExposeSecret;
use simplelog::*;
use std::fs::File;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs how operator notifications are wired at application startup.
///
/// A missing token or operator chat is not fatal: orders keep moving, the
/// operator just never sees them. This makes that state loud in the log.
pub fn log_notification_configuration(config: &crate::core::config::Config) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("📨 Notification Configuration Check");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    match &config.bot_token {
        Some(token) => log::info!("✅ BOT_TOKEN: set ({})", mask_token(token.expose_secret())),
        None => log::error!("❌ BOT_TOKEN: not set, all Telegram calls are disabled"),
    }

    match config.operator_chat_id {
        Some(chat_id) => log::info!("✅ OPERATOR_CHAT_ID: {}", chat_id),
        None => log::error!("❌ OPERATOR_CHAT_ID: not set, payment receipts will not reach the operator"),
    }

    if config.notifications_enabled() {
        log::info!("✅ Operator notifications: enabled");
    } else {
        log::warn!("⚠️ Operator notifications: disabled, orders still move but nobody is prompted");
    }

    if let Some(url) = &config.bot_api_url {
        log::info!("Using custom Bot API URL: {}", url);
    }

    match &config.media_base_url {
        Some(url) => log::info!("✅ MEDIA_BASE_URL: {}", url),
        None => log::warn!("⚠️  MEDIA_BASE_URL: not set, relative receipt paths will be sent as text only"),
    }

    if config.webhook_secret.is_none() {
        log::warn!("⚠️  WEBHOOK_SECRET: not set, webhook deliveries are not authenticated");
    }

    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Keep the bot id prefix, hide the secret part.
fn mask_token(token: &str) -> String {
    match token.split_once(':') {
        Some((bot_id, _)) => format!("{}:***", bot_id),
        None => "***".to_string(),
    }
}
