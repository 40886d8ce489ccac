//! Messaging gateway: every outbound call to the Telegram Bot API.
//!
//! Each call is independently fallible and reports a [`DeliveryError`]
//! instead of failing the caller. Notifications are best-effort: by the time
//! anything here runs, the order change is already committed.
//!
//! Two implementations of [`Messenger`]:
//! - [`TelegramGateway`]: teloxide `Bot` over a reqwest client with a
//!   bounded timeout, no automatic retries
//! - [`DisabledGateway`]: used when no bot token is configured

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::ClientBuilder;
use secrecy::{ExposeSecret, SecretString};
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, InlineKeyboardMarkup, InputFile, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use url::Url;

use crate::core::config::Config;

/// Address of a message previously sent by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

/// Why an outbound call did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// No bot token configured; nothing was sent
    #[error("Telegram delivery is disabled (no bot token)")]
    Disabled,
    /// The bounded per-call timeout elapsed
    #[error("Telegram request timed out")]
    Timeout,
    /// Telegram answered and refused the request
    #[error("Telegram API rejected the request: {0}")]
    Api(String),
    /// Connection, TLS or decoding failure
    #[error("Telegram transport error: {0}")]
    Transport(String),
    /// Nowhere to send: no operator chat configured or no message to edit
    #[error("no destination for this message")]
    NoDestination,
}

impl DeliveryError {
    /// The API refused this particular request, so a differently shaped
    /// request (text instead of caption, ...) may still succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, DeliveryError::Api(_))
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Where a receipt photo can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    Url(Url),
    File(PathBuf),
}

/// Outbound operations against the chat channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> DeliveryResult<MessageRef>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &PhotoSource,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> DeliveryResult<MessageRef>;

    async fn edit_text(&self, target: MessageRef, text: &str, keyboard: InlineKeyboardMarkup) -> DeliveryResult<()>;

    async fn edit_caption(
        &self,
        target: MessageRef,
        caption: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> DeliveryResult<()>;

    async fn edit_actions(&self, target: MessageRef, keyboard: InlineKeyboardMarkup) -> DeliveryResult<()>;

    /// Stop the "loading" indicator on a pressed button.
    async fn answer_callback(&self, callback_id: &str) -> DeliveryResult<()>;
}

/// Build the gateway for this deployment: live when a token is configured,
/// disabled otherwise.
pub fn messenger_from_config(config: &Config) -> Arc<dyn Messenger> {
    let Some(token) = &config.bot_token else {
        log::warn!("BOT_TOKEN not set, Telegram notifications are disabled");
        return Arc::new(DisabledGateway);
    };

    match TelegramGateway::new(token, config.bot_api_url.clone(), config.telegram_timeout) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            log::error!("Failed to create Telegram client, notifications are disabled: {}", e);
            Arc::new(DisabledGateway)
        }
    }
}

/// Teloxide-backed gateway.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Creates the gateway with a custom or default API URL and a bounded timeout.
    pub fn new(token: &SecretString, api_url: Option<Url>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new().timeout(timeout).build()?;
        let bot = Bot::with_client(token.expose_secret(), client);
        let bot = match api_url {
            Some(url) => {
                log::info!("Using custom Bot API URL: {}", url);
                bot.set_api_url(url)
            }
            None => bot,
        };
        Ok(Self { bot })
    }

    /// Wrap an existing bot (tests point it at a mock server).
    pub fn from_bot(bot: Bot) -> Self {
        Self { bot }
    }
}

fn classify(err: RequestError) -> DeliveryError {
    match err {
        RequestError::Api(api) => DeliveryError::Api(api.to_string()),
        RequestError::Network(e) if e.is_timeout() => DeliveryError::Timeout,
        other => DeliveryError::Transport(other.to_string()),
    }
}

/// Log and classify a failed call.
fn failed(method: &str, err: RequestError) -> DeliveryError {
    let err = classify(err);
    match &err {
        DeliveryError::Api(_) => log::warn!("Telegram {} rejected: {}", method, err),
        _ => log::error!("Telegram {} failed: {}", method, err),
    }
    err
}

/// Editing to identical content is not a failure for us.
fn edit_outcome<T>(method: &str, result: Result<T, RequestError>) -> DeliveryResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(RequestError::Api(ApiError::MessageNotModified)) => {
            log::debug!("Telegram {}: message not modified", method);
            Ok(())
        }
        Err(e) => Err(failed(method, e)),
    }
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    }
}

#[async_trait]
impl Messenger for TelegramGateway {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> DeliveryResult<MessageRef> {
        let mut req = self.bot.send_message(ChatId(chat_id), text).parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard {
            req = req.reply_markup(kb);
        }
        req.await.map(|msg| message_ref(&msg)).map_err(|e| failed("sendMessage", e))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &PhotoSource,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> DeliveryResult<MessageRef> {
        let file = match photo {
            PhotoSource::Url(url) => InputFile::url(url.clone()),
            PhotoSource::File(path) => InputFile::file(path.clone()),
        };
        let mut req = self
            .bot
            .send_photo(ChatId(chat_id), file)
            .caption(caption)
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard {
            req = req.reply_markup(kb);
        }
        req.await.map(|msg| message_ref(&msg)).map_err(|e| failed("sendPhoto", e))
    }

    async fn edit_text(&self, target: MessageRef, text: &str, keyboard: InlineKeyboardMarkup) -> DeliveryResult<()> {
        let result = self
            .bot
            .edit_message_text(ChatId(target.chat_id), MessageId(target.message_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await;
        edit_outcome("editMessageText", result)
    }

    async fn edit_caption(
        &self,
        target: MessageRef,
        caption: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> DeliveryResult<()> {
        let result = self
            .bot
            .edit_message_caption(ChatId(target.chat_id), MessageId(target.message_id))
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await;
        edit_outcome("editMessageCaption", result)
    }

    async fn edit_actions(&self, target: MessageRef, keyboard: InlineKeyboardMarkup) -> DeliveryResult<()> {
        let result = self
            .bot
            .edit_message_reply_markup(ChatId(target.chat_id), MessageId(target.message_id))
            .reply_markup(keyboard)
            .await;
        edit_outcome("editMessageReplyMarkup", result)
    }

    async fn answer_callback(&self, callback_id: &str) -> DeliveryResult<()> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_owned()))
            .await
            .map(|_| ())
            .map_err(|e| failed("answerCallbackQuery", e))
    }
}

/// No-op gateway for deployments without bot credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGateway;

#[async_trait]
impl Messenger for DisabledGateway {
    async fn send_text(&self, chat_id: i64, _: &str, _: Option<InlineKeyboardMarkup>) -> DeliveryResult<MessageRef> {
        log::debug!("Telegram disabled, skipping sendMessage to {}", chat_id);
        Err(DeliveryError::Disabled)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _: &PhotoSource,
        _: &str,
        _: Option<InlineKeyboardMarkup>,
    ) -> DeliveryResult<MessageRef> {
        log::debug!("Telegram disabled, skipping sendPhoto to {}", chat_id);
        Err(DeliveryError::Disabled)
    }

    async fn edit_text(&self, _: MessageRef, _: &str, _: InlineKeyboardMarkup) -> DeliveryResult<()> {
        Err(DeliveryError::Disabled)
    }

    async fn edit_caption(&self, _: MessageRef, _: &str, _: InlineKeyboardMarkup) -> DeliveryResult<()> {
        Err(DeliveryError::Disabled)
    }

    async fn edit_actions(&self, _: MessageRef, _: InlineKeyboardMarkup) -> DeliveryResult<()> {
        Err(DeliveryError::Disabled)
    }

    async fn answer_callback(&self, _: &str) -> DeliveryResult<()> {
        Err(DeliveryError::Disabled)
    }
}

/// Resolve a stored receipt reference into something Telegram can fetch.
///
/// Absolute `http(s)` URLs are used as-is, existing local files are uploaded,
/// relative paths are joined onto `media_base_url`. Anything else has no photo.
pub fn resolve_receipt(receipt_ref: &str, media_base_url: Option<&Url>) -> Option<PhotoSource> {
    let receipt_ref = receipt_ref.trim();
    if receipt_ref.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(receipt_ref) {
        return matches!(url.scheme(), "http" | "https").then_some(PhotoSource::Url(url));
    }

    let path = Path::new(receipt_ref);
    if path.is_absolute() && path.is_file() {
        return Some(PhotoSource::File(path.to_path_buf()));
    }

    media_base_url
        .and_then(|base| base.join(receipt_ref).ok())
        .map(PhotoSource::Url)
}

/// A prompt that reached the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentPrompt {
    pub message: MessageRef,
    pub is_photo: bool,
}

/// Send an operator prompt as a photo with caption, falling back to a plain
/// text message when there is no photo or the photo send fails for any
/// reason, so the operator always gets the buttons.
pub async fn send_prompt(
    messenger: &dyn Messenger,
    chat_id: i64,
    photo: Option<&PhotoSource>,
    caption: &str,
    text: &str,
    keyboard: InlineKeyboardMarkup,
) -> DeliveryResult<SentPrompt> {
    if let Some(photo) = photo {
        match messenger.send_photo(chat_id, photo, caption, Some(keyboard.clone())).await {
            Ok(message) => return Ok(SentPrompt { message, is_photo: true }),
            Err(DeliveryError::Disabled) => return Err(DeliveryError::Disabled),
            Err(e) => log::warn!("Receipt photo not sent ({}), falling back to text", e),
        }
    }

    let message = messenger.send_text(chat_id, text, Some(keyboard)).await?;
    Ok(SentPrompt {
        message,
        is_photo: false,
    })
}

/// Edit a prompt in place without knowing for sure whether it is a photo.
///
/// `is_photo` is the recorded hint, if any. The preferred edit is tried
/// first; when Telegram refuses it (no caption / no text on that message),
/// the other variant is tried, and as a last resort only the buttons are
/// replaced so no stale action stays clickable.
pub async fn edit_prompt(
    messenger: &dyn Messenger,
    target: MessageRef,
    is_photo: Option<bool>,
    caption: &str,
    text: &str,
    keyboard: InlineKeyboardMarkup,
) -> DeliveryResult<()> {
    let caption_first = is_photo.unwrap_or(true);

    let first = if caption_first {
        messenger.edit_caption(target, caption, keyboard.clone()).await
    } else {
        messenger.edit_text(target, text, keyboard.clone()).await
    };
    match first {
        Ok(()) => return Ok(()),
        Err(e) if !e.is_rejection() => return Err(e),
        Err(_) => {}
    }

    let second = if caption_first {
        messenger.edit_text(target, text, keyboard.clone()).await
    } else {
        messenger.edit_caption(target, caption, keyboard.clone()).await
    };
    match second {
        Ok(()) => Ok(()),
        Err(e) if !e.is_rejection() => Err(e),
        Err(e) => {
            log::warn!(
                "Could not edit prompt {}:{} ({}), replacing buttons only",
                target.chat_id,
                target.message_id,
                e
            );
            messenger.edit_actions(target, keyboard).await
        }
    }
}
