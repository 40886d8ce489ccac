//! Telegram integration: rendering, outbound gateway, notifications and the
//! webhook/HTTP surface

pub mod gateway;
pub mod notifications;
pub mod render;
pub mod server;
pub mod webhook;

// Re-exports for convenience
pub use gateway::{messenger_from_config, DeliveryError, DisabledGateway, MessageRef, Messenger, TelegramGateway};
pub use render::{render, render_caption, Notification};
pub use server::{create_router, run_server, AppState};
pub use webhook::{DispatchOutcome, WebhookDispatcher};
