//! Timepiece orders - order fulfillment workflow driven from a Telegram chat
//!
//! A customer places an order and uploads a payment receipt; an operator
//! approves or rejects it and advances delivery by pressing inline buttons.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors and logging
//! - `order`: Statuses, the transition engine, action tokens, checkout
//! - `storage`: SQLite ledger (orders, items, customers, catalog)
//! - `telegram`: Rendering, the outbound gateway, notifications and the webhook server

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cli;
pub mod core;
pub mod order;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult, Config};
pub use order::{Action, ActionToken, Order, OrderStatus};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
pub use telegram::{create_router, AppState, DispatchOutcome, Messenger, WebhookDispatcher};
