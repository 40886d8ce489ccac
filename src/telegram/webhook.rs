//! Webhook dispatcher: operator button presses → order transitions.
//!
//! Every inbound update ends with the same HTTP answer (`200 {"ok": true}`);
//! the [`DispatchOutcome`] exists for logging and tests only. Duplicate and
//! stale presses are made harmless by the transition engine plus the
//! compare-and-swap write, not by any dedup bookkeeping.

use std::sync::Arc;

use serde::Deserialize;

use super::gateway::{MessageRef, Messenger};
use super::notifications::{notify_customer, refresh_operator_prompt};
use crate::core::config::Config;
use crate::core::error::AppResult;
use crate::order::token::{ActionToken, TokenError};
use crate::order::transition::{apply_as, RejectReason, Rejected};
use crate::order::types::{Action, Actor, Order, OrderStatus};
use crate::storage::db::{get_connection, DbPool};
use crate::storage::orders::{compare_and_set_status, get_order, set_default_operator_note};

/// The subset of a Telegram `Update` the dispatcher understands.
#[derive(Debug, Deserialize)]
struct Update {
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<CallbackMessage>,
}

#[derive(Debug, Deserialize)]
struct CallbackMessage {
    message_id: i32,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// What happened to one inbound update.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Not JSON, not a callback, or a callback without data
    Ignored,
    /// Pressed outside the operator chat
    ForeignChat(i64),
    /// `callback_data` is not an action token
    BadToken(TokenError),
    OrderNotFound(i64),
    /// Order already delivered or cancelled
    Terminal { order_id: i64, status: OrderStatus },
    /// Refused by the engine, or another press won the race
    Rejected(Rejected),
    Applied {
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },
    /// Ledger unavailable; nothing was changed
    Failed(String),
}

/// Default operator note written on a payment decision, unless one exists.
fn default_note(action: Action) -> Option<&'static str> {
    match action {
        Action::Approve => Some("Оплата подтверждена"),
        Action::Reject => Some("Оплата отклонена"),
        _ => None,
    }
}

/// Drives operator callbacks through the transition engine.
#[derive(Clone)]
pub struct WebhookDispatcher {
    pool: Arc<DbPool>,
    messenger: Arc<dyn Messenger>,
    config: Arc<Config>,
}

impl WebhookDispatcher {
    pub fn new(pool: Arc<DbPool>, messenger: Arc<dyn Messenger>, config: Arc<Config>) -> Self {
        Self {
            pool,
            messenger,
            config,
        }
    }

    /// Handle one raw webhook body.
    pub async fn dispatch(&self, body: &[u8]) -> DispatchOutcome {
        let update: Update = match serde_json::from_slice(body) {
            Ok(update) => update,
            Err(e) => {
                log::debug!("Discarding unparsable webhook body: {}", e);
                return DispatchOutcome::Ignored;
            }
        };
        let Some(query) = update.callback_query else {
            return DispatchOutcome::Ignored;
        };

        // Stop the spinner whatever the outcome below.
        if let Err(e) = self.messenger.answer_callback(&query.id).await {
            log::debug!("Callback {} not acknowledged: {}", query.id, e);
        }

        let Some(data) = query.data.as_deref() else {
            return DispatchOutcome::Ignored;
        };
        let origin = query.message.as_ref().map(|m| MessageRef {
            chat_id: m.chat.id,
            message_id: m.message_id,
        });

        if let (Some(operator_chat), Some(origin)) = (self.config.operator_chat_id, origin) {
            if origin.chat_id != operator_chat {
                log::warn!("Ignoring callback from foreign chat {}", origin.chat_id);
                return DispatchOutcome::ForeignChat(origin.chat_id);
            }
        }

        let token: ActionToken = match data.parse() {
            Ok(token) => token,
            Err(e) => {
                log::debug!("Discarding callback {:?}: {}", data, e);
                return DispatchOutcome::BadToken(e);
            }
        };

        self.apply_token(token, origin).await
    }

    async fn apply_token(&self, token: ActionToken, origin: Option<MessageRef>) -> DispatchOutcome {
        let order_id = token.order_id;
        let order = match self.load(order_id) {
            Ok(Some(order)) => order,
            Ok(None) => {
                log::debug!("Callback {} for unknown order", token);
                return DispatchOutcome::OrderNotFound(order_id);
            }
            Err(e) => {
                log::error!("Failed to load order #{}: {}", order_id, e);
                return DispatchOutcome::Failed(e.to_string());
            }
        };

        if order.status.is_terminal() {
            log::debug!("Order #{} already {}, ignoring {}", order_id, order.status, token.action);
            return DispatchOutcome::Terminal {
                order_id,
                status: order.status,
            };
        }

        let next = match apply_as(Actor::Operator, order.status, token.action, order.has_receipt()) {
            Ok(next) => next,
            Err(rejected) => {
                log::debug!("Order #{}: {}", order_id, rejected);
                return DispatchOutcome::Rejected(rejected);
            }
        };

        let updated = match self.persist(&order, token.action, next) {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                log::debug!("Order #{} changed concurrently, {} not applied", order_id, token.action);
                return DispatchOutcome::Rejected(Rejected::new(
                    order.status,
                    token.action,
                    RejectReason::IllegalTransition,
                ));
            }
            Err(e) => {
                log::error!("Failed to persist order #{} transition: {}", order_id, e);
                return DispatchOutcome::Failed(e.to_string());
            }
        };
        log::info!(
            "Order #{}: {} → {} ({})",
            order_id,
            order.status,
            updated.status,
            token.action
        );

        self.reflect(&updated, origin).await;

        DispatchOutcome::Applied {
            order_id,
            from: order.status,
            to: updated.status,
        }
    }

    fn load(&self, order_id: i64) -> AppResult<Option<Order>> {
        let conn = get_connection(&self.pool)?;
        get_order(&conn, order_id)
    }

    /// CAS write; `None` when the order moved on in the meantime.
    fn persist(&self, order: &Order, action: Action, next: OrderStatus) -> AppResult<Option<Order>> {
        let conn = get_connection(&self.pool)?;
        if !compare_and_set_status(&conn, order.id, order.status, next)? {
            return Ok(None);
        }
        if let Some(note) = default_note(action) {
            if let Err(e) = set_default_operator_note(&conn, order.id, note) {
                log::warn!("Order #{}: default note not written: {}", order.id, e);
            }
        }
        get_order(&conn, order.id)
    }

    /// Customer message, then the operator prompt edit. Both best-effort.
    async fn reflect(&self, order: &Order, origin: Option<MessageRef>) {
        match notify_customer(&self.pool, self.messenger.as_ref(), order).await {
            Ok(true) => log::debug!("Order #{}: customer notified", order.id),
            Ok(false) => {}
            Err(e) => log::warn!("Order #{}: customer not notified: {}", order.id, e),
        }

        if let Err(e) = refresh_operator_prompt(&self.pool, self.messenger.as_ref(), order, origin).await {
            log::warn!("Order #{}: operator prompt not updated: {}", order.id, e);
        }
    }
}
