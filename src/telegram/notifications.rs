//! Best-effort notifications around order transitions.
//!
//! Everything here runs after the ledger write committed. Failures are logged
//! and reported back to the caller only so it can log them too; they never
//! undo or block the transition.

use super::gateway::{
    edit_prompt, resolve_receipt, send_prompt, DeliveryError, DeliveryResult, MessageRef, Messenger, SentPrompt,
};
use super::render::{render, render_caption};
use crate::core::config::Config;
use crate::order::types::{Order, OrderStatus};
use crate::storage::customers::customer_chat_id;
use crate::storage::db::{get_connection, DbPool};
use crate::storage::orders::{operator_message, record_operator_message, OperatorMessage};

/// Message the customer gets when their order reaches `status`.
pub fn customer_text(order_id: i64, status: OrderStatus) -> Option<String> {
    let text = match status {
        OrderStatus::Accepted => format!("✅ Оплата по заказу №{} подтверждена. Спасибо!", order_id),
        OrderStatus::Cancelled => format!("❌ Оплата по заказу №{} отклонена. Свяжитесь с продавцом.", order_id),
        OrderStatus::InProgress => format!("🚚 Заказ №{} в пути.", order_id),
        OrderStatus::Delivered => format!("📦 Заказ №{} доставлен.", order_id),
        OrderStatus::AwaitingPayment | OrderStatus::New => return None,
    };
    Some(text)
}

/// Post the decision prompt for a freshly paid order to the operator chat
/// and remember where it landed.
///
/// With a receipt photo: photo + short caption + buttons, then the full
/// itemised text without buttons. Without one (or when the photo is
/// refused): a single text message carrying the buttons.
pub async fn notify_operator(
    pool: &DbPool,
    messenger: &dyn Messenger,
    config: &Config,
    order: &Order,
) -> DeliveryResult<SentPrompt> {
    let Some(chat_id) = config.operator_chat_id else {
        log::warn!("OPERATOR_CHAT_ID not set, order #{} prompt not sent", order.id);
        return Err(DeliveryError::NoDestination);
    };

    let full = render(order);
    let caption = render_caption(order);
    let photo = order
        .payment_receipt_ref
        .as_deref()
        .and_then(|receipt| resolve_receipt(receipt, config.media_base_url.as_ref()));

    let sent = send_prompt(
        messenger,
        chat_id,
        photo.as_ref(),
        &caption.body_text,
        &full.body_text,
        full.keyboard.clone(),
    )
    .await?;

    if sent.is_photo {
        if let Err(e) = messenger.send_text(chat_id, &full.body_text, None).await {
            log::warn!("Order #{} details not sent after receipt photo: {}", order.id, e);
        }
    }

    remember_prompt(pool, order.id, sent);
    log::info!(
        "Operator prompt for order #{} sent as {} (message {})",
        order.id,
        if sent.is_photo { "photo" } else { "text" },
        sent.message.message_id
    );
    Ok(sent)
}

fn remember_prompt(pool: &DbPool, order_id: i64, sent: SentPrompt) {
    let binding = OperatorMessage {
        chat_id: sent.message.chat_id,
        message_id: sent.message.message_id,
        is_photo: sent.is_photo,
    };
    let result = get_connection(pool).and_then(|conn| record_operator_message(&conn, order_id, binding));
    if let Err(e) = result {
        log::error!("Failed to record operator message for order #{}: {}", order_id, e);
    }
}

/// Tell the customer about the new status, if they linked a chat.
///
/// Returns `Ok(false)` when there is nobody to tell.
pub async fn notify_customer(pool: &DbPool, messenger: &dyn Messenger, order: &Order) -> DeliveryResult<bool> {
    let Some(text) = customer_text(order.id, order.status) else {
        return Ok(false);
    };
    let Some(customer_id) = order.customer_ref else {
        return Ok(false);
    };

    let chat_id = match get_connection(pool).and_then(|conn| customer_chat_id(&conn, customer_id)) {
        Ok(Some(chat_id)) => chat_id,
        Ok(None) => {
            log::debug!("Customer {} has no linked chat, skipping notification", customer_id);
            return Ok(false);
        }
        Err(e) => {
            log::error!("Failed to look up chat of customer {}: {}", customer_id, e);
            return Ok(false);
        }
    };

    messenger.send_text(chat_id, &text, None).await?;
    Ok(true)
}

/// Re-render the operator prompt in place.
///
/// The recorded binding wins; `fallback` (identifiers from an inbound
/// callback) is used only for orders that have none.
pub async fn refresh_operator_prompt(
    pool: &DbPool,
    messenger: &dyn Messenger,
    order: &Order,
    fallback: Option<MessageRef>,
) -> DeliveryResult<()> {
    let binding = match get_connection(pool).and_then(|conn| operator_message(&conn, order.id)) {
        Ok(binding) => binding,
        Err(e) => {
            log::error!("Failed to read operator message of order #{}: {}", order.id, e);
            None
        }
    };

    let (target, is_photo) = match (binding, fallback) {
        (Some(b), _) => (
            MessageRef {
                chat_id: b.chat_id,
                message_id: b.message_id,
            },
            Some(b.is_photo),
        ),
        (None, Some(target)) => (target, None),
        (None, None) => {
            log::warn!("Order #{} has no operator message to update", order.id);
            return Err(DeliveryError::NoDestination);
        }
    };

    let full = render(order);
    let caption = render_caption(order);
    edit_prompt(messenger, target, is_photo, &caption.body_text, &full.body_text, full.keyboard).await
}
