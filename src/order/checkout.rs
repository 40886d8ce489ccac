//! Customer-side entry points: placing an order and uploading the receipt.
//!
//! Neither ever fails because of Telegram. The ledger write is the result;
//! the operator prompt is attempted afterwards and only logged on failure.

use serde::Deserialize;

use super::transition::{apply_as, RejectReason, Rejected};
use super::types::{Action, Actor, GeoPoint, Order};
use crate::core::config::Config;
use crate::core::error::{AppError, AppResult};
use crate::storage::customers::{ensure_customer, save_contact_details};
use crate::storage::db::{get_connection, DbPool};
use crate::storage::orders::{attach_receipt, get_order, insert_order, NewOrder, NewOrderLine};
use crate::telegram::gateway::Messenger;
use crate::telegram::notifications::notify_operator;

/// Checkout form as submitted by the storefront.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    /// Storefront username; anonymous checkout when absent
    #[serde(default)]
    pub customer: Option<String>,
    pub contact_phone: String,
    pub delivery_address_text: String,
    #[serde(default)]
    pub delivery_lat: Option<f64>,
    #[serde(default)]
    pub delivery_lon: Option<f64>,
    pub items: Vec<NewOrderLine>,
}

/// Create an order in `awaiting_payment` from a checkout form.
pub fn place_order(pool: &DbPool, config: &Config, request: &CheckoutRequest) -> AppResult<Order> {
    let delivery_point =
        GeoPoint::from_parts(request.delivery_lat, request.delivery_lon).map_err(AppError::validation)?;
    if config.require_map_point && delivery_point.is_none() {
        return Err(AppError::validation("delivery point is required"));
    }

    let mut conn = get_connection(pool)?;
    let customer_ref = match request.customer.as_deref().map(str::trim) {
        Some(username) if !username.is_empty() => Some(ensure_customer(&conn, username)?),
        _ => None,
    };

    let order = insert_order(
        &mut conn,
        &NewOrder {
            customer_ref,
            contact_phone: request.contact_phone.clone(),
            delivery_address_text: request.delivery_address_text.clone(),
            delivery_point,
            lines: request.items.clone(),
        },
    )?;

    // Prefill for the next checkout
    if let Some(customer_id) = customer_ref {
        let location = match delivery_point {
            Some(p) => format!("{},{}", p.lat, p.lon),
            None => order.delivery_address_text.clone(),
        };
        if let Err(e) = save_contact_details(&conn, customer_id, &order.contact_phone, &location) {
            log::warn!("Failed to save contact details of customer {}: {}", customer_id, e);
        }
    }

    Ok(order)
}

/// Attach a payment receipt (`awaiting_payment → new`) and prompt the operator.
///
/// A second upload for the same order is refused with
/// [`RejectReason::ReceiptAlreadyAttached`], so the operator is never
/// prompted twice for one payment.
pub async fn submit_receipt(
    pool: &DbPool,
    messenger: &dyn Messenger,
    config: &Config,
    order_id: i64,
    receipt_ref: &str,
) -> AppResult<Order> {
    let order = {
        let conn = get_connection(pool)?;
        let order = get_order(&conn, order_id)?.ok_or(AppError::OrderNotFound(order_id))?;
        let next = apply_as(Actor::Customer, order.status, Action::SubmitReceipt, order.has_receipt())?;

        if !attach_receipt(&conn, order_id, order.status, next, receipt_ref)? {
            // Lost a race: report it the way the engine sees the order now.
            let current = get_order(&conn, order_id)?.ok_or(AppError::OrderNotFound(order_id))?;
            apply_as(Actor::Customer, current.status, Action::SubmitReceipt, current.has_receipt())?;
            return Err(Rejected::new(current.status, Action::SubmitReceipt, RejectReason::IllegalTransition).into());
        }

        get_order(&conn, order_id)?.ok_or(AppError::OrderNotFound(order_id))?
    };
    log::info!("Order #{}: receipt attached, status {}", order.id, order.status);

    if let Err(e) = notify_operator(pool, messenger, config, &order).await {
        log::warn!("Order #{}: operator not notified: {}", order.id, e);
    }

    Ok(order)
}
