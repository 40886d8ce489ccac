//! Order ledger: the system of record for orders and their line items.
//!
//! The ledger validates field shapes and nothing else. Status changes are
//! computed by [`crate::order::transition`] and written here with a
//! compare-and-swap on the prior status, so a stale or duplicated request
//! can never apply the same edge twice.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::catalog::lookup_product;
use crate::core::config::checkout::{MAX_ADDRESS_LEN, MAX_PHONE_LEN};
use crate::core::error::{AppError, AppResult};
use crate::order::types::{GeoPoint, Order, OrderItem, OrderStatus};

/// One requested line at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NewOrderLine {
    pub product_ref: i64,
    pub quantity: u32,
}

/// Everything the checkout collaborator supplies to create an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_ref: Option<i64>,
    pub contact_phone: String,
    pub delivery_address_text: String,
    pub delivery_point: Option<GeoPoint>,
    pub lines: Vec<NewOrderLine>,
}

/// Where the last operator prompt for an order lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorMessage {
    pub chat_id: i64,
    pub message_id: i32,
    /// Sent as a receipt photo (caption) rather than a text message
    pub is_photo: bool,
}

const ORDER_COLUMNS: &str = "id, status, customer_id, contact_phone, address_text, latitude, longitude, \
                             payment_receipt_ref, operator_note, created_at";

/// Create an order and its line items atomically.
///
/// Unit prices are copied from the catalog inside the same transaction; later
/// catalog edits never touch them. The order starts in
/// [`OrderStatus::INITIAL`].
pub fn insert_order(conn: &mut Connection, new_order: &NewOrder) -> AppResult<Order> {
    let contact_phone = new_order.contact_phone.trim();
    let address = new_order.delivery_address_text.trim();
    validate_shape(contact_phone, address, &new_order.lines)?;

    let created_at = Utc::now();
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO orders (status, customer_id, contact_phone, address_text, latitude, longitude, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            OrderStatus::INITIAL.as_ref(),
            new_order.customer_ref,
            contact_phone,
            address,
            new_order.delivery_point.map(|p| p.lat),
            new_order.delivery_point.map(|p| p.lon),
            created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        ],
    )?;
    let order_id = tx.last_insert_rowid();

    for line in &new_order.lines {
        let product = lookup_product(&tx, line.product_ref)?
            .filter(|p| p.is_active)
            .ok_or(AppError::ProductNotFound(line.product_ref))?;
        tx.execute(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES (?1, ?2, ?3, ?4)",
            params![order_id, product.id, line.quantity, product.price.to_string()],
        )?;
    }

    let order = load_order(&tx, order_id)?.ok_or(AppError::OrderNotFound(order_id))?;
    tx.commit()?;

    log::info!(
        "Order #{} created with {} line(s), total {}",
        order.id,
        order.line_items.len(),
        order.total_amount()
    );
    Ok(order)
}

fn validate_shape(phone: &str, address: &str, lines: &[NewOrderLine]) -> AppResult<()> {
    if phone.is_empty() {
        return Err(AppError::validation("contact phone is required"));
    }
    if phone.chars().count() > MAX_PHONE_LEN {
        return Err(AppError::validation("contact phone is too long"));
    }
    if address.is_empty() {
        return Err(AppError::validation("delivery address is required"));
    }
    if address.chars().count() > MAX_ADDRESS_LEN {
        return Err(AppError::validation("delivery address is too long"));
    }
    if lines.is_empty() {
        return Err(AppError::validation("order has no items"));
    }
    if lines.iter().any(|line| line.quantity == 0) {
        return Err(AppError::validation("item quantity must be positive"));
    }
    Ok(())
}

/// Fetch an order with its line items.
pub fn get_order(conn: &Connection, order_id: i64) -> AppResult<Option<Order>> {
    load_order(conn, order_id)
}

fn load_order(conn: &Connection, order_id: i64) -> AppResult<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
    let order = conn.query_row(&sql, params![order_id], order_from_row).optional()?;

    match order {
        Some(mut order) => {
            order.line_items = load_items(conn, order.id)?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

fn load_items(conn: &Connection, order_id: i64) -> AppResult<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT i.product_id, p.name, i.quantity, i.unit_price
         FROM order_items i JOIN products p ON p.id = i.product_id
         WHERE i.order_id = ?1
         ORDER BY i.id",
    )?;
    let rows = stmt.query_map(params![order_id], |row| {
        Ok(OrderItem {
            product_ref: row.get(0)?,
            product_name: row.get(1)?,
            quantity: row.get(2)?,
            unit_price: parse_text_column::<Decimal>(row, 3)?,
        })
    })?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

/// Orders of one customer, newest first.
pub fn orders_for_customer(conn: &Connection, customer_id: i64) -> AppResult<Vec<Order>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE customer_id = ?1 ORDER BY created_at DESC, id DESC",
        ORDER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![customer_id], order_from_row)?;

    let mut orders = Vec::new();
    for row in rows {
        let mut order = row?;
        order.line_items = load_items(conn, order.id)?;
        orders.push(order);
    }
    Ok(orders)
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let lat: Option<f64> = row.get(5)?;
    let lon: Option<f64> = row.get(6)?;
    let delivery_point = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
        _ => None,
    };

    Ok(Order {
        id: row.get(0)?,
        status: parse_text_column::<OrderStatus>(row, 1)?,
        customer_ref: row.get(2)?,
        contact_phone: row.get(3)?,
        delivery_address_text: row.get(4)?,
        delivery_point,
        payment_receipt_ref: row.get(7)?,
        operator_note: row.get(8)?,
        created_at: parse_text_column::<DateTime<Utc>>(row, 9)?,
        line_items: Vec::new(),
    })
}

fn parse_text_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Move an order from `expected` to `next`.
///
/// Returns `false` when the order is no longer in `expected` (or does not
/// exist): another request got there first, nothing was written.
pub fn compare_and_set_status(
    conn: &Connection,
    order_id: i64,
    expected: OrderStatus,
    next: OrderStatus,
) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE orders SET status = ?1 WHERE id = ?2 AND status = ?3",
        params![next.as_ref(), order_id, expected.as_ref()],
    )?;
    Ok(changed == 1)
}

/// Attach a payment receipt and move the order from `expected` to `next` in one write.
///
/// Refuses to overwrite an existing receipt.
pub fn attach_receipt(
    conn: &Connection,
    order_id: i64,
    expected: OrderStatus,
    next: OrderStatus,
    receipt_ref: &str,
) -> AppResult<bool> {
    let receipt_ref = receipt_ref.trim();
    if receipt_ref.is_empty() {
        return Err(AppError::validation("receipt reference is empty"));
    }
    let changed = conn.execute(
        "UPDATE orders SET status = ?1, payment_receipt_ref = ?2
         WHERE id = ?3 AND status = ?4 AND payment_receipt_ref IS NULL",
        params![next.as_ref(), receipt_ref, order_id, expected.as_ref()],
    )?;
    Ok(changed == 1)
}

/// Set the operator note only if none was written yet.
pub fn set_default_operator_note(conn: &Connection, order_id: i64, note: &str) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE orders SET operator_note = ?1 WHERE id = ?2 AND operator_note = ''",
        params![note, order_id],
    )?;
    Ok(changed == 1)
}

/// Append a line to the operator note, keeping what is already there.
pub fn append_operator_note(conn: &Connection, order_id: i64, line: &str) -> AppResult<bool> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(false);
    }
    let changed = conn.execute(
        "UPDATE orders SET operator_note = CASE
             WHEN operator_note = '' THEN ?1
             ELSE operator_note || char(10) || ?1
         END
         WHERE id = ?2",
        params![line, order_id],
    )?;
    Ok(changed == 1)
}

/// Remember the operator prompt last sent for an order.
pub fn record_operator_message(conn: &Connection, order_id: i64, message: OperatorMessage) -> AppResult<()> {
    conn.execute(
        "INSERT INTO operator_messages (order_id, chat_id, message_id, is_photo, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(order_id) DO UPDATE SET
             chat_id = excluded.chat_id,
             message_id = excluded.message_id,
             is_photo = excluded.is_photo,
             updated_at = excluded.updated_at",
        params![
            order_id,
            message.chat_id,
            message.message_id,
            message.is_photo,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        ],
    )?;
    Ok(())
}

pub fn operator_message(conn: &Connection, order_id: i64) -> AppResult<Option<OperatorMessage>> {
    let message = conn
        .query_row(
            "SELECT chat_id, message_id, is_photo FROM operator_messages WHERE order_id = ?1",
            params![order_id],
            |row| {
                Ok(OperatorMessage {
                    chat_id: row.get(0)?,
                    message_id: row.get(1)?,
                    is_photo: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(message)
}
