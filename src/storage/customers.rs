//! Customer records: saved contact details and an optional Telegram chat.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::core::error::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub id: i64,
    pub username: String,
    pub phone: String,
    pub location: String,
    /// Present only after the customer linked the bot; enables notifications
    pub telegram_chat_id: Option<i64>,
}

/// Return the id of the customer with this username, creating it if needed.
pub fn ensure_customer(conn: &Connection, username: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO customers (username) VALUES (?1) ON CONFLICT(username) DO NOTHING",
        params![username],
    )?;
    let id = conn.query_row(
        "SELECT id FROM customers WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn find_customer(conn: &Connection, username: &str) -> AppResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM customers WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn get_customer(conn: &Connection, customer_id: i64) -> AppResult<Option<Customer>> {
    let customer = conn
        .query_row(
            "SELECT id, username, phone, location, telegram_chat_id FROM customers WHERE id = ?1",
            params![customer_id],
            |row| {
                Ok(Customer {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    phone: row.get(2)?,
                    location: row.get(3)?,
                    telegram_chat_id: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(customer)
}

/// Remember the contact details used at the last checkout.
pub fn save_contact_details(conn: &Connection, customer_id: i64, phone: &str, location: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE customers SET phone = ?1, location = ?2 WHERE id = ?3",
        params![phone, location, customer_id],
    )?;
    Ok(())
}

/// Bind a Telegram chat so status changes reach the customer.
pub fn link_customer_chat(conn: &Connection, customer_id: i64, chat_id: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE customers SET telegram_chat_id = ?1 WHERE id = ?2",
        params![chat_id, customer_id],
    )?;
    Ok(changed > 0)
}

/// Telegram chat of the customer, if one was ever linked.
pub fn customer_chat_id(conn: &Connection, customer_id: i64) -> AppResult<Option<i64>> {
    let chat_id: Option<Option<i64>> = conn
        .query_row(
            "SELECT telegram_chat_id FROM customers WHERE id = ?1",
            params![customer_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(chat_id.flatten())
}
