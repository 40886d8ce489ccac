//! Read side of the watch catalog.
//!
//! Catalog maintenance belongs to the back office; orders only need
//! `lookup` at checkout time to snapshot a name and a price.

use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::core::error::AppResult;

/// Catalog entry as seen by checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub is_active: bool,
}

/// Fields for a new catalog entry.
#[derive(Debug, Clone)]
pub struct NewProduct<'a> {
    pub name: &'a str,
    pub tag: &'a str,
    pub description: &'a str,
    pub price: i64,
    pub sort_order: i64,
}

/// Look up a catalog entry by id, hidden entries included.
pub fn lookup_product(conn: &Connection, product_id: i64) -> AppResult<Option<Product>> {
    let product = conn
        .query_row(
            "SELECT id, name, price, currency, is_active FROM products WHERE id = ?1",
            params![product_id],
            |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    price: Decimal::from(row.get::<_, i64>(2)?),
                    currency: row.get(3)?,
                    is_active: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(product)
}

/// Insert a catalog entry and return its id.
pub fn insert_product(conn: &Connection, product: &NewProduct<'_>) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO products (name, tag, description, price, sort_order) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            product.name,
            product.tag,
            product.description,
            product.price,
            product.sort_order
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Change the live price. Existing orders keep their snapshot.
pub fn update_product_price(conn: &Connection, product_id: i64, price: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE products SET price = ?1 WHERE id = ?2",
        params![price, product_id],
    )?;
    Ok(changed > 0)
}

/// Hide or show an entry on the storefront.
pub fn set_product_active(conn: &Connection, product_id: i64, active: bool) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE products SET is_active = ?1 WHERE id = ?2",
        params![active, product_id],
    )?;
    Ok(changed > 0)
}
