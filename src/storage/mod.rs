//! Order ledger storage: pool, migrations, orders, catalog and customers

pub mod catalog;
pub mod customers;
pub mod db;
pub mod migrations;
pub mod orders;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use orders::{NewOrder, NewOrderLine, OperatorMessage};
