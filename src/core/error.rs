use thiserror::Error;

use crate::order::transition::Rejected;

/// Centralized error types for the application
///
/// Ledger, checkout and HTTP-layer failures are converted to this enum.
/// Outbound Telegram failures are deliberately NOT part of it: they live in
/// [`crate::telegram::gateway::DeliveryError`] and never propagate past the
/// notification layer.
///
/// # Example
///
/// ```no_run
/// use timepiece_orders::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),

    /// Input failed shape validation (empty phone, half-set coordinates, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced order does not exist
    #[error("Order #{0} not found")]
    OrderNotFound(i64),

    /// Referenced catalog entry does not exist or is hidden
    #[error("Product #{0} not found")]
    ProductNotFound(i64),

    /// The transition engine refused the requested action
    #[error("Transition rejected: {0}")]
    Rejected(#[from] Rejected),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Shorthand for building a validation error from any message.
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }
}
