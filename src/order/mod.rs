//! Order domain: statuses, the transition engine, action tokens and the
//! customer-side checkout flow.

pub mod checkout;
pub mod token;
pub mod transition;
pub mod types;

pub use checkout::{place_order, submit_receipt, CheckoutRequest};
pub use token::{ActionToken, TokenError};
pub use transition::{apply, apply_as, available_actions, RejectReason, Rejected};
pub use types::{Action, Actor, GeoPoint, Order, OrderItem, OrderStatus};
