//! Order transition engine.
//!
//! Pure functions only: no I/O, no clock, no storage. The ledger persists
//! whatever [`apply`] returns, conditioned on the status it was computed from.
//!
//! ```text
//! awaiting_payment ──submit_receipt──▶ new ──approve──▶ accepted ──ship──▶ in_progress ──deliver──▶ delivered
//!                                       │
//!                                       └──reject──▶ cancelled
//! ```

use serde::Serialize;
use thiserror::Error;

use super::types::{Action, Actor, OrderStatus};

/// Why a transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    /// No edge for this (status, action) pair
    IllegalTransition,
    /// A payment receipt is already attached
    ReceiptAlreadyAttached,
    /// The action belongs to another actor
    WrongActor,
}

/// A refused transition. Expected during replays and double-clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[error("{action} from {from}: {reason}")]
pub struct Rejected {
    pub from: OrderStatus,
    pub action: Action,
    pub reason: RejectReason,
}

impl Rejected {
    pub fn new(from: OrderStatus, action: Action, reason: RejectReason) -> Self {
        Self { from, action, reason }
    }
}

/// Apply `action` to an order currently in `current`.
///
/// `has_receipt` tells whether a payment receipt is already attached to the
/// order; a second `submit_receipt` is refused whatever the status.
pub fn apply(current: OrderStatus, action: Action, has_receipt: bool) -> Result<OrderStatus, Rejected> {
    use Action::*;
    use OrderStatus::*;

    if action == SubmitReceipt && has_receipt {
        return Err(Rejected::new(current, action, RejectReason::ReceiptAlreadyAttached));
    }

    match (current, action) {
        (AwaitingPayment, SubmitReceipt) => Ok(New),
        (New, Approve) => Ok(Accepted),
        (New, Reject) => Ok(Cancelled),
        (Accepted, Ship) => Ok(InProgress),
        (InProgress, Deliver) => Ok(Delivered),
        _ => Err(Rejected::new(current, action, RejectReason::IllegalTransition)),
    }
}

/// [`apply`], additionally checking that `actor` owns the action.
pub fn apply_as(
    actor: Actor,
    current: OrderStatus,
    action: Action,
    has_receipt: bool,
) -> Result<OrderStatus, Rejected> {
    if action.actor() != actor {
        return Err(Rejected::new(current, action, RejectReason::WrongActor));
    }
    apply(current, action, has_receipt)
}

/// Actions that have an outgoing edge from `status` for the given actor.
pub fn available_actions(status: OrderStatus, actor: Actor) -> Vec<Action> {
    use strum::IntoEnumIterator;

    Action::iter()
        .filter(|action| action.actor() == actor)
        .filter(|action| apply(status, *action, false).is_ok())
        .collect()
}
