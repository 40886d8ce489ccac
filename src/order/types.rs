//! Order domain types shared by the ledger, the engine and the renderer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Workflow stage of an order. Stored in SQLite as the snake_case name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    AwaitingPayment,
    New,
    Accepted,
    InProgress,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Status every order starts in.
    pub const INITIAL: OrderStatus = OrderStatus::AwaitingPayment;

    /// No outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Human-readable label shown to the operator and the customer.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::AwaitingPayment => "Ожидает оплаты",
            OrderStatus::New => "Оплачен (на проверке)",
            OrderStatus::Accepted => "Оплата подтверждена",
            OrderStatus::InProgress => "В пути",
            OrderStatus::Delivered => "Доставлен",
            OrderStatus::Cancelled => "Отменён",
        }
    }
}

/// Who is allowed to perform an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Actor {
    Customer,
    Operator,
}

/// A requested transition. The snake_case name is the action-token literal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    SubmitReceipt,
    Approve,
    Reject,
    Ship,
    Deliver,
}

impl Action {
    /// The only actor allowed to perform this action.
    pub fn actor(self) -> Actor {
        match self {
            Action::SubmitReceipt => Actor::Customer,
            Action::Approve | Action::Reject | Action::Ship | Action::Deliver => Actor::Operator,
        }
    }

    /// Inline button caption; `None` for actions that never get a button.
    pub fn button_label(self) -> Option<&'static str> {
        match self {
            Action::SubmitReceipt => None,
            Action::Approve => Some("✅ Подтвердить оплату"),
            Action::Reject => Some("❌ Отклонить оплату"),
            Action::Ship => Some("🚚 В пути"),
            Action::Deliver => Some("📦 Доставлен"),
        }
    }
}

/// Delivery point picked on the map. Both coordinates or none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Pair up two optional coordinates, refusing a half-set point.
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Result<Option<GeoPoint>, &'static str> {
        match (lat, lon) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err("coordinates out of range");
                }
                Ok(Some(GeoPoint { lat, lon }))
            }
            (None, None) => Ok(None),
            _ => Err("latitude and longitude must be set together"),
        }
    }
}

/// One line of an order. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_ref: i64,
    /// Catalog name, looked up for display only
    pub product_name: String,
    pub quantity: u32,
    /// Price captured at checkout, decoupled from the live catalog price
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Snapshot of an order as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub status: OrderStatus,
    pub customer_ref: Option<i64>,
    pub contact_phone: String,
    pub delivery_address_text: String,
    pub delivery_point: Option<GeoPoint>,
    pub payment_receipt_ref: Option<String>,
    pub operator_note: String,
    pub created_at: DateTime<Utc>,
    pub line_items: Vec<OrderItem>,
}

impl Order {
    /// Sum of line totals. Always recomputed from the items.
    pub fn total_amount(&self) -> Decimal {
        self.line_items.iter().map(OrderItem::line_total).sum()
    }

    pub fn has_receipt(&self) -> bool {
        self.payment_receipt_ref.is_some()
    }
}
