//! Common test utilities
//!
//! This module is shared across all integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use teloxide::types::InlineKeyboardMarkup;

use timepiece_orders::core::config::Config;
use timepiece_orders::order::checkout::{place_order, CheckoutRequest};
use timepiece_orders::order::types::{Order, OrderStatus};
use timepiece_orders::storage::catalog::{insert_product, NewProduct};
use timepiece_orders::storage::orders::{get_order, NewOrderLine};
use timepiece_orders::storage::{create_pool, get_connection, DbPool};
use timepiece_orders::telegram::gateway::{DeliveryError, DeliveryResult, MessageRef, Messenger, PhotoSource};

pub const OPERATOR_CHAT: i64 = 555;
pub const CUSTOMER_CHAT: i64 = 777;

/// Temporary SQLite ledger, removed when dropped
pub struct TestLedger {
    _dir: TempDir,
    pub pool: Arc<DbPool>,
}

impl TestLedger {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("orders.sqlite");
        let pool = create_pool(path.to_str().expect("utf-8 path")).expect("pool");
        Self {
            _dir: dir,
            pool: Arc::new(pool),
        }
    }

    pub fn product(&self, name: &str, price: i64) -> i64 {
        let conn = get_connection(&self.pool).unwrap();
        insert_product(
            &conn,
            &NewProduct {
                name,
                tag: "",
                description: "",
                price,
                sort_order: 0,
            },
        )
        .unwrap()
    }

    /// Order in `awaiting_payment` for one product line
    pub fn order(&self, product_ref: i64, quantity: u32) -> Order {
        self.order_for(None, product_ref, quantity)
    }

    pub fn order_for(&self, customer: Option<&str>, product_ref: i64, quantity: u32) -> Order {
        place_order(&self.pool, &Config::default(), &checkout(customer, product_ref, quantity)).unwrap()
    }

    pub fn get(&self, order_id: i64) -> Order {
        let conn = get_connection(&self.pool).unwrap();
        get_order(&conn, order_id).unwrap().expect("order exists")
    }

    pub fn status(&self, order_id: i64) -> OrderStatus {
        self.get(order_id).status
    }
}

pub fn checkout(customer: Option<&str>, product_ref: i64, quantity: u32) -> CheckoutRequest {
    CheckoutRequest {
        customer: customer.map(str::to_string),
        contact_phone: "+998 90 123 45 67".to_string(),
        delivery_address_text: "Ташкент, Чиланзар 5".to_string(),
        delivery_lat: Some(41.28),
        delivery_lon: Some(69.2),
        items: vec![NewOrderLine { product_ref, quantity }],
    }
}

/// Config with an operator chat and no token (the messenger is injected)
pub fn operator_config() -> Arc<Config> {
    Arc::new(Config {
        operator_chat_id: Some(OPERATOR_CHAT),
        ..Config::default()
    })
}

/// Telegram update carrying a button press
pub fn callback_update(data: &str, chat_id: i64, message_id: i32) -> Vec<u8> {
    serde_json::json!({
        "update_id": 1,
        "callback_query": {
            "id": format!("cb-{}", message_id),
            "from": {"id": 42, "is_bot": false, "first_name": "Operator"},
            "chat_instance": "1",
            "data": data,
            "message": {
                "message_id": message_id,
                "date": 1_700_000_000,
                "chat": {"id": chat_id, "type": "private", "first_name": "Operator"},
                "text": "prompt"
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// Callback data of every button in a keyboard, row by row
pub fn button_tokens(keyboard: &InlineKeyboardMarkup) -> Vec<String> {
    let value = serde_json::to_value(keyboard).unwrap();
    value["inline_keyboard"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .flat_map(|row| row.as_array().cloned().unwrap_or_default())
                .filter_map(|button| button["callback_data"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// One outbound call seen by [`RecordingMessenger`]
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub chat_id: i64,
    pub message_id: Option<i32>,
    pub text: String,
    pub buttons: Option<Vec<String>>,
}

/// In-memory messenger that records every call
#[derive(Default)]
pub struct RecordingMessenger {
    calls: Mutex<Vec<Call>>,
    next_message_id: AtomicI32,
    fail_everything: AtomicBool,
    reject_photos: AtomicBool,
    reject_caption_edits: AtomicBool,
}

impl RecordingMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_message_id: AtomicI32::new(100),
            ..Self::default()
        })
    }

    /// Every call times out
    pub fn failing() -> Arc<Self> {
        let messenger = Self::new();
        messenger.fail_everything.store(true, Ordering::SeqCst);
        messenger
    }

    pub fn reject_photos(&self) {
        self.reject_photos.store(true, Ordering::SeqCst);
    }

    /// Behave like a text message: caption edits are refused
    pub fn reject_caption_edits(&self) {
        self.reject_caption_edits.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(
        &self,
        method: &'static str,
        chat_id: i64,
        message_id: Option<i32>,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> DeliveryResult<()> {
        self.calls.lock().unwrap().push(Call {
            method,
            chat_id,
            message_id,
            text: text.to_string(),
            buttons: keyboard.map(button_tokens),
        });
        if self.fail_everything.load(Ordering::SeqCst) {
            return Err(DeliveryError::Timeout);
        }
        Ok(())
    }

    fn sent(&self, chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> DeliveryResult<MessageRef> {
        self.record("send_text", chat_id, None, text, keyboard.as_ref())?;
        Ok(self.sent(chat_id))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _photo: &PhotoSource,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> DeliveryResult<MessageRef> {
        self.record("send_photo", chat_id, None, caption, keyboard.as_ref())?;
        if self.reject_photos.load(Ordering::SeqCst) {
            return Err(DeliveryError::Api("Bad Request: wrong file identifier".to_string()));
        }
        Ok(self.sent(chat_id))
    }

    async fn edit_text(&self, target: MessageRef, text: &str, keyboard: InlineKeyboardMarkup) -> DeliveryResult<()> {
        self.record("edit_text", target.chat_id, Some(target.message_id), text, Some(&keyboard))
    }

    async fn edit_caption(
        &self,
        target: MessageRef,
        caption: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> DeliveryResult<()> {
        self.record(
            "edit_caption",
            target.chat_id,
            Some(target.message_id),
            caption,
            Some(&keyboard),
        )?;
        if self.reject_caption_edits.load(Ordering::SeqCst) {
            return Err(DeliveryError::Api(
                "Bad Request: there is no caption in the message to edit".to_string(),
            ));
        }
        Ok(())
    }

    async fn edit_actions(&self, target: MessageRef, keyboard: InlineKeyboardMarkup) -> DeliveryResult<()> {
        self.record("edit_actions", target.chat_id, Some(target.message_id), "", Some(&keyboard))
    }

    async fn answer_callback(&self, callback_id: &str) -> DeliveryResult<()> {
        self.record("answer_callback", 0, None, callback_id, None)
    }
}
