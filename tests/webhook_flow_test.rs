//! Webhook dispatcher integration tests
//!
//! Real SQLite ledger, recording messenger in place of Telegram.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{callback_update, operator_config, RecordingMessenger, TestLedger, CUSTOMER_CHAT, OPERATOR_CHAT};
use timepiece_orders::core::config::Config;
use timepiece_orders::order::checkout::submit_receipt;
use timepiece_orders::order::transition::RejectReason;
use timepiece_orders::order::types::OrderStatus;
use timepiece_orders::storage::customers::{ensure_customer, link_customer_chat};
use timepiece_orders::storage::get_connection;
use timepiece_orders::storage::orders::{append_operator_note, attach_receipt, operator_message};
use timepiece_orders::telegram::{DispatchOutcome, WebhookDispatcher};

fn dispatcher(ledger: &TestLedger, messenger: &Arc<RecordingMessenger>, config: &Arc<Config>) -> WebhookDispatcher {
    WebhookDispatcher::new(Arc::clone(&ledger.pool), messenger.clone(), Arc::clone(config))
}

/// Order in `new` with the operator prompt already sent (message 100)
async fn paid_order(
    ledger: &TestLedger,
    messenger: &RecordingMessenger,
    config: &Config,
    customer: Option<&str>,
) -> i64 {
    let product = ledger.product("Noir Automatic", 10);
    let order = ledger.order_for(customer, product, 1);
    let order = submit_receipt(&ledger.pool, messenger, config, order.id, "payments/1.jpg")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::New);
    order.id
}

fn press(action: &str, order_id: i64, message_id: i32) -> Vec<u8> {
    callback_update(&format!("{}:{}", action, order_id), OPERATOR_CHAT, message_id)
}

#[tokio::test]
async fn test_end_to_end_flow_reaches_delivered() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;

    let prompts = messenger.calls_to("send_text");
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].chat_id, OPERATOR_CHAT);
    assert_eq!(
        prompts[0].buttons,
        Some(vec![format!("approve:{}", id), format!("reject:{}", id)])
    );

    let d = dispatcher(&ledger, &messenger, &config);
    let steps = [
        ("approve", OrderStatus::New, OrderStatus::Accepted),
        ("ship", OrderStatus::Accepted, OrderStatus::InProgress),
        ("deliver", OrderStatus::InProgress, OrderStatus::Delivered),
    ];
    for (action, from, to) in steps {
        let outcome = d.dispatch(&press(action, id, 100)).await;
        assert_eq!(outcome, DispatchOutcome::Applied { order_id: id, from, to });
        assert_eq!(ledger.status(id), to);
    }

    // Late press of a stale button
    let outcome = d.dispatch(&press("approve", id, 100)).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Terminal {
            order_id: id,
            status: OrderStatus::Delivered
        }
    );
    assert_eq!(ledger.status(id), OrderStatus::Delivered);
    assert_eq!(messenger.calls_to("answer_callback").len(), 4);
}

#[tokio::test]
async fn test_each_edit_offers_only_the_next_action() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;
    let d = dispatcher(&ledger, &messenger, &config);

    messenger.clear();
    d.dispatch(&press("approve", id, 100)).await;
    let edits = messenger.calls_to("edit_text");
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].message_id, Some(100));
    assert_eq!(edits[0].buttons, Some(vec![format!("ship:{}", id)]));
    assert!(edits[0].text.contains("Оплата подтверждена"));

    messenger.clear();
    d.dispatch(&press("ship", id, 100)).await;
    assert_eq!(messenger.calls_to("edit_text")[0].buttons, Some(vec![format!("deliver:{}", id)]));

    messenger.clear();
    d.dispatch(&press("deliver", id, 100)).await;
    assert_eq!(messenger.calls_to("edit_text")[0].buttons, Some(vec![]));
}

#[tokio::test]
async fn test_double_approve_applies_once() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;
    let d = dispatcher(&ledger, &messenger, &config);

    let first = d.dispatch(&press("approve", id, 100)).await;
    let second = d.dispatch(&press("approve", id, 100)).await;

    assert!(matches!(first, DispatchOutcome::Applied { .. }));
    match second {
        DispatchOutcome::Rejected(rejected) => {
            assert_eq!(rejected.from, OrderStatus::Accepted);
            assert_eq!(rejected.reason, RejectReason::IllegalTransition);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(ledger.status(id), OrderStatus::Accepted);
}

#[tokio::test]
async fn test_concurrent_presses_apply_at_most_once() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;
    let d = dispatcher(&ledger, &messenger, &config);

    let approve = press("approve", id, 100);
    let reject = press("reject", id, 100);
    let (a, b) = tokio::join!(d.dispatch(&approve), d.dispatch(&reject));

    let applied = [&a, &b]
        .iter()
        .filter(|o| matches!(o, DispatchOutcome::Applied { .. }))
        .count();
    assert_eq!(applied, 1, "{:?} / {:?}", a, b);
    assert!(matches!(
        ledger.status(id),
        OrderStatus::Accepted | OrderStatus::Cancelled
    ));
}

#[tokio::test]
async fn test_unknown_order_is_acknowledged_and_ignored() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let d = dispatcher(&ledger, &messenger, &config);

    let outcome = d.dispatch(&press("approve", 4242, 1)).await;
    assert_eq!(outcome, DispatchOutcome::OrderNotFound(4242));
    assert_eq!(messenger.calls_to("answer_callback").len(), 1);
    assert!(messenger.calls_to("edit_text").is_empty());
}

#[tokio::test]
async fn test_malformed_tokens_do_not_mutate() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;
    let d = dispatcher(&ledger, &messenger, &config);

    for data in [format!("approve{}", id), format!("approve:{}x", id), "noop".to_string(), format!("accept:{}", id)] {
        let outcome = d.dispatch(&callback_update(&data, OPERATOR_CHAT, 100)).await;
        assert!(matches!(outcome, DispatchOutcome::BadToken(_)), "{}: {:?}", data, outcome);
    }
    assert_eq!(ledger.status(id), OrderStatus::New);
}

#[tokio::test]
async fn test_foreign_payloads_are_ignored() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let d = dispatcher(&ledger, &messenger, &config);

    assert_eq!(d.dispatch(b"not json").await, DispatchOutcome::Ignored);
    assert_eq!(
        d.dispatch(br#"{"update_id": 5, "message": {"text": "/start"}}"#).await,
        DispatchOutcome::Ignored
    );
    assert!(messenger.calls().is_empty());
}

#[tokio::test]
async fn test_callback_from_other_chat_is_ignored() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;
    let d = dispatcher(&ledger, &messenger, &config);

    let outcome = d
        .dispatch(&callback_update(&format!("approve:{}", id), 999, 100))
        .await;
    assert_eq!(outcome, DispatchOutcome::ForeignChat(999));
    assert_eq!(ledger.status(id), OrderStatus::New);
}

#[tokio::test]
async fn test_customer_action_cannot_be_pressed_by_operator() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let product = ledger.product("Noir", 10);
    let order = ledger.order(product, 1);
    let d = dispatcher(&ledger, &messenger, &config);

    let outcome = d.dispatch(&press("submit_receipt", order.id, 1)).await;
    match outcome {
        DispatchOutcome::Rejected(rejected) => assert_eq!(rejected.reason, RejectReason::WrongActor),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(ledger.status(order.id), OrderStatus::AwaitingPayment);
}

#[tokio::test]
async fn test_reject_cancels_and_notifies_linked_customer() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, Some("alice")).await;
    {
        let conn = get_connection(&ledger.pool).unwrap();
        let customer = ensure_customer(&conn, "alice").unwrap();
        link_customer_chat(&conn, customer, CUSTOMER_CHAT).unwrap();
    }
    let d = dispatcher(&ledger, &messenger, &config);

    let outcome = d.dispatch(&press("reject", id, 100)).await;
    assert!(matches!(outcome, DispatchOutcome::Applied { to: OrderStatus::Cancelled, .. }));

    let order = ledger.get(id);
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.operator_note, "Оплата отклонена");

    let to_customer: Vec<_> = messenger
        .calls_to("send_text")
        .into_iter()
        .filter(|c| c.chat_id == CUSTOMER_CHAT)
        .collect();
    assert_eq!(to_customer.len(), 1);
    assert_eq!(
        to_customer[0].text,
        format!("❌ Оплата по заказу №{} отклонена. Свяжитесь с продавцом.", id)
    );

    let late = d.dispatch(&press("approve", id, 100)).await;
    assert!(matches!(late, DispatchOutcome::Terminal { .. }));
}

#[tokio::test]
async fn test_customer_without_chat_is_skipped() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, Some("bob")).await;
    let d = dispatcher(&ledger, &messenger, &config);

    messenger.clear();
    d.dispatch(&press("approve", id, 100)).await;
    assert!(messenger.calls_to("send_text").is_empty());
}

#[tokio::test]
async fn test_existing_operator_note_is_kept() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;
    {
        let conn = get_connection(&ledger.pool).unwrap();
        append_operator_note(&conn, id, "Позвонить заранее").unwrap();
    }

    dispatcher(&ledger, &messenger, &config)
        .dispatch(&press("approve", id, 100))
        .await;
    assert_eq!(ledger.get(id).operator_note, "Позвонить заранее");
}

#[tokio::test]
async fn test_delivery_failures_never_roll_back() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::failing();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;
    let d = dispatcher(&ledger, &messenger, &config);

    let outcome = d.dispatch(&press("approve", id, 100)).await;
    assert!(matches!(outcome, DispatchOutcome::Applied { .. }));
    assert_eq!(ledger.status(id), OrderStatus::Accepted);
}

#[tokio::test]
async fn test_recorded_message_wins_over_payload_ids() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = operator_config();
    let id = paid_order(&ledger, &messenger, &config, None).await;

    messenger.clear();
    dispatcher(&ledger, &messenger, &config)
        .dispatch(&press("approve", id, 999))
        .await;
    let edits = messenger.calls_to("edit_text");
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].message_id, Some(100));
}

#[tokio::test]
async fn test_payload_ids_used_without_recorded_message() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    messenger.reject_caption_edits();
    let config = operator_config();
    let product = ledger.product("Noir", 10);
    let order = ledger.order(product, 1);
    {
        let conn = get_connection(&ledger.pool).unwrap();
        assert!(attach_receipt(&conn, order.id, OrderStatus::AwaitingPayment, OrderStatus::New, "r.jpg").unwrap());
        assert_eq!(operator_message(&conn, order.id).unwrap(), None);
    }

    dispatcher(&ledger, &messenger, &config)
        .dispatch(&press("approve", order.id, 321))
        .await;

    let methods: Vec<_> = messenger
        .calls()
        .into_iter()
        .filter(|c| c.method.starts_with("edit_"))
        .map(|c| (c.method, c.message_id))
        .collect();
    assert_eq!(methods, vec![("edit_caption", Some(321)), ("edit_text", Some(321))]);
}

#[tokio::test]
async fn test_receipt_photo_prompt_and_caption_edit() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    let config = Arc::new(Config {
        operator_chat_id: Some(OPERATOR_CHAT),
        media_base_url: Some("https://shop.example/media/".parse().unwrap()),
        ..Config::default()
    });
    let id = paid_order(&ledger, &messenger, &config, None).await;

    let calls = messenger.calls();
    assert_eq!(calls[0].method, "send_photo");
    assert_eq!(calls[0].buttons.as_ref().map(Vec::len), Some(2));
    assert!(calls[0].text.chars().count() <= 1024);
    assert_eq!(calls[1].method, "send_text");
    assert_eq!(calls[1].buttons, None);

    {
        let conn = get_connection(&ledger.pool).unwrap();
        let binding = operator_message(&conn, id).unwrap().unwrap();
        assert!(binding.is_photo);
        assert_eq!(binding.message_id, 100);
    }

    messenger.clear();
    dispatcher(&ledger, &messenger, &config)
        .dispatch(&press("approve", id, 100))
        .await;
    let edits = messenger.calls_to("edit_caption");
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].message_id, Some(100));
}

#[tokio::test]
async fn test_refused_photo_falls_back_to_text_prompt() {
    let ledger = TestLedger::new();
    let messenger = RecordingMessenger::new();
    messenger.reject_photos();
    let config = Arc::new(Config {
        operator_chat_id: Some(OPERATOR_CHAT),
        media_base_url: Some("https://shop.example/media/".parse().unwrap()),
        ..Config::default()
    });
    let id = paid_order(&ledger, &messenger, &config, None).await;

    let methods: Vec<_> = messenger.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec!["send_photo", "send_text"]);
    let text = &messenger.calls_to("send_text")[0];
    assert_eq!(
        text.buttons,
        Some(vec![format!("approve:{}", id), format!("reject:{}", id)])
    );
}
