//! Operator prompt rendering.
//!
//! Pure: an [`Order`] snapshot in, HTML text and an inline keyboard out. The
//! buttons are derived from the status alone, so re-rendering after any
//! transition always yields the action set that is legal right now.

use rust_decimal::Decimal;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::html;

use crate::core::config::render::{CAPTION_LIMIT, CAPTION_PHONE_BUDGET, CURRENCY, MESSAGE_LIMIT, NOTE_BUDGET};
use crate::order::token::ActionToken;
use crate::order::transition::available_actions;
use crate::order::types::{Action, Actor, GeoPoint, Order, OrderStatus};

/// Rendered operator prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// HTML (`parse_mode = HTML`) message body
    pub body_text: String,
    /// Actions offered, in button order
    pub actions: Vec<Action>,
    /// Inline keyboard carrying one action token per button
    pub keyboard: InlineKeyboardMarkup,
}

/// Full prompt: contact details, items, total, status and buttons.
pub fn render(order: &Order) -> Notification {
    let actions = inline_actions(order.status);
    let keyboard = build_keyboard(order.id, &actions);

    let head = format!(
        "<b>🧾 Заказ #{}</b>\n\n\
         <b>Телефон:</b> {}\n\
         <b>Адрес:</b> {}{}",
        order.id,
        html::escape(&order.contact_phone),
        html::escape(&order.delivery_address_text),
        order.delivery_point.map(map_line).unwrap_or_default(),
    );

    let mut tail = format!(
        "\n\n<b>Сумма:</b> {} {}\n\n{}",
        format_amount(order.total_amount()),
        CURRENCY,
        status_line(order.status),
    );
    if !order.operator_note.is_empty() {
        tail.push_str(&format!(
            "\n<b>Комментарий:</b> {}",
            escape_within(&order.operator_note, NOTE_BUDGET)
        ));
    }
    if !actions.is_empty() {
        tail.push_str("\n\nВыберите действие:");
    }

    let items_header = "\n\n<b>Товары:</b>\n";
    let budget = MESSAGE_LIMIT.saturating_sub(char_len(&head) + char_len(items_header) + char_len(&tail));
    let body_text = format!("{}{}{}{}", head, items_header, items_block(order, budget), tail);

    Notification {
        body_text,
        actions,
        keyboard,
    }
}

/// Short prompt used as a receipt-photo caption (Telegram caps captions at 1024 chars).
///
/// The address gets whatever room the fixed lines leave, measured after escaping.
pub fn render_caption(order: &Order) -> Notification {
    let actions = inline_actions(order.status);
    let keyboard = build_keyboard(order.id, &actions);

    let head = format!(
        "<b>🧾 Чек оплаты #{}</b>\n\
         <b>Сумма:</b> {} {}\n\
         <b>Тел:</b> {}\n\
         <b>Адрес:</b> ",
        order.id,
        format_amount(order.total_amount()),
        CURRENCY,
        escape_within(&order.contact_phone, CAPTION_PHONE_BUDGET),
    );
    let tail = format!("\n{}", status_line(order.status));
    let budget = CAPTION_LIMIT.saturating_sub(char_len(&head) + char_len(&tail));
    let caption = format!("{}{}{}", head, escape_within(&order.delivery_address_text, budget), tail);

    Notification {
        body_text: caption,
        actions,
        keyboard,
    }
}

/// Operator buttons for a status: `new` → approve/reject, `accepted` → ship,
/// `in_progress` → deliver, nothing otherwise.
pub fn inline_actions(status: OrderStatus) -> Vec<Action> {
    available_actions(status, Actor::Operator)
}

/// One row of callback buttons, each carrying its action token. Actions
/// without a button label are skipped.
pub fn build_keyboard(order_id: i64, actions: &[Action]) -> InlineKeyboardMarkup {
    let row: Vec<InlineKeyboardButton> = actions
        .iter()
        .filter_map(|action| {
            let label = action.button_label()?;
            Some(InlineKeyboardButton::callback(label, ActionToken::new(*action, order_id).encode()))
        })
        .collect();

    if row.is_empty() {
        InlineKeyboardMarkup::new(Vec::<Vec<InlineKeyboardButton>>::new())
    } else {
        InlineKeyboardMarkup::new(vec![row])
    }
}

/// Yandex Maps link with a pin on the delivery point.
pub fn map_url(point: GeoPoint) -> String {
    format!("https://yandex.com/maps/?pt={},{}&z=16&l=map", point.lon, point.lat)
}

fn map_line(point: GeoPoint) -> String {
    format!(
        "\n<b>Карта:</b> <a href=\"{}\">Открыть в Яндекс Картах</a>",
        html::escape(&map_url(point))
    )
}

fn status_emoji(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::AwaitingPayment => "⏳",
        OrderStatus::New => "🧾",
        OrderStatus::Accepted => "✅",
        OrderStatus::InProgress => "🚚",
        OrderStatus::Delivered => "📦",
        OrderStatus::Cancelled => "❌",
    }
}

fn status_line(status: OrderStatus) -> String {
    format!("{} <b>Статус:</b> {}", status_emoji(status), status.label())
}

/// Numbered item lines; collapses the tail into a counter when over `budget` chars.
fn items_block(order: &Order, budget: usize) -> String {
    if order.line_items.is_empty() {
        return "—".to_string();
    }

    let mut block = String::new();
    for (i, item) in order.line_items.iter().enumerate() {
        let line = format!(
            "{}) <b>{}</b> × {} — {} {}\n",
            i + 1,
            html::escape(&item.product_name),
            item.quantity,
            format_amount(item.line_total()),
            CURRENCY,
        );
        let remaining = order.line_items.len() - i;
        let reserve = 32;
        if char_len(&block) + char_len(&line) + reserve > budget {
            block.push_str(&format!("… и ещё {} поз.\n", remaining));
            break;
        }
        block.push_str(&line);
    }
    block.trim_end().to_string()
}

/// Whole sums without decimals, anything else with two.
pub fn format_amount(amount: Decimal) -> String {
    let amount = amount.normalize();
    if amount.scale() == 0 {
        amount.to_string()
    } else {
        format!("{:.2}", amount)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// HTML-escape `s`, cut with `…` so the escaped text stays within `max` chars.
/// Never splits an entity.
fn escape_within(s: &str, max: usize) -> String {
    let escaped = html::escape(s);
    if char_len(&escaped) <= max {
        return escaped;
    }

    let mut out = String::new();
    let mut len = 0;
    let mut buf = [0u8; 4];
    for c in s.chars() {
        let piece = html::escape(c.encode_utf8(&mut buf));
        let piece_len = char_len(&piece);
        if len + piece_len + 1 > max {
            break;
        }
        len += piece_len;
        out.push_str(&piece);
    }
    if max > 0 {
        out.push('…');
    }
    out
}
