//! HTTP surface: Telegram webhook plus the storefront collaborator API.
//!
//! Routes:
//! - `POST /telegram/webhook`: operator callbacks, always `200 {"ok": true}`
//! - `POST /api/orders`: checkout
//! - `POST /api/orders/{id}/receipt`: receipt upload
//! - `GET  /api/orders/{id}`: status query
//! - `GET  /health`

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::gateway::Messenger;
use super::render::inline_actions;
use super::webhook::WebhookDispatcher;
use crate::core::config::{Config, WEBHOOK_SECRET_HEADER};
use crate::core::error::AppError;
use crate::order::checkout::{place_order, submit_receipt, CheckoutRequest};
use crate::order::types::{Action, Order};
use crate::storage::db::{get_connection, DbPool};
use crate::storage::orders::get_order;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<DbPool>,
    pub messenger: Arc<dyn Messenger>,
    pub config: Arc<Config>,
    dispatcher: WebhookDispatcher,
}

impl AppState {
    pub fn new(pool: Arc<DbPool>, messenger: Arc<dyn Messenger>, config: Arc<Config>) -> Self {
        let dispatcher = WebhookDispatcher::new(Arc::clone(&pool), Arc::clone(&messenger), Arc::clone(&config));
        Self {
            pool,
            messenger,
            config,
            dispatcher,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/telegram/webhook", post(telegram_webhook_handler))
        .route("/api/orders", post(create_order_handler))
        .route("/api/orders/{id}", get(order_status_handler))
        .route("/api/orders/{id}/receipt", post(submit_receipt_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn run_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = create_router(state);

    log::info!("Starting HTTP server on http://{}", addr);
    log::info!("  POST /telegram/webhook         - Telegram updates");
    log::info!("  POST /api/orders               - Checkout");
    log::info!("  POST /api/orders/{{id}}/receipt  - Receipt upload");
    log::info!("  GET  /api/orders/{{id}}          - Order status");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Telegram webhook
// ============================================================================

/// POST /telegram/webhook
///
/// The answer never depends on the outcome: a non-2xx would make Telegram
/// redeliver the update.
async fn telegram_webhook_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(expected) = state.config.webhook_secret.as_deref() {
        let provided = headers.get(WEBHOOK_SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            log::warn!("Webhook call with missing or wrong secret token, ignored");
            return webhook_ack();
        }
    }

    let outcome = state.dispatcher.dispatch(&body).await;
    log::debug!("Webhook outcome: {:?}", outcome);
    webhook_ack()
}

fn webhook_ack() -> Response {
    (StatusCode::OK, Json(json!({"ok": true}))).into_response()
}

// ============================================================================
// Collaborator API
// ============================================================================

/// Order as returned by the API, with derived fields.
#[derive(Debug, Serialize)]
struct OrderView {
    #[serde(flatten)]
    order: Order,
    total_amount: Decimal,
    status_label: &'static str,
    operator_actions: Vec<Action>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            total_amount: order.total_amount(),
            status_label: order.status.label(),
            operator_actions: inline_actions(order.status),
            order,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReceiptRequest {
    receipt_ref: String,
}

/// POST /api/orders
async fn create_order_handler(State(state): State<AppState>, Json(request): Json<CheckoutRequest>) -> Response {
    match place_order(&state.pool, &state.config, &request) {
        Ok(order) => (StatusCode::CREATED, Json(OrderView::from(order))).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/orders/{id}/receipt
async fn submit_receipt_handler(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<ReceiptRequest>,
) -> Response {
    match submit_receipt(
        &state.pool,
        state.messenger.as_ref(),
        &state.config,
        id,
        &request.receipt_ref,
    )
    .await
    {
        Ok(order) => Json(OrderView::from(order)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/orders/{id}
async fn order_status_handler(Path(id): Path<i64>, State(state): State<AppState>) -> Response {
    let result = get_connection(&state.pool).and_then(|conn| get_order(&conn, id));
    match result {
        Ok(Some(order)) => Json(OrderView::from(order)).into_response(),
        Ok(None) => error_response(AppError::OrderNotFound(id)),
        Err(e) => error_response(e),
    }
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn error_response(err: AppError) -> Response {
    let status = match &err {
        AppError::Validation(_) | AppError::ProductNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        AppError::Rejected(_) => StatusCode::CONFLICT,
        _ => {
            log::error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}
