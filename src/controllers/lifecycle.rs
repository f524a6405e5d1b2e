use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::errors::AppError;
use crate::services::lifecycle::{OrderCancelled, PurchaseCompleted, RefundIssued};
use crate::services::OrderLifecycle;
use crate::AppState;

/// Точки входа внешней системы заказов. Повторная доставка любого из
/// событий - идемпотентный успех: здесь никогда не отвечают ошибкой на
/// дубликат, иначе ретраи чужого пайплайна превращаются в шторм.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/confirm", post(confirm_order))
        .route("/orders/refund", post(refund_order))
        .route("/orders/cancel", post(cancel_order))
}

fn validate_order_line(order_line_id: &str, event_id: i64) -> Result<(), AppError> {
    if event_id <= 0 {
        return Err(AppError::Validation("event_id должен быть > 0".to_string()));
    }
    if order_line_id.trim().is_empty() {
        return Err(AppError::Validation(
            "order_line_id не должен быть пустым".to_string(),
        ));
    }
    Ok(())
}

// POST /api/orders/confirm
async fn confirm_order(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PurchaseCompleted>,
) -> Result<impl IntoResponse, AppError> {
    validate_order_line(&event.order_line_id, event.event_id)?;
    if event.seat_ids.is_empty() {
        return Err(AppError::Validation("seat_ids не должен быть пустым".to_string()));
    }

    let event_id = event.event_id;
    let report = state.lifecycle.on_purchase_completed(event).await?;

    state.cache.invalidate_seats(event_id).await;
    Ok((StatusCode::OK, Json(report)))
}

// POST /api/orders/refund
async fn refund_order(
    State(state): State<Arc<AppState>>,
    Json(event): Json<RefundIssued>,
) -> Result<impl IntoResponse, AppError> {
    validate_order_line(&event.order_line_id, event.event_id)?;
    if event.seats.is_empty() {
        return Err(AppError::Validation("seats не должен быть пустым".to_string()));
    }
    if event.seats.iter().any(|s| s.amount < 0.0) {
        return Err(AppError::Validation("amount не может быть отрицательным".to_string()));
    }

    let event_id = event.event_id;
    let report = state.lifecycle.on_refund(event).await?;

    state.cache.invalidate_seats(event_id).await;
    Ok((StatusCode::OK, Json(report)))
}

// POST /api/orders/cancel
#[derive(Debug, Serialize)]
struct CancelResponse {
    released_seat_ids: Vec<i64>,
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Json(event): Json<OrderCancelled>,
) -> Result<impl IntoResponse, AppError> {
    validate_order_line(&event.order_line_id, event.event_id)?;

    let event_id = event.event_id;
    let released = state.lifecycle.on_order_cancelled(event).await?;

    state.cache.invalidate_seats(event_id).await;
    Ok((
        StatusCode::OK,
        Json(CancelResponse {
            released_seat_ids: released,
        }),
    ))
}
