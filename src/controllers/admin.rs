//! admin.rs
//!
//! Административный контур: блокировка/разблокировка мест и счётчики
//! журнала. Блокировка эквивалентна захвату, но без TTL и с причиной;
//! снятие блокировки не воскрешает прежний статус покупки.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::errors::AppError;
use crate::middleware::AdminUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/block", post(block_seats))
        .route("/admin/unblock", post(unblock_seats))
        .route("/admin/stats", get(get_ledger_stats))
}

// POST /api/admin/block
#[derive(Debug, Deserialize)]
struct BlockRequest {
    event_id: i64,
    seat_ids: Vec<i64>,
    reason: String,
}

#[derive(Debug, Serialize)]
struct BlockResponse {
    blocked: Vec<i64>,
    /// Уже заблокированные или неизвестные места; повтор - не ошибка.
    skipped: Vec<i64>,
}

async fn block_seats(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Json(req): Json<BlockRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.event_id <= 0 {
        return Err(AppError::Validation("event_id должен быть > 0".to_string()));
    }
    if req.seat_ids.is_empty() {
        return Err(AppError::Validation("seat_ids не должен быть пустым".to_string()));
    }
    if req.reason.trim().is_empty() {
        return Err(AppError::Validation("reason не должен быть пустым".to_string()));
    }

    let mut response = BlockResponse {
        blocked: Vec::new(),
        skipped: Vec::new(),
    };
    for &seat_id in &req.seat_ids {
        if state
            .store
            .block_seat(req.event_id, seat_id, &req.reason)
            .await?
        {
            response.blocked.push(seat_id);
        } else {
            response.skipped.push(seat_id);
        }
    }

    if !response.blocked.is_empty() {
        state.cache.invalidate_seats(req.event_id).await;
    }

    info!(
        admin = %admin.login,
        event_id = req.event_id,
        blocked = response.blocked.len(),
        reason = %req.reason,
        "seats blocked by admin"
    );
    Ok((StatusCode::OK, Json(response)))
}

// POST /api/admin/unblock
#[derive(Debug, Deserialize)]
struct UnblockRequest {
    event_id: i64,
    seat_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct UnblockResponse {
    unblocked: Vec<i64>,
}

async fn unblock_seats(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Json(req): Json<UnblockRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.event_id <= 0 {
        return Err(AppError::Validation("event_id должен быть > 0".to_string()));
    }

    let mut unblocked = Vec::new();
    for &seat_id in &req.seat_ids {
        if state.store.unblock_seat(req.event_id, seat_id).await? {
            unblocked.push(seat_id);
        }
    }

    if !unblocked.is_empty() {
        state.cache.invalidate_seats(req.event_id).await;
    }

    info!(
        admin = %admin.login,
        event_id = req.event_id,
        unblocked = unblocked.len(),
        "seats unblocked by admin"
    );
    Ok((StatusCode::OK, Json(UnblockResponse { unblocked })))
}

// GET /api/admin/stats
#[derive(Debug, Deserialize)]
struct StatsQuery {
    event_id: i64,
}

async fn get_ledger_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    if params.event_id <= 0 {
        return Err(AppError::Validation("event_id должен быть > 0".to_string()));
    }

    let stats = state
        .store
        .ledger_stats(params.event_id, chrono::Utc::now())
        .await?;
    Ok((StatusCode::OK, Json(stats)))
}
