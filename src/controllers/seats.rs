use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::AppError;
use crate::models::BookingStatus;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/seats", get(get_seats))
        .route("/availability", get(get_availability))
        .route("/session/claims", get(get_session_claims))
        .route("/seats/hold", post(hold_seats))
        .route("/seats/release", post(release_seats))
}

/* ---------- helpers ---------- */

fn require_event_id(event_id: i64) -> Result<(), AppError> {
    if event_id <= 0 {
        return Err(AppError::Validation("event_id должен быть > 0".to_string()));
    }
    Ok(())
}

fn require_session_id(session_id: &str) -> Result<(), AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::Validation("session_id не должен быть пустым".to_string()));
    }
    Ok(())
}

/// Статус места в презентационной выдаче.
fn view_status(status: Option<BookingStatus>) -> &'static str {
    match status {
        None | Some(BookingStatus::Refunded) => "FREE",
        Some(BookingStatus::Held) => "HELD",
        Some(BookingStatus::Confirmed) | Some(BookingStatus::PartiallyRefunded) => "SOLD",
        Some(BookingStatus::Blocked) => "BLOCKED",
    }
}

/* ---------- SEAT MAP ---------- */

// GET /api/seats
#[derive(Debug, Deserialize)]
struct SeatsQuery {
    event_id: i64,
    page: Option<u32>,
    #[serde(rename = "pageSize")]
    page_size: Option<u32>,
    row: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SeatView {
    id: i64,
    section: String,
    row: i32,
    number: i32,
    status: String,
}

async fn load_seat_map(
    state: &AppState,
    event_id: i64,
) -> Result<Vec<SeatView>, AppError> {
    // Карта мест - презентационная выдача, её можно отдавать из кеша:
    // каждая мутация журнала кеш сбрасывает.
    if state.config.features.enable_seat_map_cache {
        if let Some(cached) = state.cache.get_seat_map(event_id).await {
            if let Ok(views) = serde_json::from_str::<Vec<SeatView>>(&cached) {
                return Ok(views);
            }
        }
    }

    let seats = state.store.seats_for_event(event_id).await?;
    let claims = state.store.event_claims(event_id, chrono::Utc::now()).await?;

    let views: Vec<SeatView> = seats
        .into_iter()
        .filter(|s| s.is_active)
        .map(|s| SeatView {
            id: s.id,
            section: s.section,
            row: s.row,
            number: s.number,
            status: view_status(claims.get(&s.id).copied()).to_string(),
        })
        .collect();

    if state.config.features.enable_seat_map_cache {
        if let Ok(payload) = serde_json::to_string(&views) {
            state.cache.save_seat_map(event_id, &payload).await;
        }
    }
    Ok(views)
}

async fn get_seats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SeatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_event_id(params.event_id)?;
    if let Some(r) = params.row {
        if r <= 0 {
            return Err(AppError::Validation("row должен быть > 0".to_string()));
        }
    }

    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 100);
    let offset = ((page - 1) * page_size) as usize;

    let mut views = load_seat_map(&state, params.event_id).await?;
    if let Some(r) = params.row {
        views.retain(|v| v.row == r);
    }
    let payload: Vec<SeatView> = views
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect();

    Ok((StatusCode::OK, Json(payload)))
}

/* ---------- AVAILABILITY ---------- */

// GET /api/availability
#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    event_id: i64,
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AvailabilityResponse {
    unavailable_seat_ids: Vec<i64>,
}

async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_event_id(params.event_id)?;

    // всегда из журнала, мимо кеша
    let unavailable = state
        .availability
        .unavailable_seats(params.event_id, params.session_id.as_deref())
        .await?;

    Ok((
        StatusCode::OK,
        Json(AvailabilityResponse {
            unavailable_seat_ids: unavailable,
        }),
    ))
}

/* ---------- SESSION CLAIMS ---------- */

// GET /api/session/claims
#[derive(Debug, Deserialize)]
struct SessionClaimsQuery {
    event_id: i64,
    session_id: String,
}

#[derive(Debug, Serialize)]
struct SessionClaimView {
    seat_id: i64,
    status: BookingStatus,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn get_session_claims(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SessionClaimsQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_event_id(params.event_id)?;
    require_session_id(&params.session_id)?;

    let claims = state
        .holds
        .session_claims(&params.session_id, params.event_id)
        .await?;

    let payload: Vec<SessionClaimView> = claims
        .into_iter()
        .map(|rec| SessionClaimView {
            seat_id: rec.seat_id,
            status: rec.status,
            expires_at: rec.expires_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(payload)))
}

/* ---------- HOLD / RELEASE ---------- */

// POST /api/seats/hold
#[derive(Debug, Deserialize)]
struct HoldRequest {
    event_id: i64,
    session_id: String,
    seat_ids: Vec<i64>,
}

async fn hold_seats(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HoldRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_event_id(req.event_id)?;
    require_session_id(&req.session_id)?;
    if req.seat_ids.is_empty() {
        return Err(AppError::Validation("seat_ids не должен быть пустым".to_string()));
    }

    // частичный успех: отказ по месту не роняет остальные
    let report = state
        .holds
        .claim(&req.session_id, req.event_id, &req.seat_ids)
        .await?;

    if !report.accepted.is_empty() {
        state.cache.invalidate_seats(req.event_id).await;
    }

    Ok((StatusCode::OK, Json(report)))
}

// POST /api/seats/release
#[derive(Debug, Deserialize)]
struct ReleaseRequest {
    event_id: i64,
    session_id: String,
    /// Пустой список - освободить всё, что сессия держит по событию.
    #[serde(default)]
    seat_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct ReleaseResponse {
    released: u64,
}

async fn release_seats(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReleaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_event_id(req.event_id)?;
    require_session_id(&req.session_id)?;

    let released = state
        .holds
        .release(&req.session_id, req.event_id, &req.seat_ids)
        .await?;

    if released > 0 {
        state.cache.invalidate_seats(req.event_id).await;
    }

    Ok((StatusCode::OK, Json(ReleaseResponse { released })))
}
