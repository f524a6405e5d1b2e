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
use crate::services::pricing::SeatPriceLine;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pricing", get(get_tier_and_price))
        .route("/pricing/quote", post(quote_selection))
}

// GET /api/pricing
#[derive(Debug, Deserialize)]
struct PricingQuery {
    event_id: i64,
    seat_id: i64,
}

async fn get_tier_and_price(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PricingQuery>,
) -> Result<impl IntoResponse, AppError> {
    if params.event_id <= 0 || params.seat_id <= 0 {
        return Err(AppError::Validation(
            "event_id и seat_id должны быть > 0".to_string(),
        ));
    }

    let line = state
        .pricing
        .tier_and_price(params.event_id, params.seat_id)
        .await?;
    Ok((StatusCode::OK, Json(line)))
}

// POST /api/pricing/quote
#[derive(Debug, Deserialize)]
struct QuoteRequest {
    event_id: i64,
    seat_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct QuoteResponse {
    /// Своя цена на каждое место; мультитарифный выбор никогда не
    /// схлопывается в один тариф.
    lines: Vec<SeatPriceLine>,
    total: f64,
}

async fn quote_selection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.event_id <= 0 {
        return Err(AppError::Validation("event_id должен быть > 0".to_string()));
    }
    if req.seat_ids.is_empty() {
        return Err(AppError::Validation("seat_ids не должен быть пустым".to_string()));
    }

    let lines = state.pricing.quote(req.event_id, &req.seat_ids).await?;
    let total = lines.iter().map(|l| l.price).sum();

    Ok((StatusCode::OK, Json(QuoteResponse { lines, total })))
}
