//! errors.rs
//!
//! Таксономия ошибок движка бронирования.
//!
//! Правила распространения:
//! - ошибки уровня отдельного места (незнакомое место, живая конкурирующая
//!   заявка) не прерывают остальные места того же запроса - они отражаются
//!   в списке rejected;
//! - освобождение чужого холда и повторная доставка жизненного события -
//!   идемпотентный успех, логируется, наружу не поднимается;
//! - недоступность хранилища закрывает операцию: лучше отказать в продаже,
//!   чем продать место дважды.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Ошибки хранилища. Все операции над журналом заявок проходят через него.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// Строка журнала не прошла маппинг в закрытый статус.
    #[error("corrupted ledger row: {0}")]
    Corrupted(String),
}

/// Ошибки разрешения цены. Отсутствие цены для реально назначенной
/// категории - ошибка конфигурации, а не повод молча подставить дефолт.
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("seat {seat_id} is not in the registry for event {event_id}")]
    SeatUnknown { event_id: i64, seat_id: i64 },

    #[error("event {0} has no pricing configuration")]
    NoPricingConfig(i64),

    #[error("seat {seat_id} has no tier in pricing config {pricing_config_id}")]
    TierUnassigned { seat_id: i64, pricing_config_id: i64 },

    #[error("tier '{tier}' has no price point for event {event_id}")]
    TierNotConfigured { event_id: i64, tier: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ошибка HTTP-слоя. Пользователю всегда уходит формулировка про
/// доступность места, внутренние коды остаются в логах.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Недостаточно прав")]
    Unauthorized,

    #[error("Событие или место не найдено")]
    NotFound,

    #[error("Место больше недоступно")]
    SeatUnavailable,

    #[error("Ошибка конфигурации цен")]
    PricingConfig(#[source] PricingError),

    #[error("Сервис временно недоступен")]
    Store(#[from] StoreError),

    #[error("Внутренняя ошибка")]
    Internal(anyhow::Error),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            // тот же нестандартный 419, которым отвечает остальной стек
            AppError::SeatUnavailable => seat_conflict_status(),
            AppError::PricingConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 419 исторически используется фронтом как "конфликт за место".
pub fn seat_conflict_status() -> StatusCode {
    StatusCode::from_u16(419).unwrap_or(StatusCode::CONFLICT)
}

impl From<PricingError> for AppError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::SeatUnknown { .. } => AppError::NotFound,
            PricingError::NoPricingConfig(_)
            | PricingError::TierUnassigned { .. }
            | PricingError::TierNotConfigured { .. } => AppError::PricingConfig(e),
            PricingError::Store(s) => AppError::Store(s),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match &self {
            AppError::Validation(_) | AppError::NotFound => {
                tracing::debug!(%message, "client error");
            }
            AppError::Unauthorized | AppError::SeatUnavailable => {
                tracing::info!(%message, "rejected request");
            }
            AppError::PricingConfig(src) => {
                // ошибка конфигурации должна попасть к операторам
                tracing::error!(error = %src, "pricing configuration error");
            }
            AppError::Store(src) => {
                tracing::error!(error = %src, "store error, failing closed");
            }
            AppError::Internal(src) => {
                tracing::error!(error = ?src, "internal error");
            }
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_conflict_maps_to_419() {
        assert_eq!(AppError::SeatUnavailable.status_code().as_u16(), 419);
    }

    #[test]
    fn store_failure_fails_closed() {
        let err = AppError::Store(StoreError::Corrupted("bad row".to_string()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn user_facing_message_is_availability_feedback() {
        // наружу уходит формулировка про доступность, не внутренний код
        assert_eq!(AppError::SeatUnavailable.to_string(), "Место больше недоступно");
        let config_err = AppError::from(PricingError::TierNotConfigured {
            event_id: 100,
            tier: "premium".to_string(),
        });
        assert_eq!(config_err.to_string(), "Ошибка конфигурации цен");
    }
}
