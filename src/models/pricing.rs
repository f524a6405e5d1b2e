use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Категория места в рамках конфигурации цен. Создаётся административно,
/// на этапе бронирования - только чтение.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PricingAssignment {
    pub seat_id: i64,
    pub pricing_config_id: i64,
    pub tier: String,
}

/// Цена категории для конкретного события.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PricePoint {
    pub event_id: i64,
    pub tier: String,
    pub price: f64,
}
