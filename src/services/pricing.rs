//! pricing.rs
//!
//! Резолвер ценовых категорий. Чистые детерминированные выборки без
//! общего изменяемого состояния: место -> категория (через конфигурацию
//! цен события), категория -> цена (через ценовые точки события).
//!
//! Цена разрешается для каждого места отдельно. Выбор из нескольких
//! категорий никогда не схлопывается в "первую попавшуюся" категорию -
//! строка котировки всегда несёт свою цену на каждое место.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::PricingError;
use crate::store::SeatStore;

/// Строка котировки: своя категория и цена на каждое место.
#[derive(Debug, Clone, Serialize)]
pub struct SeatPriceLine {
    pub seat_id: i64,
    pub tier: String,
    pub price: f64,
}

#[derive(Clone)]
pub struct PricingResolver {
    store: Arc<dyn SeatStore>,
}

impl PricingResolver {
    pub fn new(store: Arc<dyn SeatStore>) -> Self {
        Self { store }
    }

    /// Категория и цена одного места для события.
    pub async fn tier_and_price(
        &self,
        event_id: i64,
        seat_id: i64,
    ) -> Result<SeatPriceLine, PricingError> {
        let lines = self.quote(event_id, &[seat_id]).await?;
        lines
            .into_iter()
            .next()
            .ok_or(PricingError::SeatUnknown { event_id, seat_id })
    }

    /// Котировка выбора: по строке на каждое место, цены независимы.
    /// Категория без ценовой точки - ошибка конфигурации, которая должна
    /// дойти до операторов, а не превратиться в молчаливый дефолт.
    pub async fn quote(
        &self,
        event_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<SeatPriceLine>, PricingError> {
        let pricing_config_id = self
            .store
            .event_pricing_config(event_id)
            .await?
            .ok_or(PricingError::NoPricingConfig(event_id))?;
        let price_points = self.store.price_points_for_event(event_id).await?;

        let known = self.store.known_seat_ids(event_id, seat_ids).await?;

        let mut lines = Vec::with_capacity(seat_ids.len());
        for &seat_id in seat_ids {
            if !known.contains(&seat_id) {
                return Err(PricingError::SeatUnknown { event_id, seat_id });
            }
            let tier = self
                .store
                .tier_of(seat_id, pricing_config_id)
                .await?
                .ok_or(PricingError::TierUnassigned {
                    seat_id,
                    pricing_config_id,
                })?;
            let price = *price_points.get(&tier).ok_or_else(|| {
                PricingError::TierNotConfigured {
                    event_id,
                    tier: tier.clone(),
                }
            })?;
            lines.push(SeatPriceLine {
                seat_id,
                tier,
                price,
            });
        }
        Ok(lines)
    }

    /// Цена одного места; используется обработчиком возвратов, чтобы
    /// решить, покрывает ли накопленный возврат место целиком.
    pub async fn seat_price(&self, event_id: i64, seat_id: i64) -> Result<f64, PricingError> {
        Ok(self.tier_and_price(event_id, seat_id).await?.price)
    }
}
