//! sweeper.rs
//!
//! Фоновое выметание истёкших холдов. Таймаут холда - это данные
//! (expires_at в журнале), а не живой таймер: если процесс, создавший
//! холд, упал или клиент отвалился, место всё равно освободится здесь
//! или при ближайшем ленивом чтении доступности.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::cache::CacheService;
use crate::errors::StoreError;
use crate::store::SeatStore;

pub struct ExpirySweeper {
    store: Arc<dyn SeatStore>,
    cache: Option<CacheService>,
    /// Всего освобождено за время жизни процесса, для мониторинга.
    released_total: AtomicU64,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn SeatStore>, cache: Option<CacheService>) -> Self {
        Self {
            store,
            cache,
            released_total: AtomicU64::new(0),
        }
    }

    /// Один проход выметания. Безопасен при конкурентных захватах:
    /// условие `expires_at <= now` перепроверяется самим удалением в
    /// хранилище, продлённый после снимка холд не разрушается.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let swept = self.store.sweep_expired(now).await?;

        if swept.is_empty() {
            info!("🧹 No expired holds to sweep");
            return Ok(0);
        }

        let released = swept.len() as u64;
        self.released_total.fetch_add(released, Ordering::Relaxed);

        // инвалидируем карту мест каждого затронутого события
        let events: BTreeSet<i64> = swept.iter().map(|s| s.event_id).collect();
        if let Some(cache) = &self.cache {
            for event_id in &events {
                cache.invalidate_seats(*event_id).await;
            }
        }

        info!(
            released,
            events = events.len(),
            "🧹 Swept expired holds"
        );
        Ok(released)
    }

    pub fn released_total(&self) -> u64 {
        self.released_total.load(Ordering::Relaxed)
    }

    /// Бесконечный цикл для фоновой задачи процесса.
    pub async fn run(self: Arc<Self>, interval: std::time::Duration) {
        loop {
            if let Err(e) = self.sweep(Utc::now()).await {
                // ошибки выметания не глотаем: лог + повтор на следующем тике
                error!("sweep failed: {:?}", e);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, Seat};
    use crate::services::{HoldManager, LifecycleHandler, PricingResolver};
    use crate::services::lifecycle::PurchaseCompleted;
    use chrono::Duration;

    async fn fixture() -> (Arc<MemStore>, HoldManager, ExpirySweeper) {
        let store = Arc::new(crate::store::MemorySeatStore::new());
        for id in [1_i64, 2] {
            store
                .add_seat(Seat {
                    id,
                    event_id: 100,
                    section: "C".to_string(),
                    row: 4,
                    number: id as i32,
                    is_active: true,
                })
                .await;
        }
        let holds = HoldManager::new(store.clone(), 600);
        let sweeper = ExpirySweeper::new(store.clone(), None);
        (store, holds, sweeper)
    }

    type MemStore = crate::store::MemorySeatStore;

    #[tokio::test]
    async fn sweep_releases_only_expired_holds() {
        let (store, holds, sweeper) = fixture().await;
        let t0 = Utc::now();

        holds.claim_at("sess-a", 100, &[1], t0).await.unwrap();
        holds
            .claim_at("sess-b", 100, &[2], t0 + Duration::seconds(300))
            .await
            .unwrap();

        // на t0+601 истёк только первый холд
        let released = sweeper.sweep(t0 + Duration::seconds(601)).await.unwrap();
        assert_eq!(released, 1);
        assert_eq!(sweeper.released_total(), 1);
        assert!(store.booking(100, 1).await.unwrap().is_none());
        assert_eq!(
            store.booking(100, 2).await.unwrap().unwrap().status,
            BookingStatus::Held
        );
    }

    #[tokio::test]
    async fn sweep_never_touches_confirmed_or_blocked() {
        let (store, holds, sweeper) = fixture().await;
        let t0 = Utc::now();

        holds.claim_at("sess-a", 100, &[1], t0).await.unwrap();
        let pricing = PricingResolver::new(store.clone());
        let lifecycle = LifecycleHandler::new(store.clone(), pricing);
        lifecycle
            .confirm_at(
                &PurchaseCompleted {
                    order_line_id: "line-1".to_string(),
                    event_id: 100,
                    seat_ids: vec![1],
                },
                t0,
            )
            .await
            .unwrap();
        store.block_seat(100, 2, "tech").await.unwrap();

        let released = sweeper.sweep(t0 + Duration::days(30)).await.unwrap();
        assert_eq!(released, 0);
        assert_eq!(
            store.booking(100, 1).await.unwrap().unwrap().status,
            BookingStatus::Confirmed
        );
        assert_eq!(
            store.booking(100, 2).await.unwrap().unwrap().status,
            BookingStatus::Blocked
        );
    }

    #[tokio::test]
    async fn renewed_hold_survives_sweep() {
        let (store, holds, sweeper) = fixture().await;
        let t0 = Utc::now();

        holds.claim_at("sess-a", 100, &[1], t0).await.unwrap();
        // продление после того, как выметальщик "увидел" бы истечение
        holds
            .claim_at("sess-a", 100, &[1], t0 + Duration::seconds(590))
            .await
            .unwrap();

        let released = sweeper.sweep(t0 + Duration::seconds(601)).await.unwrap();
        assert_eq!(released, 0);
        assert!(store.booking(100, 1).await.unwrap().is_some());
    }
}
