//! holds.rs
//!
//! Менеджер холдов: короткоживущие мягкие блокировки мест за сессией
//! покупателя. Захват частично-успешный: часть запрошенных мест может
//! быть принята, часть отклонена в одном вызове - отказ по одному месту
//! никогда не роняет соседей по запросу.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::models::BookingRecord;
use crate::store::{ClaimOutcome, SeatStore};

/// Результат батч-захвата. Отклонённые места покупатель перепроверяет
/// через резолвер доступности.
#[derive(Debug, Default, Serialize)]
pub struct ClaimReport {
    pub accepted: Vec<i64>,
    pub rejected: Vec<i64>,
}

#[derive(Clone)]
pub struct HoldManager {
    store: Arc<dyn SeatStore>,
    ttl: Duration,
}

impl HoldManager {
    pub fn new(store: Arc<dyn SeatStore>, ttl_seconds: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn claim(
        &self,
        session_id: &str,
        event_id: i64,
        seat_ids: &[i64],
    ) -> Result<ClaimReport, StoreError> {
        self.claim_at(session_id, event_id, seat_ids, Utc::now()).await
    }

    /// Захват с явным временем вызова. TTL каждого принятого места
    /// отсчитывается заново от `now`, в том числе при повторном захвате
    /// своей же сессией.
    pub async fn claim_at(
        &self,
        session_id: &str,
        event_id: i64,
        seat_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<ClaimReport, StoreError> {
        let mut report = ClaimReport::default();
        let expires_at = now + self.ttl;

        let mut requested: Vec<i64> = Vec::with_capacity(seat_ids.len());
        for seat_id in seat_ids {
            if !requested.contains(seat_id) {
                requested.push(*seat_id);
            }
        }

        for seat_id in requested {
            match self
                .store
                .try_claim(event_id, seat_id, session_id, expires_at, now)
                .await?
            {
                ClaimOutcome::Accepted => report.accepted.push(seat_id),
                ClaimOutcome::Rejected => {
                    debug!(event_id, seat_id, session_id, "claim rejected: seat taken");
                    report.rejected.push(seat_id);
                }
                ClaimOutcome::UnknownSeat => {
                    debug!(event_id, seat_id, "claim rejected: seat not in registry");
                    report.rejected.push(seat_id);
                }
            }
        }

        info!(
            event_id,
            session_id,
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "seat claim processed"
        );
        Ok(report)
    }

    pub async fn release(
        &self,
        session_id: &str,
        event_id: i64,
        seat_ids: &[i64],
    ) -> Result<u64, StoreError> {
        // Чужие и уже истёкшие холды - no-op, не ошибка: повторное
        // освобождение и подделка сессии не должны ничего ломать.
        let released = self.store.release_seats(event_id, session_id, seat_ids).await?;
        info!(event_id, session_id, released, "holds released");
        Ok(released)
    }

    /// SessionClaimSet: восстанавливается из журнала по требованию,
    /// авторитетной клиентской копии не существует.
    pub async fn session_claims(
        &self,
        session_id: &str,
        event_id: i64,
    ) -> Result<Vec<BookingRecord>, StoreError> {
        self.store
            .session_claims(event_id, session_id, Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Seat;
    use crate::store::MemorySeatStore;

    fn seat(id: i64, event_id: i64, row: i32, number: i32) -> Seat {
        Seat {
            id,
            event_id,
            section: "C".to_string(),
            row,
            number,
            is_active: true,
        }
    }

    async fn store_with_seats(event_id: i64, ids: &[i64]) -> Arc<MemorySeatStore> {
        let store = Arc::new(MemorySeatStore::new());
        for (i, id) in ids.iter().enumerate() {
            store.add_seat(seat(*id, event_id, 4, i as i32 + 1)).await;
        }
        store
    }

    #[tokio::test]
    async fn claim_is_partial_success() {
        let store = store_with_seats(100, &[1, 2]).await;
        let holds = HoldManager::new(store, 600);
        assert_eq!(holds.ttl(), Duration::seconds(600));
        let now = Utc::now();

        let first = holds.claim_at("sess-a", 100, &[1], now).await.unwrap();
        assert_eq!(first.accepted, vec![1]);

        // место 1 занято, место 2 свободно, места 99 не существует
        let second = holds.claim_at("sess-b", 100, &[1, 2, 99], now).await.unwrap();
        assert_eq!(second.accepted, vec![2]);
        assert_eq!(second.rejected, vec![1, 99]);
    }

    #[tokio::test]
    async fn rehold_by_same_session_refreshes_ttl() {
        let store = store_with_seats(100, &[1]).await;
        let holds = HoldManager::new(store.clone(), 600);
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1], now).await.unwrap();
        let later = now + Duration::seconds(500);
        let rehold = holds.claim_at("sess-a", 100, &[1], later).await.unwrap();
        assert_eq!(rehold.accepted, vec![1]);

        let claims = store.session_claims(100, "sess-a", later).await.unwrap();
        assert_eq!(claims[0].expires_at, Some(later + Duration::seconds(600)));
    }

    #[tokio::test]
    async fn expired_hold_does_not_block_new_claim() {
        let store = store_with_seats(100, &[1]).await;
        let holds = HoldManager::new(store, 600);
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1], now).await.unwrap();
        let after_ttl = now + Duration::seconds(601);
        let taken = holds.claim_at("sess-b", 100, &[1], after_ttl).await.unwrap();
        assert_eq!(taken.accepted, vec![1]);
    }

    #[tokio::test]
    async fn release_is_idempotent_and_owner_scoped() {
        let store = store_with_seats(100, &[1, 2]).await;
        let holds = HoldManager::new(store, 600);
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1, 2], now).await.unwrap();

        // чужая сессия ничего не освобождает и не получает ошибку
        assert_eq!(holds.release("sess-b", 100, &[1]).await.unwrap(), 0);
        // владелец освобождает; повторный вызов - успех с нулём
        assert_eq!(holds.release("sess-a", 100, &[1]).await.unwrap(), 1);
        assert_eq!(holds.release("sess-a", 100, &[1]).await.unwrap(), 0);
        // пустой список - освободить всё по событию
        assert_eq!(holds.release("sess-a", 100, &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_seat_ids_collapse() {
        let store = store_with_seats(100, &[1]).await;
        let holds = HoldManager::new(store, 600);
        let report = holds
            .claim_at("sess-a", 100, &[1, 1, 1], Utc::now())
            .await
            .unwrap();
        assert_eq!(report.accepted, vec![1]);
    }
}
