//! availability.rs
//!
//! Резолвер доступности. Считает по требованию множество мест,
//! недоступных конкретной сессии: чужие живые холды, чужие выкупленные
//! и частично возвращённые места, все административные блокировки.
//!
//! Никогда не отвечает из кеша: единственное недопустимое направление
//! ошибки - показать занятое место свободным. Истёкшие холды
//! отфильтровывает само чтение, поэтому устаревание ограничено
//! независимо от частоты фонового выметания.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::store::SeatStore;

#[derive(Clone)]
pub struct AvailabilityResolver {
    store: Arc<dyn SeatStore>,
}

impl AvailabilityResolver {
    pub fn new(store: Arc<dyn SeatStore>) -> Self {
        Self { store }
    }

    /// Места, недоступные сессии `session_id`. Собственные заявки сессии
    /// в список не попадают: покупатель всегда видит свой текущий выбор
    /// как выбираемый/снимаемый.
    pub async fn unavailable_seats(
        &self,
        event_id: i64,
        session_id: Option<&str>,
    ) -> Result<Vec<i64>, StoreError> {
        self.unavailable_seats_at(event_id, session_id, Utc::now())
            .await
    }

    pub async fn unavailable_seats_at(
        &self,
        event_id: i64,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        self.store.unavailable_seats(event_id, session_id, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Seat;
    use crate::services::HoldManager;
    use crate::store::MemorySeatStore;
    use chrono::Duration;

    fn seat(id: i64, event_id: i64) -> Seat {
        Seat {
            id,
            event_id,
            section: "C".to_string(),
            row: 4,
            number: id as i32,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn own_holds_are_not_reported_unavailable() {
        let store = Arc::new(MemorySeatStore::new());
        store.add_seat(seat(1, 100)).await;
        store.add_seat(seat(2, 100)).await;

        let holds = HoldManager::new(store.clone(), 600);
        let availability = AvailabilityResolver::new(store);
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1], now).await.unwrap();

        let for_owner = availability
            .unavailable_seats_at(100, Some("sess-a"), now)
            .await
            .unwrap();
        assert!(for_owner.is_empty());

        let for_other = availability
            .unavailable_seats_at(100, Some("sess-b"), now)
            .await
            .unwrap();
        assert_eq!(for_other, vec![1]);
    }

    #[tokio::test]
    async fn hold_expires_exactly_at_ttl_boundary() {
        let store = Arc::new(MemorySeatStore::new());
        store.add_seat(seat(1, 100)).await;

        let holds = HoldManager::new(store.clone(), 600);
        let availability = AvailabilityResolver::new(store);
        let t0 = Utc::now();

        holds.claim_at("sess-a", 100, &[1], t0).await.unwrap();

        // до t+TTL место недоступно другим
        let before = availability
            .unavailable_seats_at(100, Some("sess-b"), t0 + Duration::seconds(599))
            .await
            .unwrap();
        assert_eq!(before, vec![1]);

        // с момента t+TTL - снова доступно
        let at_boundary = availability
            .unavailable_seats_at(100, Some("sess-b"), t0 + Duration::seconds(600))
            .await
            .unwrap();
        assert!(at_boundary.is_empty());
    }

    #[tokio::test]
    async fn blocked_seat_is_unavailable_to_everyone() {
        let store = Arc::new(MemorySeatStore::new());
        store.add_seat(seat(1, 100)).await;
        store.block_seat(100, 1, "technical row").await.unwrap();

        let availability = AvailabilityResolver::new(store);
        for session in [Some("sess-a"), Some("sess-b"), None] {
            let unavailable = availability
                .unavailable_seats_at(100, session, Utc::now())
                .await
                .unwrap();
            assert_eq!(unavailable, vec![1]);
        }
    }
}
