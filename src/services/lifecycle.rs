//! lifecycle.rs
//!
//! Обработчик жизненного цикла заказа. Внешняя система заказов - просто
//! вызывающая сторона явного интерфейса событий `OrderLifecycle`, а не
//! фреймворк, дергающий хук по имени.
//!
//! Ключевые переходы журнала:
//! 1.  **held -> confirmed** при завершении покупки. Если холд успел
//!     истечь, а оплата всё же прошла, место подтверждается, гонка
//!     логируется для операторов: открываемся в сторону продажи, а не
//!     двойного бронирования.
//! 2.  **confirmed -> refunded** при полной отмене строки заказа - все
//!     места строки переходят вместе.
//! 3.  **confirmed|partially_refunded -> refunded|partially_refunded**
//!     при именных возвратах: затронуты только названные места, сумма
//!     копится, покрытие собственной цены места освобождает его.
//!
//! Повторная или запоздавшая доставка события - идемпотентный успех:
//! внешние доставки ретраятся и дублируются, падать на них нельзя.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::services::PricingResolver;
use crate::store::{ConfirmOutcome, RefundOutcome, RefundRequest, SeatStore};

/// Событие "покупка по строке заказа завершена".
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseCompleted {
    pub order_line_id: String,
    pub event_id: i64,
    pub seat_ids: Vec<i64>,
}

/// Именной возврат одного места.
#[derive(Debug, Clone, Deserialize)]
pub struct SeatRefund {
    pub seat_id: i64,
    pub amount: f64,
    pub reason: Option<String>,
}

/// Событие "возврат по строке заказа с перечислением мест".
#[derive(Debug, Clone, Deserialize)]
pub struct RefundIssued {
    pub order_line_id: String,
    pub event_id: i64,
    /// Идентификатор возврата во внешней системе; если не передан,
    /// генерируется на месте.
    pub refund_id: Option<Uuid>,
    pub seats: Vec<SeatRefund>,
}

/// Событие "строка заказа отменена целиком".
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCancelled {
    pub order_line_id: String,
    pub event_id: i64,
    pub refund_id: Option<Uuid>,
    pub amount: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ConfirmReport {
    pub confirmed: Vec<i64>,
    /// Места в несовместимом состоянии: для вызывающего это успех
    /// (доставка идемпотентна), для аудита - запись в логе.
    pub conflicts: Vec<i64>,
}

#[derive(Debug, Default, Serialize)]
pub struct RefundReport {
    /// Возврат покрыл место - оно освобождено.
    pub released: Vec<i64>,
    /// Частичный возврат - место остаётся занятым.
    pub partially_refunded: Vec<i64>,
    /// Записи не было или она уже в терминальном состоянии.
    pub untouched: Vec<i64>,
}

/// Интерфейс событий жизненного цикла, который реализует движок и
/// вызывает система заказов.
#[async_trait]
pub trait OrderLifecycle: Send + Sync {
    async fn on_purchase_completed(
        &self,
        event: PurchaseCompleted,
    ) -> Result<ConfirmReport, StoreError>;

    async fn on_refund(&self, event: RefundIssued) -> Result<RefundReport, StoreError>;

    async fn on_order_cancelled(&self, event: OrderCancelled) -> Result<Vec<i64>, StoreError>;
}

#[derive(Clone)]
pub struct LifecycleHandler {
    store: Arc<dyn SeatStore>,
    pricing: PricingResolver,
}

impl LifecycleHandler {
    pub fn new(store: Arc<dyn SeatStore>, pricing: PricingResolver) -> Self {
        Self { store, pricing }
    }

    pub async fn confirm_at(
        &self,
        event: &PurchaseCompleted,
        now: DateTime<Utc>,
    ) -> Result<ConfirmReport, StoreError> {
        let mut report = ConfirmReport::default();

        for &seat_id in &event.seat_ids {
            let outcome = self
                .store
                .confirm_seat(event.event_id, seat_id, &event.order_line_id, now)
                .await?;

            match outcome {
                ConfirmOutcome::Confirmed { hold_was_expired } => {
                    if hold_was_expired {
                        // оплата успела пройти по истёкшему холду
                        warn!(
                            event_id = event.event_id,
                            seat_id,
                            order_line_id = %event.order_line_id,
                            "confirmed seat whose hold had already expired"
                        );
                    }
                    report.confirmed.push(seat_id);
                }
                ConfirmOutcome::ConfirmedWithoutHold => {
                    warn!(
                        event_id = event.event_id,
                        seat_id,
                        order_line_id = %event.order_line_id,
                        "confirmed seat without a live hold (hold swept before payment landed)"
                    );
                    report.confirmed.push(seat_id);
                }
                ConfirmOutcome::AlreadyConfirmed => {
                    // повторная доставка - без побочных эффектов
                    report.confirmed.push(seat_id);
                }
                ConfirmOutcome::Conflict => {
                    warn!(
                        event_id = event.event_id,
                        seat_id,
                        order_line_id = %event.order_line_id,
                        "transition conflict on purchase completion, resolved idempotently"
                    );
                    report.conflicts.push(seat_id);
                }
            }
        }

        info!(
            event_id = event.event_id,
            order_line_id = %event.order_line_id,
            confirmed = report.confirmed.len(),
            conflicts = report.conflicts.len(),
            "purchase completion processed"
        );
        Ok(report)
    }

    pub async fn refund_at(
        &self,
        event: &RefundIssued,
        now: DateTime<Utc>,
    ) -> Result<RefundReport, StoreError> {
        let mut report = RefundReport::default();
        let refund_id = event.refund_id.unwrap_or_else(Uuid::new_v4);

        for seat_refund in &event.seats {
            // Цена места решает, покрыт ли возврат. Ошибка ценовой
            // конфигурации не блокирует возврат (деньги уже ушли):
            // фиксируем консервативно как частичный и шумим в лог.
            let seat_price = match self
                .pricing
                .seat_price(event.event_id, seat_refund.seat_id)
                .await
            {
                Ok(price) => Some(price),
                Err(e) => {
                    error!(
                        event_id = event.event_id,
                        seat_id = seat_refund.seat_id,
                        error = %e,
                        "cannot resolve seat price for refund, recording as partial"
                    );
                    None
                }
            };

            let request = RefundRequest {
                refund_id,
                amount: seat_refund.amount,
                reason: seat_refund.reason.clone(),
            };

            let outcome = self
                .store
                .apply_seat_refund(
                    event.event_id,
                    seat_refund.seat_id,
                    &request,
                    seat_price,
                    now,
                )
                .await?;

            match outcome {
                RefundOutcome::Refunded => report.released.push(seat_refund.seat_id),
                RefundOutcome::PartiallyRefunded => {
                    report.partially_refunded.push(seat_refund.seat_id)
                }
                RefundOutcome::NoOp => {
                    warn!(
                        event_id = event.event_id,
                        seat_id = seat_refund.seat_id,
                        order_line_id = %event.order_line_id,
                        "refund for seat without an active booking, resolved idempotently"
                    );
                    report.untouched.push(seat_refund.seat_id);
                }
            }
        }

        info!(
            event_id = event.event_id,
            order_line_id = %event.order_line_id,
            %refund_id,
            released = report.released.len(),
            partial = report.partially_refunded.len(),
            "refund processed"
        );
        Ok(report)
    }

    pub async fn cancel_at(
        &self,
        event: &OrderCancelled,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        let refund_id = event.refund_id.unwrap_or_else(Uuid::new_v4);
        let request = RefundRequest {
            refund_id,
            amount: event.amount,
            reason: event.reason.clone(),
        };

        let freed = self
            .store
            .cancel_order_line(event.event_id, &event.order_line_id, &request, now)
            .await?;

        info!(
            event_id = event.event_id,
            order_line_id = %event.order_line_id,
            released = freed.len(),
            "order line cancelled, seats released"
        );
        Ok(freed)
    }
}

#[async_trait]
impl OrderLifecycle for LifecycleHandler {
    async fn on_purchase_completed(
        &self,
        event: PurchaseCompleted,
    ) -> Result<ConfirmReport, StoreError> {
        self.confirm_at(&event, Utc::now()).await
    }

    async fn on_refund(&self, event: RefundIssued) -> Result<RefundReport, StoreError> {
        self.refund_at(&event, Utc::now()).await
    }

    async fn on_order_cancelled(&self, event: OrderCancelled) -> Result<Vec<i64>, StoreError> {
        self.cancel_at(&event, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, Seat};
    use crate::services::HoldManager;
    use crate::store::MemorySeatStore;

    async fn fixture() -> (Arc<MemorySeatStore>, HoldManager, LifecycleHandler) {
        let store = Arc::new(MemorySeatStore::new());
        for id in [1_i64, 2, 3] {
            store
                .add_seat(Seat {
                    id,
                    event_id: 100,
                    section: "C".to_string(),
                    row: 4,
                    number: 10 + id as i32,
                    is_active: true,
                })
                .await;
            store.assign_tier(id, 7, "standard").await;
        }
        store.set_event_pricing(100, 7).await;
        store.set_price_point(100, "standard", 25.0).await;

        let holds = HoldManager::new(store.clone(), 600);
        let pricing = PricingResolver::new(store.clone());
        let lifecycle = LifecycleHandler::new(store.clone(), pricing);
        (store, holds, lifecycle)
    }

    fn purchase(seats: &[i64]) -> PurchaseCompleted {
        PurchaseCompleted {
            order_line_id: "line-1".to_string(),
            event_id: 100,
            seat_ids: seats.to_vec(),
        }
    }

    #[tokio::test]
    async fn confirm_makes_hold_terminal() {
        let (store, holds, lifecycle) = fixture().await;
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1], now).await.unwrap();
        let report = lifecycle.confirm_at(&purchase(&[1]), now).await.unwrap();
        assert_eq!(report.confirmed, vec![1]);

        // ничья попытка захвата больше не проходит, пока нет возврата
        let other = holds.claim_at("sess-b", 100, &[1], now).await.unwrap();
        assert_eq!(other.rejected, vec![1]);

        let rec = store.booking(100, 1).await.unwrap().unwrap();
        assert_eq!(rec.status, BookingStatus::Confirmed);
        assert_eq!(rec.order_line_id.as_deref(), Some("line-1"));
    }

    #[tokio::test]
    async fn confirm_is_idempotent_on_redelivery() {
        let (_store, holds, lifecycle) = fixture().await;
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1], now).await.unwrap();
        lifecycle.confirm_at(&purchase(&[1]), now).await.unwrap();
        let replay = lifecycle.confirm_at(&purchase(&[1]), now).await.unwrap();
        assert_eq!(replay.confirmed, vec![1]);
        assert!(replay.conflicts.is_empty());
    }

    #[tokio::test]
    async fn expired_hold_still_confirms_after_payment() {
        let (store, holds, lifecycle) = fixture().await;
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1], now).await.unwrap();
        // холд истёк и был выметен до прихода оплаты
        let later = now + chrono::Duration::seconds(700);
        store.sweep_expired(later).await.unwrap();

        let report = lifecycle.confirm_at(&purchase(&[1]), later).await.unwrap();
        assert_eq!(report.confirmed, vec![1]);
        let rec = store.booking(100, 1).await.unwrap().unwrap();
        assert_eq!(rec.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn selective_refund_touches_only_named_seat() {
        let (store, holds, lifecycle) = fixture().await;
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1, 2], now).await.unwrap();
        lifecycle.confirm_at(&purchase(&[1, 2]), now).await.unwrap();

        let report = lifecycle
            .refund_at(
                &RefundIssued {
                    order_line_id: "line-1".to_string(),
                    event_id: 100,
                    refund_id: None,
                    seats: vec![SeatRefund {
                        seat_id: 1,
                        amount: 25.0,
                        reason: Some("changed plans".to_string()),
                    }],
                },
                now,
            )
            .await
            .unwrap();

        // 25.00 покрывает цену места целиком - место 1 освобождено
        assert_eq!(report.released, vec![1]);
        assert!(store.booking(100, 1).await.unwrap().is_none());

        // соседнее место строки осталось выкупленным
        let sibling = store.booking(100, 2).await.unwrap().unwrap();
        assert_eq!(sibling.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn partial_amount_keeps_seat_taken() {
        let (store, holds, lifecycle) = fixture().await;
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1], now).await.unwrap();
        lifecycle.confirm_at(&purchase(&[1]), now).await.unwrap();

        let refund = |amount: f64| RefundIssued {
            order_line_id: "line-1".to_string(),
            event_id: 100,
            refund_id: None,
            seats: vec![SeatRefund {
                seat_id: 1,
                amount,
                reason: None,
            }],
        };

        let first = lifecycle.refund_at(&refund(10.0), now).await.unwrap();
        assert_eq!(first.partially_refunded, vec![1]);
        let rec = store.booking(100, 1).await.unwrap().unwrap();
        assert_eq!(rec.status, BookingStatus::PartiallyRefunded);
        assert!(rec.refund.is_some());

        // суммы копятся: 10 + 15 покрывают цену 25 - место освобождено
        let second = lifecycle.refund_at(&refund(15.0), now).await.unwrap();
        assert_eq!(second.released, vec![1]);
        assert!(store.booking(100, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_cancellation_releases_whole_line() {
        let (store, holds, lifecycle) = fixture().await;
        let now = Utc::now();

        holds.claim_at("sess-a", 100, &[1, 2, 3], now).await.unwrap();
        lifecycle
            .confirm_at(&purchase(&[1, 2, 3]), now)
            .await
            .unwrap();

        let freed = lifecycle
            .cancel_at(
                &OrderCancelled {
                    order_line_id: "line-1".to_string(),
                    event_id: 100,
                    refund_id: None,
                    amount: 75.0,
                    reason: Some("event cancelled".to_string()),
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(freed, vec![1, 2, 3]);

        for seat_id in [1, 2, 3] {
            assert!(store.booking(100, seat_id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn refund_for_unknown_booking_is_noop() {
        let (_store, _holds, lifecycle) = fixture().await;
        let report = lifecycle
            .refund_at(
                &RefundIssued {
                    order_line_id: "line-9".to_string(),
                    event_id: 100,
                    refund_id: None,
                    seats: vec![SeatRefund {
                        seat_id: 3,
                        amount: 25.0,
                        reason: None,
                    }],
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(report.untouched, vec![3]);
    }
}
