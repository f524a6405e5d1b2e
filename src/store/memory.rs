//! memory.rs
//!
//! In-memory реализация репозитория на `tokio::sync::Mutex`: тот же
//! контракт атомарности, что и у Postgres-реализации, только шлюзом
//! служит мьютекс вместо частичного уникального индекса. Используется
//! тестами и офлайн-прогонами без внешних сервисов.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::models::{BookingRecord, BookingStatus, RefundInfo, Seat};

use super::{
    ClaimOutcome, ConfirmOutcome, LedgerStats, RefundRequest, SeatStore, SweptHold,
};

const REFUND_EPSILON: f64 = 1e-6;

#[derive(Default)]
struct Inner {
    seats: HashMap<i64, Seat>,
    /// Живые заявки (held/confirmed/partially_refunded) по (event, seat).
    ledger: HashMap<(i64, i64), BookingRecord>,
    /// Блокировки - отдельно: они ортогональны статусу покупки.
    blocks: HashMap<(i64, i64), BookingRecord>,
    /// Конфигурация цен события.
    event_pricing: HashMap<i64, i64>,
    /// (seat_id, pricing_config_id) -> tier.
    assignments: HashMap<(i64, i64), String>,
    /// (event_id, tier) -> price.
    price_points: HashMap<(i64, String), f64>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn seat_known(&self, event_id: i64, seat_id: i64) -> bool {
        self.seats
            .get(&seat_id)
            .map(|s| s.event_id == event_id && s.is_active)
            .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct MemorySeatStore {
    inner: Mutex<Inner>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- заполнение справочных данных (в Postgres это миграции/админка) ---

    pub async fn add_seat(&self, seat: Seat) {
        let mut inner = self.inner.lock().await;
        inner.seats.insert(seat.id, seat);
    }

    pub async fn set_event_pricing(&self, event_id: i64, pricing_config_id: i64) {
        let mut inner = self.inner.lock().await;
        inner.event_pricing.insert(event_id, pricing_config_id);
    }

    pub async fn assign_tier(&self, seat_id: i64, pricing_config_id: i64, tier: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .assignments
            .insert((seat_id, pricing_config_id), tier.to_string());
    }

    pub async fn set_price_point(&self, event_id: i64, tier: &str, price: f64) {
        let mut inner = self.inner.lock().await;
        inner.price_points.insert((event_id, tier.to_string()), price);
    }
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn seats_for_event(&self, event_id: i64) -> Result<Vec<Seat>, StoreError> {
        let inner = self.inner.lock().await;
        let mut seats: Vec<Seat> = inner
            .seats
            .values()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| {
            (&a.section, a.row, a.number).cmp(&(&b.section, b.row, b.number))
        });
        Ok(seats)
    }

    async fn known_seat_ids(
        &self,
        event_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(seat_ids
            .iter()
            .copied()
            .filter(|id| inner.seat_known(event_id, *id))
            .collect())
    }

    async fn try_claim(
        &self,
        event_id: i64,
        seat_id: i64,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.seat_known(event_id, seat_id) {
            return Ok(ClaimOutcome::UnknownSeat);
        }
        if inner.blocks.contains_key(&(event_id, seat_id)) {
            return Ok(ClaimOutcome::Rejected);
        }

        let key = (event_id, seat_id);
        let mut reap_expired = false;
        if let Some(rec) = inner.ledger.get_mut(&key) {
            if rec.status == BookingStatus::Held && !rec.is_live(now) {
                // ленивое выметание истёкшего холда перед захватом
                reap_expired = true;
            } else if rec.held_by(session_id) {
                // идемпотентный повторный захват: TTL от времени вызова
                rec.expires_at = Some(expires_at);
                return Ok(ClaimOutcome::Accepted);
            } else {
                return Ok(ClaimOutcome::Rejected);
            }
        }
        if reap_expired {
            inner.ledger.remove(&key);
        }

        let id = inner.next_id();
        inner.ledger.insert(
            key,
            BookingRecord {
                id,
                event_id,
                seat_id,
                status: BookingStatus::Held,
                session_id: Some(session_id.to_string()),
                order_line_id: None,
                expires_at: Some(expires_at),
                block_reason: None,
                refund: None,
                created_at: now,
            },
        );
        Ok(ClaimOutcome::Accepted)
    }

    async fn release_seats(
        &self,
        event_id: i64,
        session_id: &str,
        seat_ids: &[i64],
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let keys: Vec<(i64, i64)> = inner
            .ledger
            .iter()
            .filter(|((ev, seat), rec)| {
                *ev == event_id
                    && rec.held_by(session_id)
                    && (seat_ids.is_empty() || seat_ids.contains(seat))
            })
            .map(|(k, _)| *k)
            .collect();
        for key in &keys {
            inner.ledger.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn unavailable_seats(
        &self,
        event_id: i64,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<i64> = inner
            .ledger
            .values()
            .filter(|rec| rec.event_id == event_id && rec.is_live(now))
            .filter(|rec| match session_id {
                // свои заявки покупатель продолжает видеть выбираемыми
                Some(sid) => rec.session_id.as_deref() != Some(sid),
                None => true,
            })
            .map(|rec| rec.seat_id)
            .chain(
                inner
                    .blocks
                    .values()
                    .filter(|rec| rec.event_id == event_id)
                    .map(|rec| rec.seat_id),
            )
            .collect();
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    async fn session_claims(
        &self,
        event_id: i64,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut claims: Vec<BookingRecord> = inner
            .ledger
            .values()
            .filter(|rec| {
                rec.event_id == event_id
                    && rec.session_id.as_deref() == Some(session_id)
                    && rec.is_live(now)
            })
            .cloned()
            .collect();
        claims.sort_by_key(|rec| rec.seat_id);
        Ok(claims)
    }

    async fn event_claims(
        &self,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> Result<HashMap<i64, BookingStatus>, StoreError> {
        let inner = self.inner.lock().await;
        let mut claims: HashMap<i64, BookingStatus> = inner
            .ledger
            .values()
            .filter(|rec| rec.event_id == event_id && rec.is_live(now))
            .map(|rec| (rec.seat_id, rec.status))
            .collect();
        for rec in inner.blocks.values().filter(|r| r.event_id == event_id) {
            claims.insert(rec.seat_id, BookingStatus::Blocked);
        }
        Ok(claims)
    }

    async fn confirm_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        order_line_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = (event_id, seat_id);

        if let Some(rec) = inner.ledger.get_mut(&key) {
            return Ok(match rec.status {
                BookingStatus::Held => {
                    let hold_was_expired = !rec.is_live(now);
                    rec.status = BookingStatus::Confirmed;
                    rec.order_line_id = Some(order_line_id.to_string());
                    rec.expires_at = None;
                    ConfirmOutcome::Confirmed { hold_was_expired }
                }
                BookingStatus::Confirmed
                    if rec.order_line_id.as_deref() == Some(order_line_id) =>
                {
                    ConfirmOutcome::AlreadyConfirmed
                }
                _ => ConfirmOutcome::Conflict,
            });
        }

        if !inner.seat_known(event_id, seat_id) {
            return Ok(ConfirmOutcome::Conflict);
        }

        // холд истёк и выметен, но оплата прошла - подтверждаем всё равно
        let id = inner.next_id();
        inner.ledger.insert(
            key,
            BookingRecord {
                id,
                event_id,
                seat_id,
                status: BookingStatus::Confirmed,
                session_id: None,
                order_line_id: Some(order_line_id.to_string()),
                expires_at: None,
                block_reason: None,
                refund: None,
                created_at: now,
            },
        );
        Ok(ConfirmOutcome::ConfirmedWithoutHold)
    }

    async fn apply_seat_refund(
        &self,
        event_id: i64,
        seat_id: i64,
        refund: &RefundRequest,
        seat_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<super::RefundOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = (event_id, seat_id);

        let Some(rec) = inner.ledger.get_mut(&key) else {
            return Ok(super::RefundOutcome::NoOp);
        };
        if !matches!(
            rec.status,
            BookingStatus::Confirmed | BookingStatus::PartiallyRefunded
        ) {
            return Ok(super::RefundOutcome::NoOp);
        }

        let prior_amount = rec.refund.as_ref().map(|r| r.amount).unwrap_or(0.0);
        let prior_reason = rec.refund.as_ref().and_then(|r| r.reason.clone());
        let cumulative = prior_amount + refund.amount;
        rec.refund = Some(RefundInfo {
            refund_id: refund.refund_id,
            amount: cumulative,
            reason: refund.reason.clone().or(prior_reason),
            refunded_at: now,
        });

        let covers_seat = seat_price
            .map(|p| cumulative >= p - REFUND_EPSILON)
            .unwrap_or(false);
        if covers_seat {
            rec.status = BookingStatus::Refunded;
            // refunded - не живой статус, место свободно
            inner.ledger.remove(&key);
            Ok(super::RefundOutcome::Refunded)
        } else {
            rec.status = BookingStatus::PartiallyRefunded;
            Ok(super::RefundOutcome::PartiallyRefunded)
        }
    }

    async fn cancel_order_line(
        &self,
        event_id: i64,
        order_line_id: &str,
        _refund: &RefundRequest,
        _now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut inner = self.inner.lock().await;
        let keys: Vec<(i64, i64)> = inner
            .ledger
            .iter()
            .filter(|((ev, _), rec)| {
                *ev == event_id
                    && rec.order_line_id.as_deref() == Some(order_line_id)
                    && matches!(
                        rec.status,
                        BookingStatus::Confirmed | BookingStatus::PartiallyRefunded
                    )
            })
            .map(|(k, _)| *k)
            .collect();

        // refunded - не живой статус: строка просто покидает журнал
        let mut freed = Vec::with_capacity(keys.len());
        for key in keys {
            if inner.ledger.remove(&key).is_some() {
                freed.push(key.1);
            }
        }
        freed.sort_unstable();
        Ok(freed)
    }

    async fn block_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        reason: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.seats.get(&seat_id).map(|s| s.event_id) != Some(event_id) {
            return Ok(false);
        }
        let key = (event_id, seat_id);
        if inner.blocks.contains_key(&key) {
            return Ok(false);
        }
        let id = inner.next_id();
        inner.blocks.insert(
            key,
            BookingRecord {
                id,
                event_id,
                seat_id,
                status: BookingStatus::Blocked,
                session_id: None,
                order_line_id: None,
                expires_at: None,
                block_reason: Some(reason.to_string()),
                refund: None,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn unblock_seat(&self, event_id: i64, seat_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.blocks.remove(&(event_id, seat_id)).is_some())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<SweptHold>, StoreError> {
        let mut inner = self.inner.lock().await;
        let expired: Vec<(i64, i64)> = inner
            .ledger
            .iter()
            .filter(|(_, rec)| rec.status == BookingStatus::Held && !rec.is_live(now))
            .map(|(k, _)| *k)
            .collect();
        let mut swept = Vec::with_capacity(expired.len());
        for key in expired {
            inner.ledger.remove(&key);
            swept.push(SweptHold {
                event_id: key.0,
                seat_id: key.1,
            });
        }
        Ok(swept)
    }

    async fn ledger_stats(
        &self,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> Result<LedgerStats, StoreError> {
        let inner = self.inner.lock().await;
        let mut stats = LedgerStats {
            total_seats: inner
                .seats
                .values()
                .filter(|s| s.event_id == event_id)
                .count() as i64,
            ..Default::default()
        };
        for rec in inner.ledger.values().filter(|r| r.event_id == event_id) {
            match rec.status {
                BookingStatus::Held if rec.is_live(now) => stats.held += 1,
                BookingStatus::Confirmed => stats.confirmed += 1,
                BookingStatus::PartiallyRefunded => stats.partially_refunded += 1,
                _ => {}
            }
        }
        stats.blocked = inner
            .blocks
            .values()
            .filter(|r| r.event_id == event_id)
            .count() as i64;
        Ok(stats)
    }

    async fn booking(
        &self,
        event_id: i64,
        seat_id: i64,
    ) -> Result<Option<BookingRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let key = (event_id, seat_id);
        Ok(inner
            .ledger
            .get(&key)
            .or_else(|| inner.blocks.get(&key))
            .cloned())
    }

    async fn event_pricing_config(&self, event_id: i64) -> Result<Option<i64>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.event_pricing.get(&event_id).copied())
    }

    async fn tier_of(
        &self,
        seat_id: i64,
        pricing_config_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.assignments.get(&(seat_id, pricing_config_id)).cloned())
    }

    async fn price_points_for_event(
        &self,
        event_id: i64,
    ) -> Result<HashMap<String, f64>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .price_points
            .iter()
            .filter(|((ev, _), _)| *ev == event_id)
            .map(|((_, tier), price)| (tier.clone(), *price))
            .collect())
    }
}
