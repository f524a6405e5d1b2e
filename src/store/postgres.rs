//! postgres.rs
//!
//! Postgres-реализация репозитория. Инвариант "одна живая заявка на
//! (event, seat)" держит частичный уникальный индекс uq_booking_live;
//! каждый переход состояния - один условный оператор, конкурирующие
//! писатели сериализуются самим индексом: последний успешный атомарный
//! писатель выигрывает, остальные видят отказ.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::errors::StoreError;
use crate::models::{BookingRecord, BookingStatus, PricePoint, PricingAssignment, RefundInfo, Seat};

use super::{
    ClaimOutcome, ConfirmOutcome, LedgerStats, RefundRequest, SeatStore, SweptHold,
};

/// Допуск сравнения накопленной суммы возвратов с ценой места.
const REFUND_EPSILON: f64 = 1e-6;

#[derive(Clone)]
pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_record(row: &PgRow) -> Result<BookingRecord, StoreError> {
        let status_raw: String = row.get("status");
        let status = BookingStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::Corrupted(format!("unknown status '{}'", status_raw)))?;

        let refund_id: Option<uuid::Uuid> = row.get("refund_id");
        let refund = match status {
            BookingStatus::Refunded | BookingStatus::PartiallyRefunded => {
                let refund_id = refund_id.ok_or_else(|| {
                    StoreError::Corrupted(format!("{} row without refund record", status_raw))
                })?;
                Some(RefundInfo {
                    refund_id,
                    amount: row.get::<Option<f64>, _>("refund_amount").unwrap_or(0.0),
                    reason: row.get("refund_reason"),
                    refunded_at: row
                        .get::<Option<DateTime<Utc>>, _>("refunded_at")
                        .unwrap_or_else(Utc::now),
                })
            }
            _ => None,
        };

        Ok(BookingRecord {
            id: row.get("id"),
            event_id: row.get("event_id"),
            seat_id: row.get("seat_id"),
            status,
            session_id: row.get("session_id"),
            order_line_id: row.get("order_line_id"),
            expires_at: row.get("expires_at"),
            block_reason: row.get("block_reason"),
            refund,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn seats_for_event(&self, event_id: i64) -> Result<Vec<Seat>, StoreError> {
        let seats = sqlx::query_as::<_, Seat>(
            r#"
            SELECT id, event_id, section, "row", number, is_active
            FROM seats
            WHERE event_id = $1
            ORDER BY section, "row", number
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    async fn known_seat_ids(
        &self,
        event_id: i64,
        seat_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let known = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM seats WHERE event_id = $1 AND is_active AND id = ANY($2)",
        )
        .bind(event_id)
        .bind(seat_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(known)
    }

    async fn try_claim(
        &self,
        event_id: i64,
        seat_id: i64,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        // Ленивое выметание: истёкший холд не должен блокировать продажу.
        // То же условие expires_at <= now, что и у фонового sweep.
        sqlx::query(
            "DELETE FROM booking_records
             WHERE event_id = $1 AND seat_id = $2 AND status = 'held' AND expires_at <= $3",
        )
        .bind(event_id)
        .bind(seat_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        // Единственная точка входа холда в журнал. Конфликт по живому
        // индексу превращается в продление, только если строка - холд
        // этой же сессии; всё остальное - отказ без ожидания.
        let claimed = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO booking_records (event_id, seat_id, status, session_id, expires_at)
            SELECT $1, $2, 'held', $3, $4
            WHERE EXISTS (SELECT 1 FROM seats WHERE id = $2 AND event_id = $1 AND is_active)
              AND NOT EXISTS (SELECT 1 FROM booking_records
                              WHERE event_id = $1 AND seat_id = $2 AND status = 'blocked')
            ON CONFLICT (event_id, seat_id)
                WHERE status IN ('held', 'confirmed', 'partially_refunded')
            DO UPDATE SET expires_at = EXCLUDED.expires_at
                WHERE booking_records.status = 'held'
                  AND booking_records.session_id = EXCLUDED.session_id
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(seat_id)
        .bind(session_id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(ClaimOutcome::Accepted);
        }

        // Захват не прошёл; классифицируем причину для отчёта. Сама
        // классификация уже ничего не решает - гонок здесь нет.
        let seat_known = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM seats WHERE id = $1 AND event_id = $2 AND is_active)",
        )
        .bind(seat_id)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        if seat_known {
            Ok(ClaimOutcome::Rejected)
        } else {
            Ok(ClaimOutcome::UnknownSeat)
        }
    }

    async fn release_seats(
        &self,
        event_id: i64,
        session_id: &str,
        seat_ids: &[i64],
    ) -> Result<u64, StoreError> {
        let result = if seat_ids.is_empty() {
            // пустой список - освободить всё, что держит сессия
            sqlx::query(
                "DELETE FROM booking_records
                 WHERE event_id = $1 AND session_id = $2 AND status = 'held'",
            )
            .bind(event_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "DELETE FROM booking_records
                 WHERE event_id = $1 AND session_id = $2 AND status = 'held'
                   AND seat_id = ANY($3)",
            )
            .bind(event_id)
            .bind(session_id)
            .bind(seat_ids)
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected())
    }

    async fn unavailable_seats(
        &self,
        event_id: i64,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        let seats = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT seat_id
            FROM booking_records
            WHERE event_id = $1
              AND (
                    status = 'blocked'
                 OR (status IN ('held', 'confirmed', 'partially_refunded')
                     AND (status <> 'held' OR expires_at > $2)
                     AND ($3::text IS NULL OR session_id IS NULL OR session_id <> $3))
              )
            ORDER BY seat_id
            "#,
        )
        .bind(event_id)
        .bind(now)
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    async fn session_claims(
        &self,
        event_id: i64,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, seat_id, status, session_id, order_line_id,
                   expires_at, block_reason, refund_id, refund_amount,
                   refund_reason, refunded_at, created_at
            FROM booking_records
            WHERE event_id = $1 AND session_id = $2
              AND (status IN ('confirmed', 'partially_refunded')
                   OR (status = 'held' AND expires_at > $3))
            ORDER BY seat_id
            "#,
        )
        .bind(event_id)
        .bind(session_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_record).collect()
    }

    async fn event_claims(
        &self,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> Result<HashMap<i64, BookingStatus>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT seat_id, status
            FROM booking_records
            WHERE event_id = $1
              AND (status IN ('confirmed', 'partially_refunded', 'blocked')
                   OR (status = 'held' AND expires_at > $2))
            "#,
        )
        .bind(event_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut claims: HashMap<i64, BookingStatus> = HashMap::new();
        for row in rows {
            let seat_id: i64 = row.get("seat_id");
            let status_raw: String = row.get("status");
            let status = BookingStatus::parse(&status_raw)
                .ok_or_else(|| StoreError::Corrupted(format!("unknown status '{}'", status_raw)))?;
            // блокировка перекрывает любой статус покупки
            match claims.get(&seat_id) {
                Some(BookingStatus::Blocked) => {}
                _ => {
                    claims.insert(seat_id, status);
                }
            }
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
        // Снимок срока жизни холда нужен только для отчёта о гонке;
        // атомарным шлюзом остаётся сам UPDATE со статусной охраной.
        let hold_expiry: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT expires_at FROM booking_records
             WHERE event_id = $1 AND seat_id = $2 AND status = 'held'",
        )
        .bind(event_id)
        .bind(seat_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();

        let updated = sqlx::query(
            "UPDATE booking_records
             SET status = 'confirmed', order_line_id = $3, expires_at = NULL
             WHERE event_id = $1 AND seat_id = $2 AND status = 'held'",
        )
        .bind(event_id)
        .bind(seat_id)
        .bind(order_line_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(ConfirmOutcome::Confirmed {
                hold_was_expired: hold_expiry.map(|e| e <= now).unwrap_or(false),
            });
        }

        // Холда нет. Либо повторная доставка, либо холд истёк и выметен.
        let existing: Option<(String, Option<String>)> = sqlx::query_as(
            "SELECT status, order_line_id FROM booking_records
             WHERE event_id = $1 AND seat_id = $2
               AND status IN ('confirmed', 'partially_refunded')",
        )
        .bind(event_id)
        .bind(seat_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((status, existing_line)) = existing {
            if status == "confirmed" && existing_line.as_deref() == Some(order_line_id) {
                return Ok(ConfirmOutcome::AlreadyConfirmed);
            }
            return Ok(ConfirmOutcome::Conflict);
        }

        // Оплата прошла, холда нет - подтверждаем новой строкой
        // (открываемся в сторону продажи, не двойного бронирования).
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO booking_records (event_id, seat_id, status, order_line_id)
            SELECT $1, $2, 'confirmed', $3
            WHERE EXISTS (SELECT 1 FROM seats WHERE id = $2 AND event_id = $1)
            ON CONFLICT (event_id, seat_id)
                WHERE status IN ('held', 'confirmed', 'partially_refunded')
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(seat_id)
        .bind(order_line_id)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            Ok(ConfirmOutcome::ConfirmedWithoutHold)
        } else {
            Ok(ConfirmOutcome::Conflict)
        }
    }

    async fn apply_seat_refund(
        &self,
        event_id: i64,
        seat_id: i64,
        refund: &RefundRequest,
        seat_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<super::RefundOutcome, StoreError> {
        let new_status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE booking_records
            SET status = CASE
                    WHEN $3::float8 IS NOT NULL
                         AND COALESCE(refund_amount, 0) + $4 >= $3::float8 - $8
                    THEN 'refunded'
                    ELSE 'partially_refunded'
                END,
                refund_id = $5,
                refund_amount = COALESCE(refund_amount, 0) + $4,
                refund_reason = COALESCE($6, refund_reason),
                refunded_at = $7
            WHERE event_id = $1 AND seat_id = $2
              AND status IN ('confirmed', 'partially_refunded')
            RETURNING status
            "#,
        )
        .bind(event_id)
        .bind(seat_id)
        .bind(seat_price)
        .bind(refund.amount)
        .bind(refund.refund_id)
        .bind(refund.reason.as_deref())
        .bind(now)
        .bind(REFUND_EPSILON)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match new_status.as_deref() {
            Some("refunded") => super::RefundOutcome::Refunded,
            Some(_) => super::RefundOutcome::PartiallyRefunded,
            None => super::RefundOutcome::NoOp,
        })
    }

    async fn cancel_order_line(
        &self,
        event_id: i64,
        order_line_id: &str,
        refund: &RefundRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        // Все места строки заказа переходят вместе.
        let seats = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE booking_records
            SET status = 'refunded',
                refund_id = $3,
                refund_amount = COALESCE(refund_amount, 0) + $4,
                refund_reason = COALESCE($5, refund_reason),
                refunded_at = $6
            WHERE event_id = $1 AND order_line_id = $2
              AND status IN ('confirmed', 'partially_refunded')
            RETURNING seat_id
            "#,
        )
        .bind(event_id)
        .bind(order_line_id)
        .bind(refund.refund_id)
        .bind(refund.amount)
        .bind(refund.reason.as_deref())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    async fn block_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        reason: &str,
    ) -> Result<bool, StoreError> {
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO booking_records (event_id, seat_id, status, block_reason)
            SELECT $1, $2, 'blocked', $3
            WHERE EXISTS (SELECT 1 FROM seats WHERE id = $2 AND event_id = $1)
            ON CONFLICT (event_id, seat_id) WHERE status = 'blocked'
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(seat_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }

    async fn unblock_seat(&self, event_id: i64, seat_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM booking_records
             WHERE event_id = $1 AND seat_id = $2 AND status = 'blocked'",
        )
        .bind(event_id)
        .bind(seat_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<SweptHold>, StoreError> {
        // Условие на expires_at перепроверяется в самом DELETE: холд,
        // продлённый после снимка выметальщика, не будет разрушен.
        let swept = sqlx::query_as::<_, (i64, i64)>(
            "DELETE FROM booking_records
             WHERE status = 'held' AND expires_at <= $1
             RETURNING event_id, seat_id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(swept
            .into_iter()
            .map(|(event_id, seat_id)| SweptHold { event_id, seat_id })
            .collect())
    }

    async fn ledger_stats(
        &self,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> Result<LedgerStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM seats WHERE event_id = $1) AS total_seats,
                COUNT(*) FILTER (WHERE status = 'held' AND expires_at > $2) AS held,
                COUNT(*) FILTER (WHERE status = 'confirmed') AS confirmed,
                COUNT(*) FILTER (WHERE status = 'partially_refunded') AS partially_refunded,
                COUNT(*) FILTER (WHERE status = 'blocked') AS blocked
            FROM booking_records
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerStats {
            total_seats: row.get("total_seats"),
            held: row.get("held"),
            confirmed: row.get("confirmed"),
            partially_refunded: row.get("partially_refunded"),
            blocked: row.get("blocked"),
        })
    }

    async fn booking(
        &self,
        event_id: i64,
        seat_id: i64,
    ) -> Result<Option<BookingRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, event_id, seat_id, status, session_id, order_line_id,
                   expires_at, block_reason, refund_id, refund_amount,
                   refund_reason, refunded_at, created_at
            FROM booking_records
            WHERE event_id = $1 AND seat_id = $2
              AND status IN ('held', 'confirmed', 'partially_refunded', 'blocked')
            ORDER BY CASE WHEN status = 'blocked' THEN 1 ELSE 0 END
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(seat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_record).transpose()
    }

    async fn event_pricing_config(&self, event_id: i64) -> Result<Option<i64>, StoreError> {
        let config = sqlx::query_scalar::<_, i64>(
            "SELECT pricing_config_id FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(config)
    }

    async fn tier_of(
        &self,
        seat_id: i64,
        pricing_config_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let assignment = sqlx::query_as::<_, PricingAssignment>(
            "SELECT seat_id, pricing_config_id, tier FROM pricing_assignments
             WHERE seat_id = $1 AND pricing_config_id = $2",
        )
        .bind(seat_id)
        .bind(pricing_config_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(assignment.map(|a| a.tier))
    }

    async fn price_points_for_event(
        &self,
        event_id: i64,
    ) -> Result<HashMap<String, f64>, StoreError> {
        let points = sqlx::query_as::<_, PricePoint>(
            "SELECT event_id, tier, price FROM price_points WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(points.into_iter().map(|p| (p.tier, p.price)).collect())
    }
}
