//! booking.rs
//!
//! Запись журнала заявок на место (booking_records) и её закрытый статус.
//!
//! Статус - строгое перечисление, а не произвольная строка: метаданные
//! возврата существуют только вместе со статусами `Refunded` /
//! `PartiallyRefunded`, состояние "возврат без записи о возврате"
//! непредставимо. Освобождённый холд не хранится как строка вовсе.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Закрытый набор статусов заявки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Мягкая блокировка сессией покупателя, ограниченная TTL.
    Held,
    /// Место выкуплено, привязано к строке заказа.
    Confirmed,
    /// Возврат полностью покрыл место - оно снова свободно.
    Refunded,
    /// Частичный возврат: место остаётся занятым.
    PartiallyRefunded,
    /// Административная блокировка, без TTL, поверх любого статуса покупки.
    Blocked,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Held => "held",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Refunded => "refunded",
            BookingStatus::PartiallyRefunded => "partially_refunded",
            BookingStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "held" => Some(BookingStatus::Held),
            "confirmed" => Some(BookingStatus::Confirmed),
            "refunded" => Some(BookingStatus::Refunded),
            "partially_refunded" => Some(BookingStatus::PartiallyRefunded),
            "blocked" => Some(BookingStatus::Blocked),
            _ => None,
        }
    }
}

/// Метаданные возврата. Пишутся только вместе с переходом в
/// `Refunded`/`PartiallyRefunded`. Сумма накапливается по возвратам.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundInfo {
    pub refund_id: Uuid,
    pub amount: f64,
    pub reason: Option<String>,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: i64,
    pub event_id: i64,
    pub seat_id: i64,
    pub status: BookingStatus,
    /// Сессия-владелец. Обязательна для `Held`, сохраняется при подтверждении.
    pub session_id: Option<String>,
    /// Строка заказа во внешней системе. Появляется при подтверждении.
    pub order_line_id: Option<String>,
    /// Момент истечения холда. Только для `Held`.
    pub expires_at: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    pub refund: Option<RefundInfo>,
    pub created_at: DateTime<Utc>,
}

impl BookingRecord {
    /// "Живая" заявка делает место недоступным остальным сессиям:
    /// неистёкший холд, подтверждённая покупка или частичный возврат.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            BookingStatus::Held => self.expires_at.map(|e| e > now).unwrap_or(false),
            BookingStatus::Confirmed | BookingStatus::PartiallyRefunded => true,
            BookingStatus::Refunded | BookingStatus::Blocked => false,
        }
    }

    pub fn held_by(&self, session_id: &str) -> bool {
        self.status == BookingStatus::Held && self.session_id.as_deref() == Some(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn held(expires_at: DateTime<Utc>) -> BookingRecord {
        BookingRecord {
            id: 1,
            event_id: 100,
            seat_id: 7,
            status: BookingStatus::Held,
            session_id: Some("sess-a".to_string()),
            order_line_id: None,
            expires_at: Some(expires_at),
            block_reason: None,
            refund: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn held_is_live_until_expiry() {
        let now = Utc::now();
        let rec = held(now + Duration::seconds(600));
        assert!(rec.is_live(now));
        assert!(rec.is_live(now + Duration::seconds(599)));
        // граница: в момент t+TTL холд уже не живой
        assert!(!rec.is_live(now + Duration::seconds(600)));
        assert!(!rec.is_live(now + Duration::seconds(601)));
    }

    #[test]
    fn status_roundtrip() {
        for s in [
            BookingStatus::Held,
            BookingStatus::Confirmed,
            BookingStatus::Refunded,
            BookingStatus::PartiallyRefunded,
            BookingStatus::Blocked,
        ] {
            assert_eq!(BookingStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(BookingStatus::parse("released"), None);
    }
}
