//! store
//!
//! Репозиторий журнала заявок - единственный общий изменяемый ресурс.
//! Вся межсессионная координация идёт через его условные записи, в
//! процессе никаких блокировок между запросами нет.
//!
//! Контракт атомарности: захват места - это одна условная вставка,
//! охраняемая инвариантом "не более одной живой заявки на (event, seat)";
//! никогда не "прочитал - решил - записал" двумя операциями. Реализации:
//! Postgres (частичный уникальный индекс + условные UPDATE/DELETE) и
//! in-memory на `tokio::sync::Mutex` для тестов и офлайн-прогонов.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{BookingRecord, BookingStatus, Seat};

pub use memory::MemorySeatStore;
pub use postgres::PgSeatStore;

/// Исход попытки захвата одного места. Повторный захват своей же
/// сессией - это тоже `Accepted`: холд идемпотентно продлевается.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Accepted,
    /// Живая конкурирующая заявка или блокировка.
    Rejected,
    /// Места нет в реестре этого события (или оно деактивировано).
    UnknownSeat,
}

impl ClaimOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, ClaimOutcome::Accepted)
    }
}

/// Исход подтверждения покупки места.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Холд переведён в confirmed.
    Confirmed { hold_was_expired: bool },
    /// Холда уже не было (истёк и выметен), но оплата прошла -
    /// место всё равно подтверждено новой строкой.
    ConfirmedWithoutHold,
    /// Повторная доставка того же события - без побочных эффектов.
    AlreadyConfirmed,
    /// Место в несовместимом состоянии (чужая живая заявка, возврат).
    /// Для вызывающего - идемпотентный успех, для оператора - лог.
    Conflict,
}

/// Исход применения возврата к месту.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    /// Накопленная сумма покрыла место - строка переведена в refunded,
    /// место снова свободно.
    Refunded,
    /// Сумма меньше цены места - partially_refunded, место занято.
    PartiallyRefunded,
    /// Записи нет или она уже в эквивалентном терминальном состоянии.
    NoOp,
}

/// Входные данные возврата от внешней системы заказов.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub refund_id: Uuid,
    pub amount: f64,
    pub reason: Option<String>,
}

/// Выметенный истёкший холд: какому событию инвалидировать кеш.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweptHold {
    pub event_id: i64,
    pub seat_id: i64,
}

/// Счётчики журнала по событию, для мониторинга.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LedgerStats {
    pub total_seats: i64,
    pub held: i64,
    pub confirmed: i64,
    pub partially_refunded: i64,
    pub blocked: i64,
}

/// Репозиторий реестра мест, журнала заявок и ценовых данных.
///
/// Передаётся в каждый компонент явно (`Arc<dyn SeatStore>`), никаких
/// процессных синглтонов. Все методы, принимающие `now`, обязаны сами
/// отфильтровывать истёкшие холды - это ленивая проверка истечения,
/// ограничивающая устаревание независимо от частоты фонового выметания.
#[async_trait]
pub trait SeatStore: Send + Sync {
    // --- реестр мест (только чтение на этапе бронирования) ---

    async fn seats_for_event(&self, event_id: i64) -> Result<Vec<Seat>, StoreError>;

    /// Отфильтровывает запрошенные id до существующих активных мест события.
    async fn known_seat_ids(&self, event_id: i64, seat_ids: &[i64])
        -> Result<Vec<i64>, StoreError>;

    // --- журнал заявок ---

    /// Атомарный захват: условная вставка холда под инвариантом живой
    /// заявки. Истёкший чужой холд на этом месте предварительно выметается
    /// тем же условием, что и фоновый sweep.
    async fn try_claim(
        &self,
        event_id: i64,
        seat_id: i64,
        session_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Удаляет только холды, принадлежащие сессии. Пустой список мест -
    /// "всё, что сессия держит по событию". Чужие и несуществующие холды
    /// не трогаются и ошибкой не считаются.
    async fn release_seats(
        &self,
        event_id: i64,
        session_id: &str,
        seat_ids: &[i64],
    ) -> Result<u64, StoreError>;

    /// Места, недоступные данной сессии: чужие живые холды, чужие
    /// confirmed/partially_refunded и все блокировки.
    async fn unavailable_seats(
        &self,
        event_id: i64,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError>;

    /// SessionClaimSet: текущие заявки сессии, восстановленные из журнала.
    async fn session_claims(
        &self,
        event_id: i64,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingRecord>, StoreError>;

    /// Живые и блокирующие заявки события одним запросом (для выдачи
    /// карты статусов мест).
    async fn event_claims(
        &self,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> Result<HashMap<i64, BookingStatus>, StoreError>;

    async fn confirm_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        order_line_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, StoreError>;

    /// Применяет именной возврат к месту. `seat_price` - цена места, если
    /// её удалось разрешить: накопленная сумма возвратов, достигшая цены,
    /// переводит строку в refunded и освобождает место.
    async fn apply_seat_refund(
        &self,
        event_id: i64,
        seat_id: i64,
        refund: &RefundRequest,
        seat_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, StoreError>;

    /// Полная отмена строки заказа: все её confirmed/partially_refunded
    /// места переходят в refunded разом. Возвращает освобождённые места.
    async fn cancel_order_line(
        &self,
        event_id: i64,
        order_line_id: &str,
        refund: &RefundRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError>;

    /// Административная блокировка. Идемпотентна; живёт отдельной строкой
    /// и не трогает статус покупки.
    async fn block_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        reason: &str,
    ) -> Result<bool, StoreError>;

    /// Снятие блокировки. Прежний статус покупки не воскрешается -
    /// удаляется только строка blocked.
    async fn unblock_seat(&self, event_id: i64, seat_id: i64) -> Result<bool, StoreError>;

    /// Выметание истёкших холдов. Условие `expires_at <= now` проверяется
    /// в самом удалении: холд, продлённый после снимка, не будет убит.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<SweptHold>, StoreError>;

    async fn ledger_stats(&self, event_id: i64, now: DateTime<Utc>)
        -> Result<LedgerStats, StoreError>;

    /// Текущая запись по месту (живая или блокировка), для диагностики.
    async fn booking(
        &self,
        event_id: i64,
        seat_id: i64,
    ) -> Result<Option<BookingRecord>, StoreError>;

    // --- ценовые данные (только чтение) ---

    async fn event_pricing_config(&self, event_id: i64) -> Result<Option<i64>, StoreError>;

    async fn tier_of(
        &self,
        seat_id: i64,
        pricing_config_id: i64,
    ) -> Result<Option<String>, StoreError>;

    async fn price_points_for_event(
        &self,
        event_id: i64,
    ) -> Result<HashMap<String, f64>, StoreError>;
}
