use redis::AsyncCommands;
use tracing::info;

use crate::redis_client::RedisClient;

/// Кеш карты мест по событию. Кешируется только презентационная
/// выдача (реестр + статусы на момент записи); доступность всегда
/// читается из журнала напрямую - показать занятое место свободным
/// недопустимо, устаревший кеш на это направление влиять не должен.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
}

impl CacheService {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn seat_map_key(event_id: i64) -> String {
        format!("seatmap:{}", event_id)
    }

    // Получить закешированную карту мест
    pub async fn get_seat_map(&self, event_id: i64) -> Option<String> {
        let mut conn = self.redis.conn.clone();
        conn.get(Self::seat_map_key(event_id)).await.ok()
    }

    // Сохранить карту мест на сутки; каждая мутация журнала её сбросит
    pub async fn save_seat_map(&self, event_id: i64, payload: &str) {
        let mut conn = self.redis.conn.clone();
        let _: Result<(), _> = conn
            .set_ex(Self::seat_map_key(event_id), payload, 86400)
            .await;
    }

    // Инвалидировать карту мест события
    pub async fn invalidate_seats(&self, event_id: i64) {
        let mut conn = self.redis.conn.clone();
        let _: Result<(), _> = conn.del(Self::seat_map_key(event_id)).await;
        info!("Invalidated seat map cache for event {}", event_id);
    }
}
