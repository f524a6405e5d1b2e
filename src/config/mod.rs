use serde::Deserialize;
use std::env;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub holds: HoldConfig,
    pub sweeper: SweeperConfig,
    pub admin: AdminConfig,
    pub features: FeatureFlags,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

// Настройки холдов: срок жизни мягкой блокировки места
#[derive(Debug, Clone, Deserialize)]
pub struct HoldConfig {
    pub ttl_seconds: i64,
}

// Настройки фонового выметальщика истёкших холдов
#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub interval_seconds: u64,
}

// Учётные данные административного API (block/unblock/stats)
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub login: String,
    pub password: String,
}

// Feature flags для включения/выключения функциональности
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    pub enable_admin_api: bool,
    pub enable_pricing_api: bool,
    pub enable_seat_map_cache: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "seat_inventory=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            },
            holds: HoldConfig {
                // 10 минут по умолчанию - столько живёт корзина покупателя
                ttl_seconds: env::var("HOLD_TTL_SECONDS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .expect("HOLD_TTL_SECONDS must be a valid number"),
            },
            sweeper: SweeperConfig {
                interval_seconds: env::var("SWEEP_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .expect("SWEEP_INTERVAL_SECONDS must be a valid number"),
            },
            admin: AdminConfig {
                login: env::var("ADMIN_LOGIN").expect("ADMIN_LOGIN must be set"),
                password: env::var("ADMIN_PASSWORD").expect("ADMIN_PASSWORD must be set"),
            },
            features: FeatureFlags {
                enable_admin_api: env::var("ENABLE_ADMIN_API")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .expect("ENABLE_ADMIN_API must be true or false"),
                enable_pricing_api: env::var("ENABLE_PRICING_API")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .expect("ENABLE_PRICING_API must be true or false"),
                enable_seat_map_cache: env::var("ENABLE_SEAT_MAP_CACHE")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .expect("ENABLE_SEAT_MAP_CACHE must be true or false"),
            },
        }
    }
}
