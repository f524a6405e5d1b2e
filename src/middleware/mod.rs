use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

/// Администратор, прошедший Basic Auth. Учётные данные берутся из
/// конфигурации - своих пользователей у движка нет, аккаунты живут
/// во внешней коммерческой системе.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub login: String,
}

// Basic Auth extractor
impl FromRequestParts<Arc<crate::AppState>> for AdminUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Получаем заголовок Authorization
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // Проверяем что это Basic auth
        let encoded = auth_header
            .strip_prefix("Basic ")
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // Декодируем base64
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

        // Разделяем login:password
        let mut parts_iter = credentials.splitn(2, ':');
        let login = parts_iter.next().ok_or(StatusCode::UNAUTHORIZED)?;
        let password = parts_iter.next().ok_or(StatusCode::UNAUTHORIZED)?;

        let admin = &state.config.admin;
        if login != admin.login || password != admin.password {
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(AdminUser {
            login: login.to_string(),
        })
    }
}
