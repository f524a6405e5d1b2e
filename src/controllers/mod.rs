pub mod admin;
pub mod lifecycle;
pub mod pricing;
pub mod seats;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

pub fn routes(state: &AppState) -> Router<Arc<AppState>> {
    let mut router = Router::new()
        .merge(seats::routes())
        .merge(lifecycle::routes());

    if state.config.features.enable_pricing_api {
        router = router.merge(pricing::routes());
    }
    if state.config.features.enable_admin_api {
        router = router.merge(admin::routes());
    }
    router
}
