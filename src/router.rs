use axum::{Router, routing::get};
use http::{HeaderValue, Method, header::CONTENT_TYPE};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::Config;
use crate::handlers;
use crate::state::AppState;

/// Router の構築
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let router = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route(
            "/api/accounts",
            get(handlers::find_account).post(handlers::create_account),
        )
        .route(
            "/api/accounts/{account_id}",
            get(handlers::get_account)
                .patch(handlers::update_account)
                .delete(handlers::delete_account),
        )
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS レイヤーの構築
///
/// 許可オリジンが未設定の場合は None
fn cors_layer(config: &Config) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = ?e, "不正なCORSオリジンを無視");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    tracing::info!(count = origins.len(), "CORS を有効化");

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([CONTENT_TYPE]),
    )
}
