//! Wires the Registry Control Plane's HTTP surface together, matching the route table
//! in spec.md §4.H. CORS is configured from the `CORS_ORIGINS` env var (§6).

use axum::http::HeaderValue;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{config, mappings, upload};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/internal/{class_type}/upload", post(upload::upload))
        .route("/internal/delete/{class_type}/{class_name}", delete(upload::delete))
        .route(
            "/internal/{class_type}/{class_name}/update-assets",
            post(upload::update_assets),
        )
        .route("/internal/update-all-assets", post(upload::update_all_assets))
        .route("/internal/classes/summary", get(upload::classes_summary))
        .route("/api/registry/config/schema", get(config::schema))
        .route("/api/registry/config", put(config::update_preferences))
        .route("/api/registry/config/secret-keys", get(config::secret_keys))
        .route("/api/registry/config/secrets", axum::routing::patch(config::update_secrets))
        .route(
            "/internal/asset-mappings",
            post(mappings::create).put(mappings::update_active),
        )
        .route("/internal/asset-mappings/{common_symbol}", get(mappings::list))
        .route(
            "/internal/asset-mappings/{common_symbol}/{class_name}/{class_type}/{class_symbol}",
            delete(mappings::delete),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    match std::env::var("CORS_ORIGINS") {
        Ok(raw) if !raw.trim().is_empty() => {
            let origins: Vec<HeaderValue> = raw
                .split(',')
                .filter_map(|s| HeaderValue::from_str(s.trim()).ok())
                .collect();
            CorsLayer::new().allow_origin(origins).allow_methods(tower_http::cors::Any)
        }
        _ => CorsLayer::new(),
    }
}
