//! Route configuration and setup.
//!
//! Health checks live in [health](health); every `/api` route sits behind the bearer auth
//! middleware.

mod health;

use crate::auth::middleware::{auth_middleware, AuthState};
use crate::constants::{API_PREFIX, OPENAPI_PATH};
use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{delete, get, post, put},
    Json, Router,
};
use lectern_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;

    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
        .max(1);
    tracing::info!(
        http_concurrency_limit = http_concurrency_limit,
        "HTTP concurrency limit layer enabled"
    );

    Ok(build_router(state)
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(cors))
}

/// Router without CORS; what the server runs apart from the CORS layer.
pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_state = Arc::new(AuthState {
        jwt: state.jwt.clone(),
    });

    let protected = protected_routes()
        .route_layer(axum::middleware::from_fn_with_state(auth_state, auth_middleware));

    public_routes()
        .merge(protected)
        .merge(utoipa_rapidoc::RapiDoc::new(OPENAPI_PATH).path("/docs"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}

fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::liveness_check))
        .route(
            OPENAPI_PATH,
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
}

fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(upload_routes())
        .merge(media_routes())
        .merge(admin_routes())
}

fn upload_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/media/initiate-upload", API_PREFIX),
            post(handlers::uploads::initiate_upload),
        )
        .route(
            &format!("{}/media/{{id}}/complete", API_PREFIX),
            post(handlers::uploads::complete_upload),
        )
        .route(
            &format!("{}/media/{{id}}/cancel", API_PREFIX),
            delete(handlers::uploads::cancel_upload),
        )
        .route(
            &format!("{}/media/uploads/{{id}}", API_PREFIX),
            get(handlers::uploads::get_upload_session),
        )
        .route(
            &format!("{}/media/uploads/{{id}}/parts", API_PREFIX),
            post(handlers::uploads::refresh_part_urls),
        )
}

fn media_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/media", API_PREFIX),
            get(handlers::media::list_media),
        )
        .route(
            &format!("{}/media/quota", API_PREFIX),
            get(handlers::quota::get_quota),
        )
        .route(
            &format!("{}/media/{{id}}", API_PREFIX),
            get(handlers::media::get_media).delete(handlers::media::delete_media),
        )
        .route(
            &format!("{}/media/{{id}}/access", API_PREFIX),
            get(handlers::media::get_media_access),
        )
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/admin/institutions/{{institutionId}}/quota", API_PREFIX),
            put(handlers::admin::set_institution_quota),
        )
        .route(
            &format!("{}/admin/media/{{id}}", API_PREFIX),
            get(handlers::admin::preview_media),
        )
}
