/// API Routes definition

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::handlers;
use super::AppState;

pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .route("/api/configs", post(handlers::create_config))
        .route(
            "/api/configs/:id",
            put(handlers::update_config).delete(handlers::delete_config),
        )
        .route("/api/configs/:id/dump", post(handlers::dump_config))
        .route("/api/configs/:id/restore", post(handlers::restore_config))
        .route("/api/dump", post(handlers::dump))
        .route("/api/restore", post(handlers::restore))
        .route("/api/operations/:id/cancel", post(handlers::cancel_operation))
        .route("/api/compose", post(handlers::create_compose))
        .route(
            "/api/compose/:id",
            put(handlers::update_compose).delete(handlers::delete_compose),
        )
        .route("/api/compose/:id/operate", post(handlers::operate_compose))
        .layer(middleware::from_fn(auth::auth_middleware));

    // Public routes (read-only, no auth required)
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/docker/status", get(handlers::docker_status))
        .route("/api/configs", get(handlers::list_configs))
        .route("/api/configs/:id", get(handlers::get_config))
        .route("/api/operations", get(handlers::list_operations))
        .route("/api/operations/:id", get(handlers::get_operation))
        .route("/api/compose", get(handlers::list_compose))
        .route("/api/compose/:id", get(handlers::get_compose))
        .route("/api/compose/:id/services", get(handlers::compose_services));

    let mut app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}
