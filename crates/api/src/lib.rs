//! HTTP API server for the social backend.
//!
//! Exposes the group, friend and friend request use cases over REST,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use domain::services::LocalGroupService;
use domain::{AppError, Handlers, InMemoryBackend};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CachedTable, PgGroupTable};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/users", post(routes::users::register))
        .route("/groups", post(routes::groups::create))
        .route(
            "/groups/{id}",
            get(routes::groups::get).delete(routes::groups::delete),
        )
        .route(
            "/groups/{id}/members",
            get(routes::groups::members).delete(routes::groups::remove_members),
        )
        .route("/friends", get(routes::friends::list))
        .route("/friends/{friend_id}", delete(routes::friends::delete))
        .route(
            "/friend-requests",
            post(routes::friend_requests::send).get(routes::friend_requests::list),
        )
        .route(
            "/friend-requests/{id}/accept",
            post(routes::friend_requests::accept),
        )
        .route(
            "/friend-requests/{id}/reject",
            post(routes::friend_requests::reject),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state with every participant held in memory.
pub fn create_default_state(config: &Config) -> Result<Arc<AppState>, AppError> {
    create_state(config, None)
}

/// Creates application state, storing groups in Postgres when a table is given.
///
/// Group rows are cached in the same cache as the relation tables.
pub fn create_state(
    config: &Config,
    group_table: Option<PgGroupTable>,
) -> Result<Arc<AppState>, AppError> {
    let handler_config = config.handler_config();
    let cache_config = config.cache_config();
    let backend = InMemoryBackend::new(&handler_config, cache_config);

    let mut participants = backend.participants();
    if let Some(table) = group_table {
        let groups = LocalGroupService::new(
            CachedTable::new(table, backend.cache.clone(), cache_config),
            handler_config.retry,
        );
        participants.groups = Arc::new(groups);
    }

    let handlers = Handlers::new(participants, handler_config)?;
    Ok(Arc::new(AppState {
        handlers,
        users: backend.users,
    }))
}
