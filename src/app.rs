use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{EventBusAuditSink, PermissionEngine};
use crate::config::EngineConfig;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::route_map::RouteModuleMap;
use crate::routes::{health, permissions, rbac};
use crate::store::SqliteAuthzStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub store: Arc<SqliteAuthzStore>,
    pub engine: Arc<PermissionEngine>,
    pub event_bus: EventBus,
    pub route_map: Arc<RouteModuleMap>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, engine_config: EngineConfig, route_map: RouteModuleMap) -> Self {
        let (event_bus, _) = init_event_bus();
        let store = Arc::new(SqliteAuthzStore::new(pool.clone()));
        let engine = PermissionEngine::new(store.clone(), engine_config)
            .with_audit_sink(Arc::new(EventBusAuditSink::new(event_bus.clone())));

        Self {
            pool,
            jwt: Arc::new(jwt),
            store,
            engine: Arc::new(engine),
            event_bus,
            route_map: Arc::new(route_map),
        }
    }

    pub fn from_env(pool: SqlitePool) -> Result<Self, AppError> {
        Ok(Self::new(
            pool,
            JwtConfig::from_env()?,
            EngineConfig::from_env()?,
            RouteModuleMap::from_env()?,
        ))
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let state = AppState::from_env(pool)?;
    Ok(router(state))
}

/// Build the router around an existing state and attach the audit listener.
pub fn router(state: AppState) -> Router {
    tokio::spawn(start_activity_listener(state.event_bus.subscribe(), state.pool.clone()));

    tracing::info!(
        unrestricted_roles = ?state.engine.config().unrestricted_roles,
        cache_ttl_secs = state.engine.config().cache_ttl.num_seconds(),
        routes = state.route_map.len(),
        "permission engine ready"
    );

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/permissions", permissions::routes())
        .nest("/rbac", rbac::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
