// app.rs - Router assembly
//
// Route tiers mirror the handler layout: public routes need no token,
// protected routes sit behind JWT auth. The request log wraps everything;
// its filter decides which paths get a context.

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{AppConfig, SecurityConfig};
use crate::handlers::{self, protected, public};
use crate::middleware::{jwt_auth_middleware, request_log_middleware};
use crate::observability::{LogSink, Observability};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub observability: Arc<Observability>,
    pub security: Arc<SecurityConfig>,
    pub todos: Arc<protected::TodoStore>,
}

impl AppState {
    pub fn new(observability: Arc<Observability>, security: SecurityConfig) -> Self {
        Self {
            observability,
            security: Arc::new(security),
            todos: Arc::new(protected::TodoStore::new()),
        }
    }

    /// Observability and token validation both driven by `config`.
    pub fn from_config(config: &AppConfig, sink: Arc<dyn LogSink>) -> Self {
        let observability = Arc::new(Observability::from_config(config, sink));
        Self::new(observability, config.security.clone())
    }
}

pub fn app(state: AppState) -> Router {
    let observability = Arc::clone(&state.observability);

    Router::new()
        .merge(public_routes())
        .merge(protected_routes(state.clone()))
        .with_state(state)
        // Global middleware
        .layer(from_fn_with_state(observability, request_log_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .route("/api/_auth/session", get(public::session_get))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/whoami", get(protected::whoami_get))
        .route(
            "/api/orgs/:slug/todos",
            get(protected::todos_get).post(protected::todos_post),
        )
        .route("/api/orgs/:slug/todos/:id", delete(protected::todo_delete))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}
