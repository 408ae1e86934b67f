pub mod auth;
pub mod error;
mod handlers;
mod terminal;

use std::sync::Arc;

use axum::{
    http::{HeaderName, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::project::ProjectRoot;
use crate::session::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub shutdown: ShutdownCoordinator,
    /// Shared secret for the auth gate. `None` disables authentication
    /// (loopback binds only).
    pub token: Option<String>,
    /// Fallback working directory for commands with no explicit cwd.
    pub project_root: Arc<dyn ProjectRoot>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/command", post(handlers::command));

    // The REST surface rejects bad tokens with 401. The terminal endpoint
    // performs its own check inside the handler so it can refuse the
    // upgrade with a policy close frame instead.
    let api = match state.token.clone() {
        Some(token) => api.layer(axum::middleware::from_fn(move |req, next| {
            let t = token.clone();
            async move { auth::require_auth(t, req, next).await }
        })),
        None => api,
    };

    Router::new()
        .merge(api)
        .route("/ws/terminal", get(terminal::ws_terminal))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
}
