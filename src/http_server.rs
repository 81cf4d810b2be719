//! HTTP server implementation using Axum.

use crate::config::ServerConfig;
use crate::state::{AppState, NewSession, RegistryError, Session, SessionRegistry};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Registry failures rendered as `{message}`.
#[derive(Debug)]
struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RegistryError::InvalidName
            | RegistryError::InvalidStartTime
            | RegistryError::InvalidSchedule
            | RegistryError::NotFound => StatusCode::BAD_REQUEST,
            RegistryError::NameTaken => StatusCode::FORBIDDEN,
        };
        (status, Json(json!({ "message": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/poms", post(create_pom))
        .route("/poms/:name", get(get_pom))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically reclaim idle sessions.
pub fn spawn_sweeper(registry: Arc<SessionRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; nothing can be idle yet.
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = registry.sweep(registry.now()).await;
            let remaining = registry.len().await;
            if removed > 0 {
                info!(removed, remaining, "Swept idle poms");
            } else {
                debug!(remaining, "Sweep found nothing to remove");
            }
        }
    })
}

/// Run the HTTP server with the provided state until the listener fails.
pub async fn run_server(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    spawn_sweeper(state.registry.clone(), config.sweep_interval);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Starting pom server on {} (lifetime {} min, sweep every {} min)",
        listener.local_addr()?,
        config.session_lifetime.num_minutes(),
        config.sweep_interval.as_secs() / 60
    );
    axum::serve(listener, router(state)).await
}

async fn health() -> &'static str {
    "OK"
}

async fn create_pom(
    State(state): State<AppState>,
    payload: Result<Json<NewSession>, JsonRejection>,
) -> Result<Json<Session>, ApiError> {
    // A body that is not a JSON object reads as an empty request.
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Unreadable create body: {}", rejection.body_text());
            NewSession::default()
        }
    };
    let session = state.registry.create(request).await?;
    Ok(Json(session))
}

async fn get_pom(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session = state.registry.get(&name).await?;
    debug!(name = %session.name, "Served pom");
    Ok(Json(session))
}
