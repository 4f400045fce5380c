use crate::agent::TrackingAgent;
use crate::config::TrackingConfig;
use crate::error::AgentError;
use crate::status::AgentStatus;
use crate::upload::FlushOutcome;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

/// Partial settings update; absent fields are left alone
#[derive(Debug, Default, Deserialize)]
pub struct ConfigPatch {
    pub server_host: Option<String>,
    pub api_key: Option<String>,
    pub tracking_enabled: Option<bool>,
    pub high_density: Option<bool>,
    pub debug_notifications: Option<bool>,
    pub max_buffer_size: Option<usize>,
}

struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AgentError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(agent: TrackingAgent) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/config", get(get_config_handler).put(put_config_handler))
        .route("/flush", post(flush_handler))
        .route("/clear", post(clear_handler))
        .with_state(agent)
}

/// Serve the local control surface until the listener fails
pub async fn start_control_server(agent: TrackingAgent, port: u16) -> Result<(), AgentError> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Control server listening on http://{}", addr);
    axum::serve(listener, router(agent)).await?;
    Ok(())
}

async fn status_handler(State(agent): State<TrackingAgent>) -> Json<AgentStatus> {
    Json(agent.status())
}

async fn get_config_handler(State(agent): State<TrackingAgent>) -> Json<TrackingConfig> {
    Json(agent.config())
}

async fn put_config_handler(
    State(agent): State<TrackingAgent>,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<TrackingConfig>, ApiError> {
    // Validate before touching anything
    if let Some(records) = patch.max_buffer_size {
        agent.set_max_buffer_size(records)?;
    }
    if let Some(host) = patch.server_host {
        agent.set_server_host(&host)?;
    }
    if let Some(key) = patch.api_key {
        agent.set_api_key(&key)?;
    }
    if let Some(enabled) = patch.high_density {
        agent.set_high_density(enabled)?;
    }
    if let Some(enabled) = patch.debug_notifications {
        agent.set_debug_notifications(enabled)?;
    }
    if let Some(enabled) = patch.tracking_enabled {
        agent.set_tracking_enabled(enabled)?;
    }
    Ok(Json(agent.config()))
}

async fn flush_handler(State(agent): State<TrackingAgent>) -> Json<FlushOutcome> {
    Json(agent.flush_now().await)
}

async fn clear_handler(State(agent): State<TrackingAgent>) -> Json<serde_json::Value> {
    agent.clear_buffer();
    agent.drain_writes().await;
    Json(json!({ "buffer_len": agent.buffer_len() }))
}
