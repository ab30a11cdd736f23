pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, Request, State, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, info, info_span};

use heartout_api::ai::AiClient;
use heartout_api::middleware::authenticate;
use heartout_api::payments::PaymentsClient;
use heartout_api::{ApiError, AppState, AppStateInner};
use heartout_db::{Database, MemStorage, Storage};
use heartout_gateway::{Dispatcher, connection};

use crate::config::{Config, StorageKind};

/// Builds the shared state: storage backend, dispatcher and optional integrations.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let storage: Arc<dyn Storage> = match config.storage {
        StorageKind::Sqlite => Arc::new(Database::open(&config.db_path)?),
        StorageKind::Memory => {
            info!("Using in-memory storage; nothing will be persisted");
            Arc::new(MemStorage::new())
        }
    };

    let mut inner = AppStateInner::new(storage, Dispatcher::new(), config.jwt());
    if let Some(key) = &config.openai_api_key {
        inner.ai = Some(AiClient::new(
            key.clone(),
            config.openai_base_url.clone(),
            config.openai_model.clone(),
        )?);
        info!("AI assistant enabled");
    }
    if let Some(key) = &config.stripe_secret_key {
        inner.payments = Some(PaymentsClient::new(key.clone(), config.stripe_api_base.clone())?);
        info!("Payments enabled");
    }
    if !config.admin_emails.is_empty() {
        info!("{} bootstrap admin email(s) configured", config.admin_emails.len());
    }
    inner.admin_emails = config.admin_emails.clone();
    Ok(Arc::new(inner))
}

/// The full application: REST under `/api` and the realtime socket at `/ws`.
pub fn app(state: AppState) -> Router {
    let ws_route = Router::new().route("/ws", get(ws_upgrade)).with_state(state.clone());

    Router::new()
        .merge(heartout_api::router(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

/// Span for one HTTP request. Records the path only: `/ws` carries the access
/// token in its query string.
fn request_span(req: &Request) -> Span {
    info_span!("request", method = %req.method(), path = %req.uri().path())
}

#[derive(Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// Token is checked before upgrading; a bad one never gets a socket.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = params.token.ok_or_else(ApiError::unauthorized)?;
    let user = authenticate(&state, &token).await?;

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, user.id, user.username)))
}
