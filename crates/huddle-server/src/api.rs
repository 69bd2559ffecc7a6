use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, Method},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use huddle_shared::constants::SESSION_HEADER;
use huddle_shared::session::SessionVerifier;
use huddle_shared::{ChatId, SessionError, UserId};
use huddle_store::RecordStore;

use crate::client;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::finder::ChatFinder;
use crate::hub::HubHandle;

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub store: Arc<dyn RecordStore>,
    pub verifier: Arc<dyn SessionVerifier>,
    pub finder: Arc<ChatFinder>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_upgrade))
        .route("/api/find-chat", get(can_find_chat).post(find_chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct FindChatResponse {
    queued: bool,
    chat_id: Option<ChatId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanFindChatResponse {
    can_find_chat: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // The frame limit is enforced per message after the handshake, so a
    // session token may be longer than a chat frame.
    ws.on_upgrade(move |socket| client::serve(socket, state))
}

async fn find_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FindChatResponse>, ServerError> {
    let user_id = session_user(&headers, state.verifier.as_ref())?;

    let chat = state.finder.find_chat(&user_id).await?;
    let chat_id = chat
        .filter(|chat| chat.participants.contains(&user_id))
        .map(|chat| chat.id);

    info!(user = %user_id, matched = chat_id.is_some(), "Find-chat request");

    Ok(Json(FindChatResponse {
        queued: chat_id.is_none(),
        chat_id,
    }))
}

async fn can_find_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CanFindChatResponse>, ServerError> {
    let user_id = session_user(&headers, state.verifier.as_ref())?;
    Ok(Json(CanFindChatResponse {
        can_find_chat: state.finder.can_find_chat(&user_id)?,
    }))
}

fn session_user(headers: &HeaderMap, verifier: &dyn SessionVerifier) -> Result<UserId, ServerError> {
    let value = headers
        .get(SESSION_HEADER)
        .ok_or(ServerError::Unauthorized(SessionError::Malformed))?;
    let token = value
        .to_str()
        .map_err(|_| ServerError::BadRequest("Session token is not valid text".into()))?;
    Ok(verifier.verify(token)?)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
