use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use host_integration::{ParticipantDirectory, TokioScheduler};
use serde::Deserialize;
use shared::{
    domain::{CommandOrigin, Location, ParticipantName},
    error::{ApiError, ErrorCode, TpaError},
    protocol::{
        AcceptMenu, AcceptRequestBody, JoinRequest, MainMenu, MenuRequest, MoveRequest,
        ParticipantList, SendMenu, SendRequestBody,
    },
};
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tpa_api::TeleportService;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod sessions;

use app_state::AppState;
use config::{load_settings, request_timeout};
use sessions::SessionHub;

const MAX_BODY_BYTES: usize = 16 * 1024;
const MAX_NAME_BYTES: usize = 64;

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let timeout = request_timeout(settings.request_timeout_secs);
    if let Some(warning) = &timeout.warning {
        warn!(configured = settings.request_timeout_secs, "{warning}");
    }

    let (events, _) = broadcast::channel(settings.event_capacity.max(1));
    let hub = SessionHub::new(events);
    let tpa = TeleportService::new(
        hub.host_services(Arc::new(TokioScheduler::current())),
        timeout.duration,
    );
    let app = build_router(Arc::new(AppState { tpa, hub }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, timeout_secs = timeout.duration.as_secs(), "teleport server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/participants", get(list_participants).post(join))
        .route("/participants/:name", delete(leave))
        .route(
            "/participants/:name/location",
            put(move_participant).get(participant_location),
        )
        .route("/tpa/menu", post(open_menu))
        .route("/tpa/send_menu", get(send_menu))
        .route("/tpa/requests", post(send_request).get(accept_menu))
        .route("/tpa/requests/accept", post(accept_request))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::DuplicateRequest | ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::ExpiredRequest => StatusCode::GONE,
        ErrorCode::NoEligibleTargets | ErrorCode::NoPendingRequests | ErrorCode::NotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorCode::InvalidOrigin => StatusCode::FORBIDDEN,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(code: ErrorCode, message: impl Into<String>) -> HttpError {
    (status_for(code), Json(ApiError::new(code, message)))
}

fn tpa_error(error: TpaError) -> HttpError {
    let api = ApiError::from(error);
    (status_for(api.code), Json(api))
}

fn validate_name(name: &ParticipantName) -> Result<(), HttpError> {
    let trimmed = name.as_str().trim();
    if trimmed.is_empty() || trimmed != name.as_str() {
        return Err(api_error(
            ErrorCode::Validation,
            "participant name must be non-empty without surrounding whitespace",
        ));
    }
    if name.as_str().len() > MAX_NAME_BYTES {
        return Err(api_error(ErrorCode::Validation, "participant name is too long"));
    }
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_participants(State(state): State<Arc<AppState>>) -> Json<ParticipantList> {
    Json(ParticipantList {
        participants: state.hub.participant_names().await,
    })
}

async fn join(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinRequest>,
) -> Result<StatusCode, HttpError> {
    validate_name(&req.name)?;
    if !state.hub.join(req.name.clone(), req.location).await {
        return Err(api_error(
            ErrorCode::Conflict,
            format!("participant {} is already connected", req.name),
        ));
    }
    Ok(StatusCode::CREATED)
}

async fn leave(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, HttpError> {
    let name = ParticipantName::from(name);
    if !state.hub.leave(&name).await {
        return Err(api_error(
            ErrorCode::NotFound,
            format!("participant {name} is not connected"),
        ));
    }
    state.tpa.participant_left(&name).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_participant(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<MoveRequest>,
) -> Result<StatusCode, HttpError> {
    let name = ParticipantName::from(name);
    if !state.hub.move_to(&name, req.location).await {
        return Err(api_error(
            ErrorCode::NotFound,
            format!("participant {name} is not connected"),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn participant_location(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Location>, HttpError> {
    let name = ParticipantName::from(name);
    state.hub.location_of(&name).await.map(Json).ok_or_else(|| {
        api_error(
            ErrorCode::NotFound,
            format!("participant {name} is not connected"),
        )
    })
}

async fn open_menu(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MenuRequest>,
) -> Result<Json<MainMenu>, HttpError> {
    let origin = match req.origin {
        Some(name) => CommandOrigin::Participant(name),
        None => CommandOrigin::Server,
    };
    state.tpa.open_menu(&origin).await.map(Json).map_err(tpa_error)
}

async fn send_menu(
    State(state): State<Arc<AppState>>,
    Query(q): Query<NameQuery>,
) -> Result<Json<SendMenu>, HttpError> {
    state
        .tpa
        .send_menu(&ParticipantName::from(q.name))
        .await
        .map(Json)
        .map_err(tpa_error)
}

async fn send_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendRequestBody>,
) -> Result<StatusCode, HttpError> {
    validate_name(&req.sender)?;
    validate_name(&req.target)?;
    state
        .tpa
        .send_request(&req.sender, &req.target)
        .await
        .map_err(tpa_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn accept_menu(
    State(state): State<Arc<AppState>>,
    Query(q): Query<NameQuery>,
) -> Result<Json<AcceptMenu>, HttpError> {
    state
        .tpa
        .accept_menu(&ParticipantName::from(q.name))
        .await
        .map(Json)
        .map_err(tpa_error)
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AcceptRequestBody>,
) -> Result<StatusCode, HttpError> {
    validate_name(&req.target)?;
    validate_name(&req.requester)?;
    state
        .tpa
        .accept_request(&req.target, &req.requester)
        .await
        .map_err(tpa_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<NameQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket, ParticipantName::from(q.name)))
}

async fn ws_connection(
    state: Arc<AppState>,
    socket: axum::extract::ws::WebSocket,
    name: ParticipantName,
) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.hub.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(participant = %name, skipped, "notice stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if !event.is_visible_to(&name) {
                continue;
            }
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
