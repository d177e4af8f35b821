// HTTP and WebSocket surface.
//
// Read endpoints are open; mutating endpoints sit behind the shared admin
// key. The WebSocket route is the realtime channel: every session gets one
// full-roster snapshot on connect, then incremental updates in publish
// order.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::auction::balance::standings;
use crate::auction::ledger::NewLedgerEntry;
use crate::auction::player::TeamName;
use crate::auction::sale::{SaleError, SaleHandler};
use crate::broadcast::{PlayerUpdate, UpdateBus};
use crate::db::Database;
use crate::protocol::{ErrorBody, Operation, SellRequest, SellResponse, ServerMessage, TeamDetail};

/// Header carrying the shared admin secret on mutating requests.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub bus: UpdateBus,
    pub handler: Arc<SaleHandler>,
    pub admin_key: Arc<str>,
}

impl AppState {
    pub fn new(db: Arc<Database>, bus: UpdateBus, admin_key: &str) -> Self {
        let handler = Arc::new(SaleHandler::new(Arc::clone(&db), bus.clone()));
        Self {
            db,
            bus,
            handler,
            admin_key: Arc::from(admin_key),
        }
    }
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(ADMIN_KEY_HEADER)]);

    Router::new()
        .route("/players", get(list_players))
        .route("/players/unsold", get(list_unsold))
        .route("/players/sell", post(sell))
        .route("/teams", get(list_teams))
        .route("/teams/:name", get(team_detail))
        .route("/logs", get(list_logs).post(append_log))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

fn storage_error(e: anyhow::Error) -> Response {
    warn!("storage error: {e:#}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

/// Check the shared admin secret. Returns an error response on mismatch.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided == state.admin_key.as_ref() {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::UNAUTHORIZED,
            "missing or invalid admin key",
        ))
    }
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

async fn list_players(State(state): State<AppState>) -> Response {
    match state.db.list_players() {
        Ok(players) => Json(players).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn list_unsold(State(state): State<AppState>) -> Response {
    match state.db.list_unsold_players() {
        Ok(players) => Json(players).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn sell(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SellRequest>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    match state.handler.sell(&req) {
        Ok(outcome) => Json(SellResponse {
            message: "Player sold successfully".to_string(),
            player: outcome.player,
            team: outcome.team,
        })
        .into_response(),
        Err(SaleError::InvalidArgument(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(SaleError::NotFound(msg)) => error_response(StatusCode::NOT_FOUND, msg),
        Err(SaleError::Storage(e)) => storage_error(e),
        Err(SaleError::PartialSuccess { outcome, message }) => {
            // The sale is committed and visible; only the audit line is
            // missing. 207 tells the admin both halves of that story.
            (
                StatusCode::MULTI_STATUS,
                Json(SellResponse {
                    message: format!("Player sold, but the transaction log entry failed: {message}"),
                    player: outcome.player,
                    team: outcome.team,
                }),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

async fn list_teams(State(state): State<AppState>) -> Response {
    let teams = match state.db.list_teams() {
        Ok(teams) => teams,
        Err(e) => return storage_error(e),
    };
    let roster = match state.db.list_players() {
        Ok(roster) => roster,
        Err(e) => return storage_error(e),
    };
    Json(standings(&teams, &roster)).into_response()
}

async fn team_detail(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(team) = TeamName::from_str_name(&name) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown team name: {name}"));
    };
    let seed = match state.db.get_team(team) {
        Ok(Some(seed)) => seed,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, format!("team {team} is not seeded"))
        }
        Err(e) => return storage_error(e),
    };
    let roster = match state.db.list_players() {
        Ok(roster) => roster,
        Err(e) => return storage_error(e),
    };

    let standing = standings(&[seed], &roster).remove(0);
    // The member list is always computed from the roster, never stored.
    let members = roster
        .into_iter()
        .filter(|p| p.team == Some(team))
        .collect();
    Json(TeamDetail { standing, members }).into_response()
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn list_logs(State(state): State<AppState>, Query(query): Query<LogsQuery>) -> Response {
    match state.db.list_ledger(query.limit) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn append_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(entry): Json<NewLedgerEntry>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    match state.db.append_ledger(entry) {
        Ok(saved) => (StatusCode::CREATED, Json(saved)).into_response(),
        Err(e) => storage_error(e),
    }
}

// ---------------------------------------------------------------------------
// Realtime channel
// ---------------------------------------------------------------------------

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// Serve one viewer session: snapshot first, then updates until disconnect.
async fn handle_session(socket: WebSocket, state: AppState) {
    // Subscribe before reading the snapshot so no update published in
    // between is lost; a duplicate across that boundary is harmless because
    // the client reducer overwrites by id.
    let mut updates = state.bus.subscribe();

    let snapshot = match build_snapshot(&state) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("failed to build snapshot for new session: {e:#}");
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();
    if send_message(&mut sender, &snapshot).await.is_err() {
        return;
    }
    info!("viewer session connected ({} active)", state.bus.session_count());

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("viewer session error: {e}");
                        break;
                    }
                    // Incoming text/binary from viewers is ignored; the
                    // channel is server-to-client only.
                    Some(Ok(_)) => {}
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(PlayerUpdate { player, operation }) => {
                        let msg = ServerMessage::PlayerUpdated {
                            player,
                            operation: Operation::from(operation),
                        };
                        if send_message(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // The session missed events; it keeps receiving from
                        // here and will fully re-sync on its next reconnect.
                        warn!("viewer session lagged, skipped {skipped} updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    info!("viewer session disconnected");
}

fn build_snapshot(state: &AppState) -> anyhow::Result<ServerMessage> {
    Ok(ServerMessage::Snapshot {
        players: state.db.list_players()?,
        teams: state.db.list_teams()?,
    })
}

async fn send_message(
    sender: &mut (impl SinkExt<Message> + Unpin),
    msg: &ServerMessage,
) -> Result<(), ()> {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            warn!("failed to encode server message: {e}");
            return Err(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
