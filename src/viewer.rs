// Viewer session: local roster reducer, WebSocket client, and admin client.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Context};
use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::auction::balance::{balance, standings, TeamBalance, TeamStanding};
use crate::auction::player::{Player, Team, TeamName};
use crate::protocol::{ErrorBody, SellRequest, SellResponse, ServerMessage};

/// Local mirror of the roster held by one viewer session.
///
/// Updates are merged by player identity with a full overwrite of the
/// record, so applying the same update twice is a no-op and delivery order
/// only matters per player ("last received wins"). Balances and sorted
/// views are derived on demand, never maintained as running totals.
#[derive(Debug, Default)]
pub struct RosterView {
    players: HashMap<String, Player>,
    teams: Vec<Team>,
}

impl RosterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the local state wholesale with a connect-time snapshot.
    pub fn apply_snapshot(&mut self, players: Vec<Player>, teams: Vec<Team>) {
        self.players = players.into_iter().map(|p| (p.id.clone(), p)).collect();
        self.teams = teams;
    }

    /// Merge one published player record: insert if absent, otherwise
    /// replace the existing entry.
    pub fn apply_update(&mut self, player: Player) {
        self.players.insert(player.id.clone(), player);
    }

    /// Apply any decoded server message.
    pub fn apply(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Snapshot { players, teams } => self.apply_snapshot(players, teams),
            ServerMessage::PlayerUpdated { player, .. } => self.apply_update(player),
        }
    }

    /// All players, ordered by id (derived lazily).
    pub fn players_sorted(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }

    /// Players not yet sold, ordered by id.
    pub fn unsold(&self) -> Vec<Player> {
        self.players_sorted().into_iter().filter(|p| !p.sold).collect()
    }

    /// Re-derive one team's balance from the local roster. Returns `None`
    /// until a snapshot with team seeds has been applied.
    pub fn balance(&self, team: TeamName) -> Option<TeamBalance> {
        let seed = self.teams.iter().find(|t| t.name == team)?;
        let roster: Vec<Player> = self.players.values().cloned().collect();
        Some(balance(team, seed.wallet, &roster))
    }

    /// Re-derive standings for every seeded team.
    pub fn standings(&self) -> Vec<TeamStanding> {
        let roster: Vec<Player> = self.players.values().cloned().collect();
        standings(&self.teams, &roster)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// Connect to the tracker's realtime channel and keep `view` current until
/// the server closes the connection.
pub async fn run_viewer(url: &str, view: &Mutex<RosterView>) -> anyhow::Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    info!("viewer connected to {url}");
    let (_write, read) = ws.split();
    process_message_stream(read, view).await;
    info!("viewer disconnected");
    Ok(())
}

/// Process raw WebSocket messages from any [`Stream`], applying decoded
/// server messages to the view. This is a pure-logic function that requires
/// no I/O and is the primary unit-test target.
pub async fn process_message_stream<St>(mut stream: St, view: &Mutex<RosterView>)
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(msg) => {
                    let mut view = view.lock().expect("roster view mutex poisoned");
                    view.apply(msg);
                }
                Err(e) => {
                    warn!("ignoring undecodable server message: {e}");
                }
            },
            Ok(Message::Close(_)) => {
                info!("server sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
}

/// HTTP client for the admin's mutating endpoints.
pub struct AdminClient {
    http: reqwest::Client,
    base_url: String,
    admin_key: String,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>, admin_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            admin_key: admin_key.into(),
        }
    }

    /// Submit a sale. On rejection the server's error message is surfaced
    /// with the attempted input left intact in `req` for resubmission.
    pub async fn sell(&self, req: &SellRequest) -> anyhow::Result<SellResponse> {
        let url = format!("{}/players/sell", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("x-admin-key", &self.admin_key)
            .json(req)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        let status = resp.status();
        if status.is_success() {
            resp.json::<SellResponse>()
                .await
                .context("failed to decode sell response")
        } else {
            let message = resp
                .json::<ErrorBody>()
                .await
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("request failed with status {status}"));
            bail!("sale rejected ({status}): {message}");
        }
    }

    /// Fetch the current roster snapshot over HTTP.
    pub async fn fetch_players(&self) -> anyhow::Result<Vec<Player>> {
        let url = format!("{}/players", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .json::<Vec<Player>>()
            .await
            .context("failed to decode players response")
    }
}
