// Wire types shared by the HTTP surface and the realtime channel.

use serde::{Deserialize, Serialize};

use crate::auction::balance::TeamStanding;
use crate::auction::ledger::LedgerAction;
use crate::auction::player::{Player, Team};

/// Operation tag carried on realtime updates. Distinct from the ledger's
/// action strings: a first sale is announced as `sold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "sold")]
    Sold,
    #[serde(rename = "update")]
    Update,
}

impl From<LedgerAction> for Operation {
    fn from(action: LedgerAction) -> Self {
        match action {
            LedgerAction::Sell => Operation::Sold,
            LedgerAction::Update => Operation::Update,
        }
    }
}

/// Server-to-viewer messages on the WebSocket channel.
///
/// A session always receives one `snapshot` immediately after connecting,
/// establishing its baseline, followed by zero or more `playerUpdated`
/// events in publish order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "snapshot")]
    Snapshot {
        players: Vec<Player>,
        teams: Vec<Team>,
    },
    #[serde(rename = "playerUpdated")]
    PlayerUpdated {
        player: Player,
        operation: Operation,
    },
}

/// Body of `POST /players/sell`.
///
/// `price` is deliberately loose here: clients have historically sent both
/// JSON numbers and strings, so it is captured raw and validated by the sale
/// handler before anything is mutated. `name` and `position` are only
/// required when the player id is not already in the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellRequest {
    #[serde(rename = "playerId")]
    pub player_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    pub team: String,
    pub price: serde_json::Value,
    #[serde(rename = "modifiedTime", default)]
    pub modified_time: Option<i64>,
}

/// Success body of `POST /players/sell`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellResponse {
    pub message: String,
    pub player: Player,
    pub team: TeamStanding,
}

/// Error body for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Body of `GET /teams/:name`: the seed row, derived balance, and the
/// computed member list (never stored as a forward reference).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub standing: TeamStanding,
    pub members: Vec<Player>,
}
