// Append-only transaction ledger types.
//
// Ledger entries are an audit trail for display: created once per accepted
// sale transaction, never edited or deleted, and never read back to
// reconstruct roster state.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::player::TeamName;

/// How a transaction was classified against the pre-mutation roster record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerAction {
    /// First sale of a previously unsold (or unknown) player.
    #[serde(rename = "sell")]
    Sell,
    /// Re-price or re-team of an already-sold player.
    #[serde(rename = "update")]
    Update,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAction::Sell => "sell",
            LedgerAction::Update => "update",
        }
    }

    pub fn from_str_action(s: &str) -> Option<Self> {
        match s {
            "sell" => Some(LedgerAction::Sell),
            "update" => Some(LedgerAction::Update),
            _ => None,
        }
    }
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entry that has not yet been persisted. The store assigns the row id
/// and the server timestamp on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerEntry {
    pub player_id: String,
    pub player_name: String,
    #[serde(default)]
    pub codolio_link: String,
    pub sold_to: TeamName,
    pub price: u32,
    pub action: LedgerAction,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Auto-assigned row id; None before the entry has been persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub player_id: String,
    pub player_name: String,
    /// Pre-mutation profile link, empty string when the player had none.
    #[serde(default)]
    pub codolio_link: String,
    pub sold_to: TeamName,
    pub price: u32,
    pub action: LedgerAction,
    /// Server-assigned millisecond timestamp.
    pub timestamp: i64,
}
