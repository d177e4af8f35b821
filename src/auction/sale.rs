// Sale transaction handler: the single mutating entry point.
//
// Flow for an accepted request: validate, classify sell/update and upsert
// the roster record (one critical section), append a ledger entry, publish
// the updated record to all viewer sessions, and return the player with the
// destination team's freshly derived balance.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::auction::balance::{balance, TeamStanding};
use crate::auction::ledger::{LedgerAction, NewLedgerEntry};
use crate::auction::player::{Player, Position, TeamName};
use crate::broadcast::UpdateBus;
use crate::db::{Database, StoreError};
use crate::protocol::SellRequest;

/// Failure taxonomy for sale transactions.
#[derive(Debug, Error)]
pub enum SaleError {
    /// Malformed request; nothing was mutated.
    #[error("{0}")]
    InvalidArgument(String),

    /// Referenced team has no seed row; nothing was mutated.
    #[error("{0}")]
    NotFound(String),

    /// Datastore failure before or during the upsert; the roster upsert is
    /// all-or-nothing, so nothing was partially applied.
    #[error("storage unavailable: {0}")]
    Storage(anyhow::Error),

    /// The roster mutation committed and was broadcast, but the ledger
    /// append failed. Surfaced distinctly so operators can reconcile the
    /// missing log line; never retried automatically and never rolled back.
    #[error("sale applied but ledger append failed: {message}")]
    PartialSuccess {
        outcome: SaleOutcome,
        message: String,
    },
}

/// Result of an accepted sale transaction.
#[derive(Debug, Clone)]
pub struct SaleOutcome {
    pub player: Player,
    pub action: LedgerAction,
    /// Derived balance of the destination team after the sale.
    pub team: TeamStanding,
}

/// The handler owns the store and the broadcast bus; the HTTP layer holds it
/// behind an `Arc` and calls [`SaleHandler::sell`] per request.
pub struct SaleHandler {
    db: Arc<Database>,
    bus: UpdateBus,
}

impl SaleHandler {
    pub fn new(db: Arc<Database>, bus: UpdateBus) -> Self {
        Self { db, bus }
    }

    /// Process one sale/update request end to end.
    ///
    /// Validation is fail-fast: every `InvalidArgument` is raised before any
    /// mutation. Broadcast is fire-and-forget; the caller never waits on
    /// delivery to viewer sessions.
    pub fn sell(&self, req: &SellRequest) -> Result<SaleOutcome, SaleError> {
        let team = parse_team(&req.team)?;
        let price = parse_price(&req.price)?;
        let position = parse_position(req.position.as_deref())?;
        if req.player_id.trim().is_empty() {
            return Err(SaleError::InvalidArgument(
                "playerId must not be empty".to_string(),
            ));
        }
        let name = match req.name.as_deref().map(str::trim) {
            Some("") => None,
            other => other,
        };

        // The destination team must exist before anything is written.
        let seed = self
            .db
            .get_team(team)
            .map_err(SaleError::Storage)?
            .ok_or_else(|| SaleError::NotFound(format!("team {team} is not seeded")))?;

        let now = Utc::now().timestamp_millis();
        let applied = self
            .db
            .apply_sale(&req.player_id, name, position, team, price, now)
            .map_err(|e| match e {
                StoreError::MissingIdentity { id } => SaleError::InvalidArgument(format!(
                    "player {id} not found; name and position are required to create it"
                )),
                StoreError::Sqlite(e) => SaleError::Storage(e.into()),
            })?;

        let roster = self.db.list_players().map_err(SaleError::Storage)?;
        let b = balance(team, seed.wallet, &roster);
        let standing = TeamStanding {
            name: seed.name,
            wallet: seed.wallet,
            color: seed.color,
            spent: b.spent,
            remaining: b.remaining,
        };
        if standing.remaining < 0 {
            // Overspending is permitted by design; flag it for operators.
            warn!(
                team = %team,
                remaining = standing.remaining,
                "sale drove team balance negative"
            );
        }

        info!(
            player = %applied.player.id,
            team = %team,
            price,
            action = %applied.action,
            "sale applied"
        );

        let ledger_result = self.db.append_ledger(NewLedgerEntry {
            player_id: applied.player.id.clone(),
            player_name: applied.player.name.clone(),
            codolio_link: applied.prior_link.clone(),
            sold_to: team,
            price,
            action: applied.action,
        });

        // The roster change is authoritative and visible either way, so the
        // broadcast goes out even when the ledger append failed.
        self.bus.publish(applied.player.clone(), applied.action);

        let outcome = SaleOutcome {
            player: applied.player,
            action: applied.action,
            team: standing,
        };
        match ledger_result {
            Ok(_) => Ok(outcome),
            Err(e) => {
                warn!("ledger append failed after committed sale: {e:#}");
                Err(SaleError::PartialSuccess {
                    outcome,
                    message: format!("{e:#}"),
                })
            }
        }
    }
}

fn parse_team(s: &str) -> Result<TeamName, SaleError> {
    TeamName::from_str_name(s)
        .ok_or_else(|| SaleError::InvalidArgument(format!("unknown team name: {s}")))
}

fn parse_position(s: Option<&str>) -> Result<Option<Position>, SaleError> {
    match s {
        None => Ok(None),
        Some(raw) => Position::from_str_pos(raw)
            .map(Some)
            .ok_or_else(|| SaleError::InvalidArgument(format!("unknown position: {raw}"))),
    }
}

/// Parse the request's price field, which may arrive as a JSON number or a
/// numeric string, into a non-negative integer.
fn parse_price(value: &serde_json::Value) -> Result<u32, SaleError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n >= 0 && n <= i64::from(u32::MAX) => Ok(n as u32),
        Some(n) => Err(SaleError::InvalidArgument(format!(
            "price must be a non-negative integer, got {n}"
        ))),
        None => Err(SaleError::InvalidArgument(format!(
            "price must be a non-negative integer, got {value}"
        ))),
    }
}
