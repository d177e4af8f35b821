// Static roster seed loading.
//
// The seed file is a read-only external input: the core only merges sale
// state on top of it and never writes identity data back.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auction::player::{Player, Position};
use crate::db::Database;

/// Raw roster CSV row: `id,name,position,codolio_link`.
#[derive(Debug, Deserialize)]
struct RawRosterRow {
    id: String,
    name: String,
    position: String,
    #[serde(default)]
    codolio_link: Option<String>,
}

/// Parse roster rows from any reader. Rows with an unknown position or a
/// duplicate id are skipped with a warning rather than failing the whole
/// seed, matching how the event roster is maintained by hand.
pub fn load_roster_from_reader<R: Read>(rdr: R) -> Result<Vec<Player>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players: Vec<Player> = Vec::new();
    for result in reader.deserialize::<RawRosterRow>() {
        let raw = result?;
        let id = raw.id.trim().to_string();
        if id.is_empty() {
            warn!("skipping roster row with empty id (name: {})", raw.name.trim());
            continue;
        }
        if players.iter().any(|p| p.id == id) {
            warn!("skipping duplicate roster id {id}");
            continue;
        }
        let Some(position) = Position::from_str_pos(raw.position.trim()) else {
            warn!(
                "skipping roster id {id}: unknown position '{}'",
                raw.position.trim()
            );
            continue;
        };
        let mut player = Player::unsold(id, raw.name.trim().to_string(), position);
        player.codolio_link = raw
            .codolio_link
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        players.push(player);
    }
    Ok(players)
}

/// Load the roster seed file from disk.
pub fn load_roster(path: &Path) -> Result<Vec<Player>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open roster seed {}", path.display()))?;
    load_roster_from_reader(file)
        .with_context(|| format!("failed to parse roster seed {}", path.display()))
}

/// Seed the roster store from the static definition, but only when the
/// players table is empty: restarts must never clobber live sale state.
/// Returns the number of players inserted.
pub fn seed_roster(db: &Database, path: &Path) -> Result<usize> {
    if db.player_count()? > 0 {
        info!("players already present; skipping roster seed");
        return Ok(0);
    }
    let players = load_roster(path)?;
    for player in &players {
        db.insert_seed_player(player)?;
    }
    info!("seeded {} players from {}", players.len(), path.display());
    Ok(players.len())
}
