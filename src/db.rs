// SQLite persistence: roster store, team seeds, and the transaction ledger.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::auction::ledger::{LedgerAction, LedgerEntry, NewLedgerEntry};
use crate::auction::player::{Player, Position, Team, TeamName};

/// Errors from the sale critical section that the handler must tell apart.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The player does not exist yet and the request carried no identity
    /// fields, so there is nothing to materialize a record from.
    #[error("player {id} not found and name/position are missing")]
    MissingIdentity { id: String },

    #[error("storage unavailable: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result of applying a sale inside the critical section.
#[derive(Debug, Clone)]
pub struct SaleApplied {
    /// The fully-updated player record as committed.
    pub player: Player,
    /// Classification against the pre-mutation record.
    pub action: LedgerAction,
    /// The player's profile link as it was before the mutation (empty when
    /// absent); recorded on the ledger entry.
    pub prior_link: String,
}

impl FromSql for TeamName {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        TeamName::from_str_name(s).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for TeamName {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.display_str().into())
    }
}

impl FromSql for Position {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Position::from_str_pos(s).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for Position {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.display_str().into())
    }
}

impl FromSql for LedgerAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        LedgerAction::from_str_action(s).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for LedgerAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// SQLite-backed store for players, teams, and ledger entries.
///
/// All access goes through one connection behind a mutex, so every write is
/// a critical section. That is coarser than the per-player lock the sale
/// path requires, but at tens of clients it is the simpler correct choice:
/// two concurrent sales for the same id cannot interleave partial writes.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id            TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                position      TEXT NOT NULL,
                codolio_link  TEXT,
                sold          INTEGER NOT NULL DEFAULT 0,
                team          TEXT,
                price         INTEGER NOT NULL DEFAULT 0,
                modified_time INTEGER
            );

            CREATE TABLE IF NOT EXISTS teams (
                name   TEXT PRIMARY KEY,
                wallet INTEGER NOT NULL,
                color  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ledger (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id    TEXT NOT NULL,
                player_name  TEXT NOT NULL,
                codolio_link TEXT NOT NULL DEFAULT '',
                sold_to      TEXT NOT NULL,
                price        INTEGER NOT NULL,
                action       TEXT NOT NULL,
                timestamp    INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_timestamp ON ledger(timestamp);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    /// Insert team seed rows if absent. Idempotent across restarts: existing
    /// rows keep their stored wallet and color.
    pub fn seed_teams(&self, teams: &[Team]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin team seed")?;
        for team in teams {
            tx.execute(
                "INSERT OR IGNORE INTO teams (name, wallet, color) VALUES (?1, ?2, ?3)",
                params![team.name, team.wallet, team.color],
            )
            .with_context(|| format!("failed to seed team {}", team.name))?;
        }
        tx.commit().context("failed to commit team seed")
    }

    /// All seeded teams, in name order.
    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name, wallet, color FROM teams ORDER BY name")
            .context("failed to prepare list_teams query")?;
        let teams = stmt
            .query_map([], |row| {
                Ok(Team {
                    name: row.get(0)?,
                    wallet: row.get(1)?,
                    color: row.get(2)?,
                })
            })
            .context("failed to query teams")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map team rows")?;
        Ok(teams)
    }

    /// Look up one team's seed row. Returns `None` for unseeded names.
    pub fn get_team(&self, name: TeamName) -> Result<Option<Team>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT name, wallet, color FROM teams WHERE name = ?1",
            params![name],
            |row| {
                Ok(Team {
                    name: row.get(0)?,
                    wallet: row.get(1)?,
                    color: row.get(2)?,
                })
            },
        )
        .optional()
        .context("failed to query team")
    }

    // ------------------------------------------------------------------
    // Roster store
    // ------------------------------------------------------------------

    const PLAYER_COLUMNS: &'static str =
        "id, name, position, codolio_link, sold, team, price, modified_time";

    fn player_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Player> {
        Ok(Player {
            id: row.get(0)?,
            name: row.get(1)?,
            position: row.get(2)?,
            codolio_link: row.get(3)?,
            sold: row.get(4)?,
            team: row.get(5)?,
            price: row.get(6)?,
            modified_time: row.get(7)?,
        })
    }

    /// Point lookup by player id.
    pub fn get_player(&self, id: &str) -> Result<Option<Player>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM players WHERE id = ?1", Self::PLAYER_COLUMNS),
            params![id],
            Self::player_from_row,
        )
        .optional()
        .context("failed to query player")
    }

    /// Full roster snapshot, ordered by id for deterministic catch-up.
    pub fn list_players(&self) -> Result<Vec<Player>> {
        self.query_players(&format!(
            "SELECT {} FROM players ORDER BY id",
            Self::PLAYER_COLUMNS
        ))
    }

    /// Snapshot filtered to players that have not been sold yet.
    pub fn list_unsold_players(&self) -> Result<Vec<Player>> {
        self.query_players(&format!(
            "SELECT {} FROM players WHERE sold = 0 ORDER BY id",
            Self::PLAYER_COLUMNS
        ))
    }

    fn query_players(&self, sql: &str) -> Result<Vec<Player>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql).context("failed to prepare player query")?;
        let players = stmt
            .query_map([], Self::player_from_row)
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;
        Ok(players)
    }

    /// Number of player rows. Used to decide whether the roster seed runs.
    pub fn player_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))
            .context("failed to count players")?;
        Ok(count as usize)
    }

    /// Insert an identity row from the seed roster. A no-op when the id
    /// already exists, so re-running the seed never clobbers sale state.
    pub fn insert_seed_player(&self, player: &Player) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO players
                (id, name, position, codolio_link, sold, team, price, modified_time)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, 0, NULL)",
            params![player.id, player.name, player.position, player.codolio_link],
        )
        .with_context(|| format!("failed to seed player {}", player.id))?;
        Ok(())
    }

    /// Apply a validated sale inside one critical section.
    ///
    /// Reads the pre-mutation record, classifies the operation (sell for an
    /// unsold or unknown player, update for an already-sold one), and
    /// upserts the sale state, all under a single lock acquisition and
    /// SQLite transaction. Concurrent calls for the same id therefore log
    /// exactly one `sell`, and the committed record always equals exactly
    /// one submitted payload.
    ///
    /// `modified_time` is forced strictly past the previous record's value
    /// so the per-player timestamp advances even if the clock stalls.
    pub fn apply_sale(
        &self,
        id: &str,
        name: Option<&str>,
        position: Option<Position>,
        team: TeamName,
        price: u32,
        now_millis: i64,
    ) -> std::result::Result<SaleApplied, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!("SELECT {} FROM players WHERE id = ?1", Self::PLAYER_COLUMNS),
                params![id],
                Self::player_from_row,
            )
            .optional()?;

        let (action, prior_link, prev_modified) = match &existing {
            Some(p) => (
                if p.sold {
                    LedgerAction::Update
                } else {
                    LedgerAction::Sell
                },
                p.codolio_link.clone().unwrap_or_default(),
                p.modified_time,
            ),
            None => (LedgerAction::Sell, String::new(), None),
        };

        let (name, position) = match &existing {
            Some(p) => (p.name.clone(), p.position),
            None => match (name, position) {
                (Some(n), Some(pos)) => (n.to_string(), pos),
                _ => {
                    return Err(StoreError::MissingIdentity { id: id.to_string() });
                }
            },
        };

        let modified_time = match prev_modified {
            Some(prev) => now_millis.max(prev + 1),
            None => now_millis,
        };

        tx.execute(
            "INSERT INTO players (id, name, position, sold, team, price, modified_time)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                sold          = 1,
                team          = excluded.team,
                price         = excluded.price,
                modified_time = excluded.modified_time",
            params![id, name, position, team, price, modified_time],
        )?;

        let player = tx.query_row(
            &format!("SELECT {} FROM players WHERE id = ?1", Self::PLAYER_COLUMNS),
            params![id],
            Self::player_from_row,
        )?;

        tx.commit()?;

        Ok(SaleApplied {
            player,
            action,
            prior_link,
        })
    }

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    /// Append an entry, assigning the server timestamp and row id. Entries
    /// are never updated or deleted.
    pub fn append_ledger(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let timestamp = Utc::now().timestamp_millis();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO ledger
                (player_id, player_name, codolio_link, sold_to, price, action, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.player_id,
                entry.player_name,
                entry.codolio_link,
                entry.sold_to,
                entry.price,
                entry.action,
                timestamp,
            ],
        )
        .context("failed to append ledger entry")?;

        Ok(LedgerEntry {
            id: Some(conn.last_insert_rowid()),
            player_id: entry.player_id,
            player_name: entry.player_name,
            codolio_link: entry.codolio_link,
            sold_to: entry.sold_to,
            price: entry.price,
            action: entry.action,
            timestamp,
        })
    }

    /// Ledger entries newest-first, optionally capped at `limit`.
    pub fn list_ledger(&self, limit: Option<usize>) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn();
        let sql = "SELECT id, player_id, player_name, codolio_link, sold_to, price, action, timestamp
                   FROM ledger ORDER BY timestamp DESC, id DESC LIMIT ?1";
        let mut stmt = conn.prepare(sql).context("failed to prepare ledger query")?;
        let cap = limit.map(|n| n as i64).unwrap_or(-1);
        let entries = stmt
            .query_map(params![cap], |row| {
                Ok(LedgerEntry {
                    id: Some(row.get(0)?),
                    player_id: row.get(1)?,
                    player_name: row.get(2)?,
                    codolio_link: row.get(3)?,
                    sold_to: row.get(4)?,
                    price: row.get(5)?,
                    action: row.get(6)?,
                    timestamp: row.get(7)?,
                })
            })
            .context("failed to query ledger")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map ledger rows")?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn seed_player(db: &Database, id: &str, name: &str) {
        db.insert_seed_player(&Player::unsold(id, name, Position::Member))
            .unwrap();
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"players".to_string()));
        assert!(tables.contains(&"teams".to_string()));
        assert!(tables.contains(&"ledger".to_string()));
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    #[test]
    fn seed_teams_is_idempotent() {
        let db = test_db();
        let teams = vec![Team {
            name: TeamName::Giants,
            wallet: 10_000,
            color: "bg-red-500".into(),
        }];
        db.seed_teams(&teams).unwrap();

        // Re-seeding with a different wallet must not clobber the stored row.
        let reseed = vec![Team {
            name: TeamName::Giants,
            wallet: 99,
            color: "bg-green-500".into(),
        }];
        db.seed_teams(&reseed).unwrap();

        let stored = db.get_team(TeamName::Giants).unwrap().unwrap();
        assert_eq!(stored.wallet, 10_000);
        assert_eq!(stored.color, "bg-red-500");
    }

    #[test]
    fn get_team_returns_none_when_unseeded() {
        let db = test_db();
        assert!(db.get_team(TeamName::Pekkas).unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Roster store
    // ------------------------------------------------------------------

    #[test]
    fn seed_player_then_lookup() {
        let db = test_db();
        seed_player(&db, "1", "Alice");

        let p = db.get_player("1").unwrap().unwrap();
        assert_eq!(p.name, "Alice");
        assert!(!p.sold);
        assert_eq!(p.team, None);
        assert_eq!(p.price, 0);
    }

    #[test]
    fn seed_player_never_clobbers_sale_state() {
        let db = test_db();
        seed_player(&db, "1", "Alice");
        db.apply_sale("1", None, None, TeamName::Giants, 300, 1_000)
            .unwrap();

        // Re-running the seed must leave the sale intact.
        seed_player(&db, "1", "Alice");
        let p = db.get_player("1").unwrap().unwrap();
        assert!(p.sold);
        assert_eq!(p.team, Some(TeamName::Giants));
    }

    #[test]
    fn list_unsold_filters_sold_players() {
        let db = test_db();
        seed_player(&db, "1", "Alice");
        seed_player(&db, "2", "Bob");
        db.apply_sale("1", None, None, TeamName::Wizards, 500, 1_000)
            .unwrap();

        let unsold = db.list_unsold_players().unwrap();
        assert_eq!(unsold.len(), 1);
        assert_eq!(unsold[0].id, "2");

        let all = db.list_players().unwrap();
        assert_eq!(all.len(), 2);
    }

    // ------------------------------------------------------------------
    // apply_sale
    // ------------------------------------------------------------------

    #[test]
    fn first_sale_classified_as_sell() {
        let db = test_db();
        seed_player(&db, "1", "Alice");

        let applied = db
            .apply_sale("1", None, None, TeamName::Giants, 300, 1_000)
            .unwrap();
        assert_eq!(applied.action, LedgerAction::Sell);
        assert!(applied.player.sold);
        assert_eq!(applied.player.team, Some(TeamName::Giants));
        assert_eq!(applied.player.price, 300);
        assert_eq!(applied.player.modified_time, Some(1_000));
    }

    #[test]
    fn second_sale_classified_as_update() {
        let db = test_db();
        seed_player(&db, "1", "Alice");
        db.apply_sale("1", None, None, TeamName::Giants, 300, 1_000)
            .unwrap();

        let applied = db
            .apply_sale("1", None, None, TeamName::Wizards, 500, 2_000)
            .unwrap();
        assert_eq!(applied.action, LedgerAction::Update);
        assert_eq!(applied.player.team, Some(TeamName::Wizards));
        assert_eq!(applied.player.price, 500);
    }

    #[test]
    fn unknown_player_materialized_from_identity_fields() {
        let db = test_db();
        let applied = db
            .apply_sale(
                "99",
                Some("Walk-in"),
                Some(Position::Elder),
                TeamName::Pekkas,
                150,
                1_000,
            )
            .unwrap();
        assert_eq!(applied.action, LedgerAction::Sell);
        assert_eq!(applied.player.name, "Walk-in");
        assert_eq!(applied.player.position, Position::Elder);
    }

    #[test]
    fn unknown_player_without_identity_is_rejected() {
        let db = test_db();
        let err = db
            .apply_sale("99", None, None, TeamName::Pekkas, 150, 1_000)
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingIdentity { .. }));
        // No row was materialized.
        assert!(db.get_player("99").unwrap().is_none());
    }

    #[test]
    fn identity_fields_are_immutable_on_update() {
        let db = test_db();
        seed_player(&db, "1", "Alice");
        db.apply_sale(
            "1",
            Some("Mallory"),
            Some(Position::CoLeader),
            TeamName::Giants,
            300,
            1_000,
        )
        .unwrap();

        let p = db.get_player("1").unwrap().unwrap();
        assert_eq!(p.name, "Alice");
        assert_eq!(p.position, Position::Member);
    }

    #[test]
    fn modified_time_strictly_advances() {
        let db = test_db();
        seed_player(&db, "1", "Alice");
        db.apply_sale("1", None, None, TeamName::Giants, 300, 5_000)
            .unwrap();

        // A stalled clock must still move the timestamp forward.
        let applied = db
            .apply_sale("1", None, None, TeamName::Giants, 400, 5_000)
            .unwrap();
        assert_eq!(applied.player.modified_time, Some(5_001));
    }

    #[test]
    fn prior_link_captured_before_mutation() {
        let db = test_db();
        let mut seeded = Player::unsold("1", "Alice", Position::Member);
        seeded.codolio_link = Some("https://codolio.com/alice".into());
        db.insert_seed_player(&seeded).unwrap();

        let applied = db
            .apply_sale("1", None, None, TeamName::Giants, 300, 1_000)
            .unwrap();
        assert_eq!(applied.prior_link, "https://codolio.com/alice");
    }

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    fn new_entry(player_id: &str, price: u32, action: LedgerAction) -> NewLedgerEntry {
        NewLedgerEntry {
            player_id: player_id.into(),
            player_name: format!("Player {player_id}"),
            codolio_link: String::new(),
            sold_to: TeamName::Barbarians,
            price,
            action,
        }
    }

    #[test]
    fn append_assigns_id_and_timestamp() {
        let db = test_db();
        let entry = db
            .append_ledger(new_entry("1", 300, LedgerAction::Sell))
            .unwrap();
        assert!(entry.id.is_some());
        assert!(entry.timestamp > 0);
    }

    #[test]
    fn list_ledger_is_newest_first() {
        let db = test_db();
        db.append_ledger(new_entry("1", 100, LedgerAction::Sell))
            .unwrap();
        db.append_ledger(new_entry("2", 200, LedgerAction::Sell))
            .unwrap();
        db.append_ledger(new_entry("1", 300, LedgerAction::Update))
            .unwrap();

        let entries = db.list_ledger(None).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].price, 300);
        assert_eq!(entries[0].action, LedgerAction::Update);
        assert_eq!(entries[2].price, 100);
    }

    #[test]
    fn list_ledger_honors_limit() {
        let db = test_db();
        for i in 0..5 {
            db.append_ledger(new_entry("1", i, LedgerAction::Sell))
                .unwrap();
        }
        let entries = db.list_ledger(Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].price, 4);
    }

    // ------------------------------------------------------------------
    // Concurrency: at-most-one-authoritative-state
    // ------------------------------------------------------------------

    #[test]
    fn concurrent_sales_commit_exactly_one_payload() {
        use std::sync::Arc;

        let db = Arc::new(test_db());
        db.insert_seed_player(&Player::unsold("1", "Alice", Position::Member))
            .unwrap();

        let payloads: Vec<(TeamName, u32)> = vec![
            (TeamName::Barbarians, 100),
            (TeamName::Giants, 200),
            (TeamName::Pekkas, 300),
            (TeamName::Wizards, 400),
        ];

        let handles: Vec<_> = payloads
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, (team, price))| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    db.apply_sale("1", None, None, team, price, 1_000 + i as i64)
                        .unwrap()
                })
            })
            .collect();
        let applied: Vec<SaleApplied> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Exactly one call observed the unsold record.
        let sells = applied
            .iter()
            .filter(|a| a.action == LedgerAction::Sell)
            .count();
        assert_eq!(sells, 1);

        // The committed record matches exactly one submitted payload, with
        // no mixed fields.
        let p = db.get_player("1").unwrap().unwrap();
        assert!(payloads
            .iter()
            .any(|&(team, price)| p.team == Some(team) && p.price == price));
    }
}
