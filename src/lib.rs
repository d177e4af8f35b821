// Live auction tracker: an admin sells clan players to fixed teams, every
// accepted transaction lands in SQLite and an append-only ledger, and all
// connected viewer sessions converge on the same roster over WebSocket.

pub mod auction;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod protocol;
pub mod seed;
pub mod server;
pub mod viewer;
