// Auction domain: players, teams, derived balances, the ledger, and the
// sale transaction handler.

pub mod balance;
pub mod ledger;
pub mod player;
pub mod sale;
