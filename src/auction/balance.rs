// Team balance derivation.
//
// A team's spent total is always recomputed from the current roster, never
// maintained as a running counter. This keeps wallet figures consistent with
// the sale records after retries, reassignments, and partial failures.

use serde::{Deserialize, Serialize};

use super::player::{Player, Team, TeamName};

/// Derived budget figures for one team.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamBalance {
    /// Sum of prices over players currently assigned to the team.
    pub spent: u32,
    /// Starting wallet minus spent. Negative when the team has overspent
    /// (permitted; the data layer does not enforce wallet sufficiency).
    pub remaining: i64,
}

/// Compute one team's balance from a roster snapshot.
///
/// Pure and side-effect-free: the same snapshot always yields the same
/// result. A player counts toward exactly the team currently recorded on
/// them, so reassigning a player moves their price between teams atomically
/// with the roster write.
pub fn balance(team: TeamName, wallet: u32, roster: &[Player]) -> TeamBalance {
    let spent: u32 = roster
        .iter()
        .filter(|p| p.team == Some(team))
        .map(|p| p.price)
        .sum();
    TeamBalance {
        spent,
        remaining: i64::from(wallet) - i64::from(spent),
    }
}

/// A team together with its derived balance, for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStanding {
    pub name: TeamName,
    pub wallet: u32,
    pub color: String,
    pub spent: u32,
    pub remaining: i64,
}

/// Derive standings for every seeded team from one roster snapshot.
pub fn standings(teams: &[Team], roster: &[Player]) -> Vec<TeamStanding> {
    teams
        .iter()
        .map(|t| {
            let b = balance(t.name, t.wallet, roster);
            TeamStanding {
                name: t.name,
                wallet: t.wallet,
                color: t.color.clone(),
                spent: b.spent,
                remaining: b.remaining,
            }
        })
        .collect()
}
