// Player identity and sale state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four fixed auction teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamName {
    Barbarians,
    Giants,
    Pekkas,
    Wizards,
}

/// All team variants, in display order.
pub const ALL_TEAMS: [TeamName; 4] = [
    TeamName::Barbarians,
    TeamName::Giants,
    TeamName::Pekkas,
    TeamName::Wizards,
];

impl TeamName {
    /// Parse a team name string. Case-insensitive; unknown names return None.
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "barbarians" => Some(TeamName::Barbarians),
            "giants" => Some(TeamName::Giants),
            "pekkas" => Some(TeamName::Pekkas),
            "wizards" => Some(TeamName::Wizards),
            _ => None,
        }
    }

    /// Return the canonical display string for this team.
    pub fn display_str(&self) -> &'static str {
        match self {
            TeamName::Barbarians => "Barbarians",
            TeamName::Giants => "Giants",
            TeamName::Pekkas => "Pekkas",
            TeamName::Wizards => "Wizards",
        }
    }
}

impl fmt::Display for TeamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// Clan positions a player can hold. Identity data, immutable after seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "co-leader")]
    CoLeader,
    #[serde(rename = "elder")]
    Elder,
    #[serde(rename = "member")]
    Member,
}

impl Position {
    /// Parse a position string. Case-insensitive; unknown strings return None.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "co-leader" | "coleader" => Some(Position::CoLeader),
            "elder" => Some(Position::Elder),
            "member" => Some(Position::Member),
            _ => None,
        }
    }

    /// Return the display string for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::CoLeader => "co-leader",
            Position::Elder => "elder",
            Position::Member => "member",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// A player record: immutable identity merged with current sale state.
///
/// At rest a player is either fully unsold (`sold == false`, `team == None`,
/// `price == 0`) or fully sold (`sold == true`, `team` set). The sale handler
/// is the only writer of the mutable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Stable, externally assigned identifier.
    pub id: String,
    /// Display name. Set on creation, never changed.
    pub name: String,
    /// Clan position. Set on creation, never changed.
    pub position: Position,
    /// Optional profile link carried from the seed roster.
    #[serde(default)]
    pub codolio_link: Option<String>,
    /// Whether the player has been sold.
    pub sold: bool,
    /// Owning team, if sold.
    pub team: Option<TeamName>,
    /// Sale price in credits. Zero while unsold.
    pub price: u32,
    /// Millisecond timestamp assigned by the sale handler on each accepted
    /// transaction. Strictly advances per player; used only for "most recent"
    /// ordering on clients, never for conflict resolution.
    pub modified_time: Option<i64>,
}

impl Player {
    /// Build an unsold player from identity fields.
    pub fn unsold(id: impl Into<String>, name: impl Into<String>, position: Position) -> Self {
        Player {
            id: id.into(),
            name: name.into(),
            position,
            codolio_link: None,
            sold: false,
            team: None,
            price: 0,
            modified_time: None,
        }
    }
}

/// A team's static seed data: starting wallet and display color.
///
/// `wallet` is configured once and never mutated; spent/remaining totals are
/// always re-derived from the roster (see the balance module).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: TeamName,
    pub wallet: u32,
    pub color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_name_parses_all_four() {
        assert_eq!(TeamName::from_str_name("Barbarians"), Some(TeamName::Barbarians));
        assert_eq!(TeamName::from_str_name("Giants"), Some(TeamName::Giants));
        assert_eq!(TeamName::from_str_name("Pekkas"), Some(TeamName::Pekkas));
        assert_eq!(TeamName::from_str_name("Wizards"), Some(TeamName::Wizards));
    }

    #[test]
    fn team_name_case_insensitive() {
        assert_eq!(TeamName::from_str_name("barbarians"), Some(TeamName::Barbarians));
        assert_eq!(TeamName::from_str_name("WIZARDS"), Some(TeamName::Wizards));
    }

    #[test]
    fn team_name_rejects_unknown() {
        assert_eq!(TeamName::from_str_name("Elves"), None);
        assert_eq!(TeamName::from_str_name(""), None);
    }

    #[test]
    fn team_name_display_roundtrip() {
        for team in ALL_TEAMS {
            assert_eq!(TeamName::from_str_name(team.display_str()), Some(team));
        }
    }

    #[test]
    fn position_parses_and_roundtrips() {
        for pos in [Position::CoLeader, Position::Elder, Position::Member] {
            assert_eq!(Position::from_str_pos(pos.display_str()), Some(pos));
        }
        assert_eq!(Position::from_str_pos("Co-Leader"), Some(Position::CoLeader));
        assert_eq!(Position::from_str_pos("captain"), None);
    }

    #[test]
    fn position_serde_uses_hyphenated_names() {
        let json = serde_json::to_string(&Position::CoLeader).unwrap();
        assert_eq!(json, "\"co-leader\"");
        let parsed: Position = serde_json::from_str("\"member\"").unwrap();
        assert_eq!(parsed, Position::Member);
    }

    #[test]
    fn unsold_player_has_clean_sale_state() {
        let p = Player::unsold("42", "Hog Rider", Position::Member);
        assert!(!p.sold);
        assert_eq!(p.team, None);
        assert_eq!(p.price, 0);
        assert_eq!(p.modified_time, None);
    }
}
