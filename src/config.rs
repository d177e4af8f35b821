// Configuration loading and parsing (config/auction.toml).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::auction::player::{Team, TeamName, ALL_TEAMS};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// auction.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire auction.toml file.
#[derive(Debug, Clone, Deserialize)]
struct AuctionFile {
    server: ServerSection,
    data: DataSection,
    teams: Vec<TeamSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    port: u16,
    db_path: String,
    admin_key: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DataSection {
    roster_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TeamSection {
    name: String,
    wallet: u32,
    color: String,
}

/// The assembled, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds on.
    pub port: u16,
    /// SQLite database path.
    pub db_path: String,
    /// Shared secret expected in the `x-admin-key` header on mutating
    /// endpoints.
    pub admin_key: String,
    /// Path to the static roster seed CSV.
    pub roster_path: String,
    /// The four team seeds (name, starting wallet, display color).
    pub teams: Vec<Team>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/auction.toml` relative to
/// the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("."))
}

/// Load and validate configuration from `config/auction.toml` relative to
/// `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("auction.toml");
    if !path.exists() {
        return Err(ConfigError::FileNotFound { path });
    }
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
        path: path.clone(),
        source,
    })?;
    let file: AuctionFile =
        toml::from_str(&text).map_err(|source| ConfigError::ParseError { path, source })?;
    assemble(file)
}

/// Parse config from a TOML string. Used by tests and embedded defaults.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let file: AuctionFile = toml::from_str(text).map_err(|source| ConfigError::ParseError {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    assemble(file)
}

fn assemble(file: AuctionFile) -> Result<Config, ConfigError> {
    if file.server.admin_key.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "server.admin_key".to_string(),
            message: "admin key must not be empty".to_string(),
        });
    }
    if file.data.roster_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "data.roster_path".to_string(),
            message: "roster path must not be empty".to_string(),
        });
    }

    let mut teams = Vec::with_capacity(file.teams.len());
    for section in &file.teams {
        let name = TeamName::from_str_name(&section.name).ok_or_else(|| {
            ConfigError::ValidationError {
                field: "teams.name".to_string(),
                message: format!("unknown team name: {}", section.name),
            }
        })?;
        if teams.iter().any(|t: &Team| t.name == name) {
            return Err(ConfigError::ValidationError {
                field: "teams".to_string(),
                message: format!("team {name} is defined more than once"),
            });
        }
        teams.push(Team {
            name,
            wallet: section.wallet,
            color: section.color.clone(),
        });
    }
    for required in ALL_TEAMS {
        if !teams.iter().any(|t| t.name == required) {
            return Err(ConfigError::ValidationError {
                field: "teams".to_string(),
                message: format!("team {required} is missing from the config"),
            });
        }
    }

    Ok(Config {
        port: file.server.port,
        db_path: file.server.db_path,
        admin_key: file.server.admin_key,
        roster_path: file.data.roster_path,
        teams,
    })
}
