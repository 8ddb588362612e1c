//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::combat::AttackStats;
use crate::game::snapshot::SnapshotMode;
use crate::game::MAX_PLAYERS;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated or `*`
    pub client_origin: String,
    /// Max input messages per second per connection
    pub input_rate_limit: u32,
    /// Settings handed to every hosted round
    pub game: GameConfig,
}

/// Round and sync settings, passed explicitly to the simulator and host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameConfig {
    pub cols: i32,
    pub rows: i32,
    /// Starting value of the round timer, in ticks
    pub round_ticks: u32,
    pub tick_interval_ms: u64,
    /// Ticks without a powerup before a new one appears
    pub powerup_spawn_ticks: u32,
    pub attack: AttackStats,
    /// Seats that must be filled before the round starts
    pub min_players: usize,
    pub snapshot_mode: SnapshotMode,
    /// How long a peer may take to get its assignment
    pub join_timeout_secs: u64,
    /// Lobby countdown once enough players are seated, 0 starts at once
    pub countdown_secs: u64,
    /// Fixed RNG seed; random per round when unset
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            cols: 34,
            rows: 17,
            round_ticks: 999,
            tick_interval_ms: 120,
            powerup_spawn_ticks: 75,
            attack: AttackStats::default(),
            min_players: 1,
            snapshot_mode: SnapshotMode::EveryTick,
            join_timeout_secs: 15,
            countdown_secs: 5,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Load game settings from environment variables, defaults for unset keys
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            cols: parse_or("GRID_COLS", defaults.cols)?,
            rows: parse_or("GRID_ROWS", defaults.rows)?,
            round_ticks: parse_or("ROUND_TICKS", defaults.round_ticks)?,
            tick_interval_ms: parse_or("TICK_INTERVAL_MS", defaults.tick_interval_ms)?,
            powerup_spawn_ticks: parse_or("POWERUP_SPAWN_TICKS", defaults.powerup_spawn_ticks)?,
            attack: AttackStats {
                duration_ticks: parse_or("ATTACK_DURATION_TICKS", defaults.attack.duration_ticks)?,
                range: parse_or("ATTACK_RANGE", defaults.attack.range)?,
            },
            min_players: parse_or("MIN_PLAYERS", defaults.min_players)?,
            snapshot_mode: parse_or("SNAPSHOT_MODE", defaults.snapshot_mode)?,
            join_timeout_secs: parse_or("JOIN_TIMEOUT_SECS", defaults.join_timeout_secs)?,
            countdown_secs: parse_or("COUNTDOWN_SECS", defaults.countdown_secs)?,
            seed: match env::var("ROUND_SEED") {
                Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid("ROUND_SEED", raw))?),
                Err(_) => None,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols < 4 || self.rows < 4 {
            return Err(ConfigError::GridTooSmall {
                cols: self.cols,
                rows: self.rows,
            });
        }
        if self.round_ticks == 0 {
            return Err(ConfigError::OutOfRange("ROUND_TICKS"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::OutOfRange("TICK_INTERVAL_MS"));
        }
        if self.min_players == 0 || self.min_players > MAX_PLAYERS {
            return Err(ConfigError::OutOfRange("MIN_PLAYERS"));
        }
        if self.join_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange("JOIN_TIMEOUT_SECS"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    /// Countdown length in whole ticks, rounded up
    pub fn countdown_ticks(&self) -> u32 {
        let millis = self.countdown_secs.saturating_mul(1000);
        let ticks = millis.div_ceil(self.tick_interval_ms.max(1));
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render-style PORT wins over SERVER_ADDR
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", 30)?,
            game: GameConfig::from_env()?,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),

    #[error("{0} is out of range")]
    OutOfRange(&'static str),

    #[error("Grid {cols}x{rows} is too small, need at least 4x4")]
    GridTooSmall { cols: i32, rows: i32 },

    #[error("Invalid server address format")]
    InvalidAddress,
}
