//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration. CLI flags override the environment.

use holdem_engine::{Chips, RoomConfig, bot::BotDifficulty, db::DatabaseConfig};
use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

/// Where player balances live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Process-local balances; every new player is credited a starting balance.
    Memory,
    Postgres,
}

impl FromStr for LedgerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(LedgerBackend::Memory),
            "postgres" | "postgresql" => Ok(LedgerBackend::Postgres),
            other => Err(format!("unknown ledger backend '{other}'")),
        }
    }
}

impl fmt::Display for LedgerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerBackend::Memory => write!(f, "memory"),
            LedgerBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub metrics_bind: Option<SocketAddr>,
    pub ledger: Option<LedgerBackend>,
    pub rooms: Option<usize>,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP and WebSocket bind address
    pub bind: SocketAddr,
    /// Prometheus listener; metrics are off when unset
    pub metrics_bind: Option<SocketAddr>,
    pub ledger: LedgerBackend,
    /// Required for the Postgres backend
    pub database: Option<DatabaseConfig>,
    /// Starting balance for new players on the memory backend
    pub starting_balance: Chips,
    /// Template for rooms created on startup or on demand
    pub room_defaults: RoomConfig,
    /// Rooms created on startup
    pub initial_rooms: usize,
    /// Empty rooms are closed after this long
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(overrides, |key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup
    ///
    /// # Errors
    ///
    /// Returns error if a variable fails to parse or a required one is missing
    pub fn from_lookup(
        overrides: CliOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let bind = match overrides.bind {
            Some(bind) => bind,
            None => env.parse_or("SERVER_BIND", SocketAddr::from(([127, 0, 0, 1], 6969)))?,
        };
        let metrics_bind = match overrides.metrics_bind {
            Some(addr) => Some(addr),
            None => env.parse_opt("METRICS_BIND")?,
        };
        let ledger = match overrides.ledger {
            Some(ledger) => ledger,
            None => env.parse_or("LEDGER_BACKEND", LedgerBackend::Memory)?,
        };

        let database = match ledger {
            LedgerBackend::Postgres => {
                let database_url =
                    env.get("DATABASE_URL")
                        .ok_or_else(|| ConfigError::MissingRequired {
                            var: "DATABASE_URL".to_string(),
                            hint: "Set it or run with --ledger memory".to_string(),
                        })?;
                let defaults = DatabaseConfig::development();
                Some(DatabaseConfig {
                    database_url,
                    max_connections: env.parse_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
                    min_connections: env.parse_or("DB_MIN_CONNECTIONS", defaults.min_connections)?,
                    connection_timeout_secs: env
                        .parse_or("DB_CONNECTION_TIMEOUT", defaults.connection_timeout_secs)?,
                    idle_timeout_secs: env.parse_or("DB_IDLE_TIMEOUT", defaults.idle_timeout_secs)?,
                    max_lifetime_secs: env.parse_or("DB_MAX_LIFETIME", defaults.max_lifetime_secs)?,
                })
            }
            LedgerBackend::Memory => None,
        };

        let bot_difficulty = match env.get("ROOM_BOT_DIFFICULTY") {
            Some(raw) => match raw.to_lowercase().as_str() {
                "easy" => BotDifficulty::Easy,
                "standard" => BotDifficulty::Standard,
                "tag" => BotDifficulty::Tag,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "ROOM_BOT_DIFFICULTY".to_string(),
                        reason: format!("expected easy, standard or tag, got '{raw}'"),
                    });
                }
            },
            None => BotDifficulty::default(),
        };

        let base = RoomConfig::default();
        let room_defaults = RoomConfig {
            name: env.get("ROOM_NAME").unwrap_or(base.name),
            max_seats: env.parse_or("ROOM_MAX_SEATS", base.max_seats)?,
            small_blind: env.parse_or("ROOM_SMALL_BLIND", base.small_blind)?,
            big_blind: env.parse_or("ROOM_BIG_BLIND", base.big_blind)?,
            rake_bps: env.parse_or("ROOM_RAKE_BPS", base.rake_bps)?,
            rake_cap: match env.parse_opt::<Chips>("ROOM_RAKE_CAP")? {
                Some(0) => None,
                Some(cap) => Some(cap),
                None => base.rake_cap,
            },
            min_buy_in_bb: env.parse_or("ROOM_MIN_BUY_IN_BB", base.min_buy_in_bb)?,
            max_buy_in_bb: env.parse_or("ROOM_MAX_BUY_IN_BB", base.max_buy_in_bb)?,
            exit_fee: env.parse_or("ROOM_EXIT_FEE", base.exit_fee)?,
            action_timeout_ms: env.parse_or("ROOM_ACTION_TIMEOUT_MS", base.action_timeout_ms)?,
            bot_think_min_ms: env.parse_or("ROOM_BOT_THINK_MIN_MS", base.bot_think_min_ms)?,
            bot_think_max_ms: env.parse_or("ROOM_BOT_THINK_MAX_MS", base.bot_think_max_ms)?,
            rebuy_window_ms: env.parse_or("ROOM_REBUY_WINDOW_MS", base.rebuy_window_ms)?,
            showdown_delay_ms: env.parse_or("ROOM_SHOWDOWN_DELAY_MS", base.showdown_delay_ms)?,
            top_up_cooldown_ms: env.parse_or("ROOM_TOP_UP_COOLDOWN_MS", base.top_up_cooldown_ms)?,
            bots_enabled: env.parse_or("ROOM_BOTS_ENABLED", base.bots_enabled)?,
            target_seat_count: env.parse_or("ROOM_TARGET_SEATS", base.target_seat_count)?,
            bot_difficulty,
        };

        Ok(ServerConfig {
            bind,
            metrics_bind,
            ledger,
            database,
            starting_balance: env.parse_or("STARTING_BALANCE", 10_000)?,
            room_defaults,
            initial_rooms: match overrides.rooms {
                Some(rooms) => rooms,
                None => env.parse_or("INITIAL_ROOMS", 1)?,
            },
            idle_ttl: Duration::from_secs(env.parse_or("ROOM_IDLE_TTL_SECS", 300)?),
            sweep_interval: Duration::from_secs(env.parse_or("ROOM_SWEEP_INTERVAL_SECS", 30)?),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.room_defaults
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "ROOM_*".to_string(),
                reason,
            })?;

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "ROOM_SWEEP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.ledger == LedgerBackend::Memory && self.starting_balance == 0 {
            return Err(ConfigError::Invalid {
                var: "STARTING_BALANCE".to_string(),
                reason: "Must be greater than 0 for the memory ledger".to_string(),
            });
        }

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: "Must differ from the server bind address".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn parse_opt<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                    var: key.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }
}
