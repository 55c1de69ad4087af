//! Runtime configuration resolved from the process environment.
//!
//! # Invariants
//! - Blank environment values behave exactly like unset ones.
//! - Logging stays disabled unless a log directory is configured.

use crate::logging::LogLevel;
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "ROSTER_DB_PATH";
pub const LOG_LEVEL_ENV: &str = "ROSTER_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "ROSTER_LOG_DIR";

const DEFAULT_DB_FILE_NAME: &str = "roster.sqlite3";

/// Settings needed to open the roster and start logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterConfig {
    pub db_path: PathBuf,
    pub log_level: LogLevel,
    pub log_dir: Option<PathBuf>,
}

impl RosterConfig {
    /// Reads `ROSTER_DB_PATH`, `ROSTER_LOG_LEVEL` and `ROSTER_LOG_DIR`.
    ///
    /// An unparseable level falls back to the build default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|trimmed| !trimmed.is_empty())
        };

        let db_path = value(DB_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DB_FILE_NAME));
        let log_level = value(LOG_LEVEL_ENV)
            .and_then(|raw| LogLevel::parse(&raw).ok())
            .unwrap_or_else(LogLevel::build_default);
        let log_dir = value(LOG_DIR_ENV).map(PathBuf::from);

        Self {
            db_path,
            log_level,
            log_dir,
        }
    }
}
