//! Configuration types and hierarchical loading.
//!
//! Values are merged in hierarchy order: built-in defaults, then the system
//! configuration file (`/etc/rondo/rondo.json` unless overridden), then
//! `RONDO_*` environment variables. CLI flags are applied last by the
//! front-end.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Default system configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rondo/rondo.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// The configuration file did not parse.
    #[error("invalid config at {path}: {message}")]
    Invalid {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// An environment or CLI value was not understood.
    #[error("invalid value '{value}' for {key}")]
    BadValue {
        /// Configuration key.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Solver backend selection. Selection happens by configuration value, not
/// by subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverType {
    /// Deterministic single-threaded backtracking.
    #[default]
    #[serde(rename = "simple")]
    SingleCoreSimple,
    /// The same search split over a bounded worker pool, first result wins.
    #[serde(rename = "parallel")]
    ParallelSimple,
    /// Heuristic episode-based search with a fixed attempts budget.
    #[serde(rename = "qlearning")]
    QLearning,
}

impl FromStr for SolverType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "simple" => Ok(Self::SingleCoreSimple),
            "parallel" => Ok(Self::ParallelSimple),
            "qlearning" => Ok(Self::QLearning),
            _ => Err(ConfigError::BadValue {
                key: "solver.type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SingleCoreSimple => "simple",
            Self::ParallelSimple => "parallel",
            Self::QLearning => "qlearning",
        };
        write!(f, "{s}")
    }
}

/// System paths: database location and target root filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Directory holding the system package database.
    pub db_path: PathBuf,
    /// Target root filesystem mutated by transactions. Staging happens
    /// inside it so commits are same-filesystem renames.
    pub rootfs: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/rondo/db"),
            rootfs: PathBuf::from("/"),
        }
    }
}

/// Solver tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Backend selection.
    #[serde(rename = "type")]
    pub solver_type: SolverType,
    /// QLearning learning rate.
    pub learning_rate: f32,
    /// QLearning discount factor.
    pub discount: f32,
    /// QLearning attempts budget; termination is attempts-based only.
    pub max_attempts: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver_type: SolverType::SingleCoreSimple,
            learning_rate: 0.7,
            discount: 1.0,
            max_attempts: 9000,
        }
    }
}

/// General executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Download and verification workers.
    pub concurrency: usize,
    /// Per-artifact download timeout in seconds.
    pub download_timeout_secs: u64,
    /// Per-artifact retry bound.
    pub retries: u32,
    /// Require detached signatures on artifacts.
    pub check_signatures: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            download_timeout_secs: 300,
            retries: 3,
            check_signatures: false,
        }
    }
}

/// One configured package repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository name.
    pub name: String,
    /// Repository location: `dir:///path` or `http(s)://host/path`.
    pub url: String,
    /// Lower values are consulted first.
    #[serde(default)]
    pub priority: u32,
    /// Disabled repositories are skipped entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base64 ed25519 verifying key for artifact signatures.
    #[serde(default)]
    pub verify_key: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Complete Rondo configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// System paths.
    pub system: SystemConfig,
    /// Solver tuning.
    pub solver: SolverConfig,
    /// General executor settings.
    pub general: GeneralConfig,
    /// Path prefixes whose files are never overwritten in place.
    pub config_protect: Vec<PathBuf>,
    /// Configured repositories.
    pub repositories: Vec<RepositoryConfig>,
}

impl Config {
    /// Load configuration: defaults, then the file at `path` (or the default
    /// location) if it exists, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let config = serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            debug!(path = %path.display(), "loaded configuration file");
            config
        } else {
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `RONDO_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_var("RONDO_SYSTEM_DBPATH") {
            self.system.db_path = PathBuf::from(v);
        }
        if let Some(v) = env_var("RONDO_SYSTEM_TARGET") {
            self.system.rootfs = PathBuf::from(v);
        }
        if let Some(v) = env_var("RONDO_SOLVER_TYPE") {
            self.solver.solver_type = v.parse()?;
        }
        if let Some(v) = env_var("RONDO_SOLVER_ATTEMPTS") {
            self.solver.max_attempts = parse_value("RONDO_SOLVER_ATTEMPTS", &v)?;
        }
        if let Some(v) = env_var("RONDO_CONCURRENCY") {
            self.general.concurrency = parse_value("RONDO_CONCURRENCY", &v)?;
        }
        if let Some(v) = env_var("RONDO_RETRIES") {
            self.general.retries = parse_value("RONDO_RETRIES", &v)?;
        }
        Ok(())
    }

    /// Enabled repositories, priority order.
    #[must_use]
    pub fn active_repositories(&self) -> Vec<&RepositoryConfig> {
        let mut repos: Vec<_> = self.repositories.iter().filter(|r| r.enabled).collect();
        repos.sort_by_key(|r| (r.priority, r.name.clone()));
        repos
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.solver.solver_type, SolverType::SingleCoreSimple);
        assert!((config.solver.learning_rate - 0.7).abs() < f32::EPSILON);
        assert!((config.solver.discount - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.solver.max_attempts, 9000);
        assert_eq!(config.general.retries, 3);
        assert!(config.general.concurrency >= 1);
    }

    #[test]
    fn solver_type_parsing() {
        assert_eq!(
            "simple".parse::<SolverType>().unwrap(),
            SolverType::SingleCoreSimple
        );
        assert_eq!(
            "parallel".parse::<SolverType>().unwrap(),
            SolverType::ParallelSimple
        );
        assert_eq!(
            "qlearning".parse::<SolverType>().unwrap(),
            SolverType::QLearning
        );
        assert!("dpll".parse::<SolverType>().is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rondo.json");
        std::fs::write(
            &path,
            r#"{
                "system": { "db_path": "/tmp/db", "rootfs": "/tmp/root" },
                "solver": { "type": "qlearning", "max_attempts": 100 },
                "config_protect": ["/etc"],
                "repositories": [
                    { "name": "main", "url": "dir:///srv/repo", "priority": 1 }
                ]
            }"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.system.db_path, PathBuf::from("/tmp/db"));
        assert_eq!(config.solver.solver_type, SolverType::QLearning);
        assert_eq!(config.solver.max_attempts, 100);
        assert_eq!(config.config_protect, vec![PathBuf::from("/etc")]);
        assert_eq!(config.active_repositories().len(), 1);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/rondo.json"))).unwrap();
        assert_eq!(config.system.rootfs, PathBuf::from("/"));
    }

    #[test]
    fn disabled_repositories_are_skipped() {
        let config = Config {
            repositories: vec![
                RepositoryConfig {
                    name: "off".to_string(),
                    url: "dir:///a".to_string(),
                    priority: 0,
                    enabled: false,
                    verify_key: None,
                },
                RepositoryConfig {
                    name: "on".to_string(),
                    url: "dir:///b".to_string(),
                    priority: 1,
                    enabled: true,
                    verify_key: None,
                },
            ],
            ..Config::default()
        };
        let active = config.active_repositories();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "on");
    }
}
