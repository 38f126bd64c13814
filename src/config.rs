//! Configuration module for saltsum.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::protocols::auth::{Credential, HashAlgorithm};
use crate::protocols::vector::ElementType;
use crate::runtime::ReadStrategy;
use crate::worker::{Side, WorkerSettings};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Command-line arguments for the worker
#[derive(Parser, Debug)]
#[command(name = "saltsum")]
#[command(author = "saltsum authors")]
#[command(version = "0.1.0")]
#[command(about = "Authenticated vector-sum worker", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:7777)
    #[arg(short = 'l', long, global = true)]
    pub listen: Option<String>,

    /// Which side of the handshake this worker plays
    #[arg(long, value_enum, global = true)]
    pub side: Option<Side>,

    /// Vector element type
    #[arg(long, value_enum, global = true)]
    pub element_type: Option<ElementType>,

    /// Hash algorithm for the challenge digest
    #[arg(long, value_enum, global = true)]
    pub hash: Option<HashAlgorithm>,

    /// Strategy for reading handshake messages
    #[arg(long, value_enum, global = true)]
    pub read_strategy: Option<ReadStrategy>,

    /// Initial message buffer size in bytes
    #[arg(short = 'b', long, global = true)]
    pub buffer_size: Option<usize>,

    /// Username expected from (or sent to) the peer
    #[arg(short = 'u', long, global = true)]
    pub username: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What the binary does once configured
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Accept connections and run a worker for each (default)
    Serve,
    /// Connect to a worker, authenticate, and submit one batch
    Send {
        /// Address of the worker to connect to
        #[arg(long)]
        connect: String,
        /// A vector as comma-separated integers; repeat for a batch
        #[arg(long = "vector", allow_hyphen_values = true)]
        vectors: Vec<VectorArg>,
    },
}

/// One vector given on the command line, e.g. `10,20,30`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorArg(pub Vec<i64>);

impl FromStr for VectorArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(VectorArg(Vec::new()));
        }
        s.split(',')
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .map_err(|e| format!("invalid element '{}': {}", part.trim(), e))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(VectorArg)
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub auth: Credential,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Per-session worker configuration
#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub side: Side,
    #[serde(default)]
    pub element_type: ElementType,
    #[serde(default)]
    pub hash: HashAlgorithm,
    #[serde(default)]
    pub read_strategy: ReadStrategy,
    /// Initial buffer size for handshake messages
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            side: Side::default(),
            element_type: ElementType::default(),
            hash: HashAlgorithm::default(),
            read_strategy: ReadStrategy::default(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7777".to_string()
}

fn default_buffer_size() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub side: Side,
    pub element_type: ElementType,
    pub hash: HashAlgorithm,
    pub read_strategy: ReadStrategy,
    pub buffer_size: usize,
    pub credential: Credential,
    pub log_level: String,
    pub command: Command,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let mut credential = toml_config.auth;
        if let Some(username) = cli.username {
            credential.username = username;
        }

        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            side: cli.side.unwrap_or(toml_config.worker.side),
            element_type: cli.element_type.unwrap_or(toml_config.worker.element_type),
            hash: cli.hash.unwrap_or(toml_config.worker.hash),
            read_strategy: cli.read_strategy.unwrap_or(toml_config.worker.read_strategy),
            buffer_size: cli.buffer_size.unwrap_or(toml_config.worker.buffer_size),
            credential,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            command: cli.command.unwrap_or(Command::Serve),
        };

        if config.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be at least 1".into()));
        }
        Ok(config)
    }

    /// Settings handed to each per-connection worker.
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            side: self.side,
            element_type: self.element_type,
            hash: self.hash,
            read_strategy: self.read_strategy,
            buffer_size: self.buffer_size,
            credential: self.credential.clone(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
