//! Configuration: command line and environment, backed by an optional TOML
//! file. Command-line values win over the file; built-in defaults fill the
//! rest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::orchestrator::OrchestratorConfig;

const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Parser)]
#[command(name = "foundry-bot", about = "Spawns a fresh voice channel for everyone who joins a factory")]
pub struct Args {
    /// TOML config file
    #[arg(long, env = "FOUNDRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bot token for the REST API
    #[arg(long, env = "FOUNDRY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// REST API base URL
    #[arg(long, env = "FOUNDRY_API_BASE")]
    pub api_base: Option<String>,

    /// Line-delimited JSON event file (stdin if omitted)
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Run against the in-process simulated platform instead of the REST API
    #[arg(long)]
    pub simulate: bool,

    /// Latency of every simulated remote call, in milliseconds
    #[arg(long)]
    pub sim_latency_ms: Option<u64>,

    /// Upper bound on a single remote call, in milliseconds
    #[arg(long, env = "FOUNDRY_REMOTE_TIMEOUT_MS")]
    pub remote_timeout_ms: Option<u64>,

    /// Name children after the factory's registered name without asking the
    /// platform for its current name first
    #[arg(long)]
    pub no_refresh_names: bool,
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub token: Option<String>,
    pub api_base: Option<String>,
    pub events: Option<PathBuf>,
    pub simulate: Option<bool>,
    pub sim_latency_ms: Option<u64>,
    pub remote_timeout_ms: Option<u64>,
    pub refresh_names: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },
    #[error("invalid config {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("no bot token: pass --token, set FOUNDRY_TOKEN, or use --simulate")]
    MissingToken,
    #[error("remote timeout must be greater than zero")]
    ZeroTimeout,
}

/// Which platform backend to drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Rest { token: String, api_base: Option<String> },
    Simulated { latency: Duration },
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub events: Option<PathBuf>,
    pub orchestrator: OrchestratorConfig,
}

impl Settings {
    /// Resolve `args`, reading the config file it names.
    pub fn resolve(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let remote_timeout_ms = args
            .remote_timeout_ms
            .or(file.remote_timeout_ms)
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS);
        if remote_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let simulate = args.simulate || file.simulate.unwrap_or(false);
        let backend = if simulate {
            Backend::Simulated {
                latency: Duration::from_millis(args.sim_latency_ms.or(file.sim_latency_ms).unwrap_or(0)),
            }
        } else {
            Backend::Rest {
                token: args.token.or(file.token).ok_or(ConfigError::MissingToken)?,
                api_base: args.api_base.or(file.api_base),
            }
        };

        Ok(Self {
            backend,
            events: args.events.or(file.events),
            orchestrator: OrchestratorConfig {
                remote_timeout: Duration::from_millis(remote_timeout_ms),
                refresh_names: !args.no_refresh_names && file.refresh_names.unwrap_or(true),
            },
        })
    }
}
