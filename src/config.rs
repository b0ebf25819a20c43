use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregation::{AggregateOptions, ConflictStrategy};
use crate::orchestration::{
    PoolConfig, DEFAULT_MAX_WORKERS, DEFAULT_PER_ITEM_TIMEOUT_SECS, DEFAULT_POOL_TIMEOUT_SECS,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    pub checkpoint_dir: Option<String>,
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub aggregation: AggregationSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub max_workers: usize,
    pub per_item_timeout_secs: u64,
    pub pool_timeout_secs: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            per_item_timeout_secs: DEFAULT_PER_ITEM_TIMEOUT_SECS,
            pool_timeout_secs: DEFAULT_POOL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSection {
    pub deduplicate: bool,
    pub conflict_strategy: ConflictStrategy,
}

impl Default for AggregationSection {
    fn default() -> Self {
        Self {
            deduplicate: true,
            conflict_strategy: ConflictStrategy::Report,
        }
    }
}

impl Config {
    pub fn agentflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".agentflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::agentflow_dir()?.join("agentflow.toml"))
    }

    /// Directory for `FileCheckpointStore`.
    pub fn checkpoint_dir(&self) -> Result<PathBuf> {
        match &self.checkpoint_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::agentflow_dir()?.join("checkpoints")),
        }
    }

    /// Pool limits; `max_workers` is clamped to the pool ceiling.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.pool.max_workers)
            .with_per_item_timeout(Duration::from_secs(self.pool.per_item_timeout_secs))
            .with_pool_timeout(Duration::from_secs(self.pool.pool_timeout_secs))
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions::default()
            .with_deduplicate(self.aggregation.deduplicate)
            .with_conflict_strategy(self.aggregation.conflict_strategy)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Config::load");
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        tracing::debug!(
            max_workers = config.pool.max_workers,
            conflict_strategy = ?config.aggregation.conflict_strategy,
            checkpoint_dir = ?config.checkpoint_dir,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tracing::debug!(dir = %parent.display(), "Creating config directory");
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let checkpoint_dir = self.checkpoint_dir()?;
        if !checkpoint_dir.exists() {
            tracing::debug!(dir = %checkpoint_dir.display(), "Creating checkpoint directory");
            fs::create_dir_all(&checkpoint_dir)?;
        }
        Ok(())
    }
}

/// `~` and `~/rest` resolve against the home directory; anything else is literal.
fn expand_tilde(path: &str) -> PathBuf {
    let home_relative = if path == "~" { Some("") } else { path.strip_prefix("~/") };
    match (home_relative, dirs::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
