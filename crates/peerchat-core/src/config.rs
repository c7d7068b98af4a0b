//! Client configuration

use crate::core::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CACHE_DIR_ENV: &str = "PEERCHAT_CACHE_DIR";
pub const IDEMPOTENT_SENDS_ENV: &str = "PEERCHAT_IDEMPOTENT_SENDS";
pub const PASSWORD_COST_ENV: &str = "PEERCHAT_PASSWORD_COST";

/// Range bcrypt accepts for its cost factor.
const PASSWORD_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Configuration for a peerchat client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory holding the per-user message caches
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Write messages under a client-generated key so retries never duplicate
    #[serde(default = "default_idempotent_sends")]
    pub idempotent_sends: bool,
    /// bcrypt cost used by the in-process auth service
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
}

fn default_cache_dir() -> PathBuf {
    peerchat_common::cache_dir()
}

fn default_idempotent_sends() -> bool {
    true
}

fn default_password_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            idempotent_sends: default_idempotent_sends(),
            password_cost: default_password_cost(),
        }
    }
}

impl SyncConfig {
    /// Config rooted at `base_dir` instead of the shared data root.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: base_dir.into().join("cache"),
            ..Self::default()
        }
    }

    /// Defaults overridden by the `PEERCHAT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().overridden_by(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (an environment, in practice).
    pub fn overridden_by(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(IDEMPOTENT_SENDS_ENV) {
            self.idempotent_sends = parse_bool(&raw).ok_or_else(|| {
                SyncError::Config(format!("{} must be a boolean, got {:?}", IDEMPOTENT_SENDS_ENV, raw))
            })?;
        }
        if let Some(raw) = lookup(PASSWORD_COST_ENV) {
            self.password_cost = raw.trim().parse().map_err(|_| {
                SyncError::Config(format!("{} must be a number, got {:?}", PASSWORD_COST_ENV, raw))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Load from a JSON file. A missing, empty or unparsable file gives the
    /// defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            tracing::warn!("Config file {:?} is empty, using default config", path);
            return Ok(Self::default());
        }

        let config: Self = match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to parse config {:?} ({}), using default", path, e);
                return Ok(Self::default());
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !PASSWORD_COST_RANGE.contains(&self.password_cost) {
            return Err(SyncError::Config(format!(
                "password cost {} outside {:?}",
                self.password_cost, PASSWORD_COST_RANGE
            )));
        }
        Ok(())
    }

    /// Cache directory of one signed-in user.
    pub fn user_cache_dir(&self, user_id: &str) -> PathBuf {
        peerchat_common::user_cache_dir(&self.cache_dir, user_id)
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
