use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use vigil_core::VigilError;

use crate::schema::GovernanceConfig;

/// Loads and reloads the Vigil configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<GovernanceConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > VIGIL_CONFIG env > ~/.vigil/vigil.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("VIGIL_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vigil")
            .join("vigil.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> vigil_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            GovernanceConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse a config from a TOML string (no env overrides).
    pub fn parse(raw: &str) -> vigil_core::Result<GovernanceConfig> {
        let config = toml::from_str::<GovernanceConfig>(raw)
            .map_err(|e| VigilError::Config(format!("failed to parse config: {}", e)))?;
        Self::check(&config)?;
        Ok(config)
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> GovernanceConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<GovernanceConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Reload the config from disk. The current config is kept if the new one
    /// fails to parse or validate.
    pub fn reload(&self) -> vigil_core::Result<()> {
        if !self.config_path.exists() {
            return Err(VigilError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read(&self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    fn read(path: &Path) -> vigil_core::Result<GovernanceConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<GovernanceConfig>(&raw).map_err(|e| {
            VigilError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Validate config. Logs warnings and fails on errors.
    fn check(config: &GovernanceConfig) -> vigil_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(VigilError::Config(e)),
        }
    }

    /// Apply env var overrides (VIGIL_CACHE_TTL_SECS, VIGIL_LOG_LEVEL, etc.)
    fn apply_env_overrides(mut config: GovernanceConfig) -> GovernanceConfig {
        if let Ok(v) = std::env::var("VIGIL_CACHE_TTL_SECS") {
            match v.parse::<u64>() {
                Ok(ttl) => config.cache.ttl_secs = ttl,
                Err(_) => warn!(value = %v, "ignoring invalid VIGIL_CACHE_TTL_SECS"),
            }
        }
        if let Ok(v) = std::env::var("VIGIL_CACHE_CAPACITY") {
            match v.parse::<usize>() {
                Ok(capacity) => config.cache.capacity = capacity,
                Err(_) => warn!(value = %v, "ignoring invalid VIGIL_CACHE_CAPACITY"),
            }
        }
        if let Ok(v) = std::env::var("VIGIL_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("VIGIL_LOG_FORMAT") {
            config.logging.format = v;
        }
        config
    }
}
