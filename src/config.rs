//! Configuration management for the skydimod daemon.
//!
//! Handles loading, parsing, and validation of YAML configuration files
//! that define which detectors run and how the drivers are tuned.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::RwLock;

/// Main configuration structure for the skydimod daemon.
///
/// Contains all configuration parameters including detector switches and
/// per-driver tuning. This structure is deserialized from the YAML
/// configuration file.
///
/// # Example
///
/// ```yaml
/// version: 1
///
/// detectors:
///   skydimo_hid: true
///   skydimo_serial: true
///   smbus: false
///
/// skydimo:
///   hid_max_leds: 100
///   keepalive_ms: 250
///
/// smbus:
///   shared_access: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Which detectors run during a detection pass.
    #[serde(default)]
    pub detectors: DetectorCfg,

    /// Skydimo driver tuning.
    #[serde(default)]
    pub skydimo: SkydimoCfg,

    /// SMBus bridge tuning.
    #[serde(default)]
    pub smbus: SmbusCfg,
}

/// Per-detector enable switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorCfg {
    /// Detect Skydimo HID strips.
    #[serde(default = "defaults::enabled")]
    pub skydimo_hid: bool,

    /// Detect Skydimo serial strips.
    #[serde(default = "defaults::enabled")]
    pub skydimo_serial: bool,

    /// Detect SMBus controllers through the kernel helper.
    #[serde(default = "defaults::enabled")]
    pub smbus: bool,
}

impl Default for DetectorCfg {
    fn default() -> Self {
        Self {
            skydimo_hid: defaults::enabled(),
            skydimo_serial: defaults::enabled(),
            smbus: defaults::enabled(),
        }
    }
}

/// Skydimo driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkydimoCfg {
    /// Addressable LED limit for HID strips.
    #[serde(default = "defaults::hid_max_leds")]
    pub hid_max_leds: usize,

    /// Stream mode keep-alive period in milliseconds.
    #[serde(default = "defaults::keepalive_ms")]
    pub keepalive_ms: u64,
}

impl Default for SkydimoCfg {
    fn default() -> Self {
        Self {
            hid_max_leds: defaults::hid_max_leds(),
            keepalive_ms: defaults::keepalive_ms(),
        }
    }
}

/// SMBus bridge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmbusCfg {
    /// Serialize transactions across buses sharing a helper handle.
    #[serde(default = "defaults::enabled")]
    pub shared_access: bool,
}

impl Default for SmbusCfg {
    fn default() -> Self {
        Self {
            shared_access: defaults::enabled(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            detectors: DetectorCfg::default(),
            skydimo: SkydimoCfg::default(),
            smbus: SmbusCfg::default(),
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.skydimo.hid_max_leds == 0 {
            anyhow::bail!("skydimo.hid_max_leds must be at least 1");
        }
        if self.skydimo.hid_max_leds > u16::MAX as usize {
            anyhow::bail!(
                "skydimo.hid_max_leds {} exceeds the protocol limit",
                self.skydimo.hid_max_leds
            );
        }
        if self.skydimo.keepalive_ms == 0 {
            anyhow::bail!("skydimo.keepalive_ms must be at least 1");
        }
        Ok(())
    }
}

mod defaults {
    pub fn enabled() -> bool {
        true
    }

    /// Default addressable LED limit for HID strips.
    pub fn hid_max_leds() -> usize {
        crate::drivers::skydimo::protocol::DEFAULT_MAX_LEDS
    }

    /// Default keep-alive period in milliseconds.
    pub fn keepalive_ms() -> u64 {
        crate::drivers::skydimo::serial::KEEPALIVE_INTERVAL_MS
    }
}

fn locate_config() -> Result<PathBuf> {
    // 2) ENV
    if let Ok(env_path) = env::var("SKYDIMOD_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    // 3) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("skydimod/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir.clone());
        }
    }

    // 4) /etc
    let etc = Path::new("/etc/skydimod/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Configuration manager that handles both config data and file operations.
///
/// Provides a unified interface for loading, reloading, and managing configuration
/// without exposing the underlying file path to the rest of the application.
///
/// # Example
///
/// ```no_run
/// use skydimod::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// // Load from specific path
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
///
/// // Load from standard locations
/// let config_manager = ConfigManager::load(None).await?;
///
/// // Access configuration
/// let keepalive = config_manager.get().await.skydimo.keepalive_ms;
///
/// // Reload configuration
/// config_manager.reload().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and path.
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches for configuration in the following order:
    /// 1. Provided path parameter
    /// 2. SKYDIMOD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/skydimod/config.yml or ~/.config/skydimod/config.yml
    /// 4. /etc/skydimod/config.yml
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path).await?;

        Ok(Self::new(config, config_path))
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Gets a mutable reference to the current configuration.
    pub async fn get_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, Config> {
        self.config.write().await
    }

    /// Returns the path to the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads configuration from the same file.
    ///
    /// This is useful for hot-reloading configuration changes.
    pub async fn reload(&self) -> Result<()> {
        info!("Reloading config from: {}", self.path.display());
        let new_config = Self::load_config_from_path(&self.path).await?;

        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Saves the current configuration to file.
    pub async fn save(&self) -> Result<()> {
        let config = self.config.read().await;
        self.save_to_path(&config, &self.path).await
    }

    /// Saves configuration to a specific path.
    pub async fn save_to_path(&self, config: &Config, path: &Path) -> Result<()> {
        let config_yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration")?;

        let tmp_path = path.with_extension("yml.tmp");
        fs::write(&tmp_path, config_yaml).with_context(|| {
            format!("Failed to write temporary config to {}", tmp_path.display())
        })?;

        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move config to {}", path.display()))?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validates the current configuration.
    pub async fn validate(&self) -> Result<()> {
        let config = self.config.read().await;
        config.validate()
    }

    /// Clones the current configuration.
    ///
    /// Useful when you need to work with a snapshot of the config.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Updates the configuration with a new one.
    ///
    /// This validates the new configuration before applying it.
    pub async fn update_config(&self, new_config: Config) -> Result<()> {
        new_config
            .validate()
            .context("New configuration is invalid")?;
        *self.config.write().await = new_config;
        info!("Configuration updated in memory");
        Ok(())
    }

    /// Returns an `Arc<RwLock<Config>>` for sharing between services.
    pub fn as_shared(&self) -> Arc<RwLock<Config>> {
        self.config.clone()
    }

    /// Compares the on-disk configuration against the loaded one and
    /// classifies the change.
    ///
    /// Changes to detector switches or driver tuning only take effect on the
    /// next detection pass, so they are classified as
    /// [`ConfigChangeType::Rescan`]; everything else is hot-reloadable.
    pub async fn analyze_config_changes(&self) -> Result<crate::event::ConfigChangeType> {
        let new_config = Self::load_config_from_path(&self.path).await?;
        let current = self.config.read().await;

        let mut changed_sections = Vec::new();
        if new_config.detectors != current.detectors {
            changed_sections.push("detectors".to_string());
        }
        if new_config.skydimo != current.skydimo {
            changed_sections.push("skydimo".to_string());
        }
        if new_config.smbus != current.smbus {
            changed_sections.push("smbus".to_string());
        }

        if changed_sections.is_empty() {
            Ok(crate::event::ConfigChangeType::HotReload)
        } else {
            Ok(crate::event::ConfigChangeType::Rescan { changed_sections })
        }
    }

    /// Loads configuration from a specific path (internal helper).
    async fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
