//! Engine configuration via `chronicle.toml`
//!
//! A config file in the save root replaces a builder pattern. On first
//! open, a commented default `chronicle.toml` is created; to change
//! settings, edit the file and restart.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Config file name placed in the save root directory
pub const CONFIG_FILE_NAME: &str = "chronicle.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or created
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Auto-save triggers, each individually switchable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoSaveConfig {
    /// Master switch for all auto-save triggers
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between time-based auto-saves, in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Auto-save when a season changes
    #[serde(default = "default_true")]
    pub on_season_change: bool,
    /// Auto-save when a new biome is discovered
    #[serde(default = "default_true")]
    pub on_biome_discovery: bool,
    /// Auto-save when a quest completes
    #[serde(default = "default_true")]
    pub on_quest_completed: bool,
    /// Auto-save when the weather changes
    #[serde(default)]
    pub on_weather_change: bool,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        AutoSaveConfig {
            enabled: true,
            interval_secs: default_interval_secs(),
            on_season_change: true,
            on_biome_discovery: true,
            on_quest_completed: true,
            on_weather_change: false,
        }
    }
}

/// Engine configuration loaded from `chronicle.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveConfig {
    /// Compress save files with zstd
    #[serde(default)]
    pub compression: bool,
    /// zstd compression level
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// Omit unit blocks whose serialized form is unchanged since the
    /// previous save of the same slot
    #[serde(default)]
    pub delta_save: bool,
    /// Back up the previous save file before each save
    #[serde(default = "default_true")]
    pub backup_on_save: bool,
    /// How many backups to retain per slot
    #[serde(default = "default_backup_retain")]
    pub backup_retain: usize,
    /// Minimum free bytes required on the target volume before a save is
    /// attempted
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
    /// How long a load waits for a transiently locked save file, in
    /// milliseconds
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// Auto-save triggers
    #[serde(default)]
    pub auto_save: AutoSaveConfig,
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    300
}

fn default_compression_level() -> i32 {
    3
}

fn default_backup_retain() -> usize {
    4
}

fn default_min_free_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_lock_wait_ms() -> u64 {
    2000
}

impl Default for SaveConfig {
    fn default() -> Self {
        SaveConfig {
            compression: false,
            compression_level: default_compression_level(),
            delta_save: false,
            backup_on_save: true,
            backup_retain: default_backup_retain(),
            min_free_bytes: default_min_free_bytes(),
            lock_wait_ms: default_lock_wait_ms(),
            auto_save: AutoSaveConfig::default(),
        }
    }
}

impl SaveConfig {
    /// Load `chronicle.toml` from `root`, creating a commented default on
    /// first open
    pub fn load_or_init(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            std::fs::create_dir_all(root)?;
            std::fs::write(&path, Self::default_toml())?;
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# Chronicle save engine configuration
#
# compression: wrap save files in zstd. Readers auto-detect, so existing
# plain saves keep loading after a change.
compression = false
compression_level = 3

# delta_save: omit unit blocks unchanged since the previous save of the
# same slot. An omitted block means "unchanged" on load.
delta_save = false

# Back up the previous save file before each save, keeping backup_retain
# timestamped copies per slot.
backup_on_save = true
backup_retain = 4

[auto_save]
enabled = true
interval_secs = 300
on_season_change = true
on_biome_discovery = true
on_quest_completed = true
on_weather_change = false
"#
    }
}
