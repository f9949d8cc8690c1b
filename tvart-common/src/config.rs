//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Every key is optional;
//! missing keys fall back to compiled defaults, and a missing file is not an
//! error (a warning is logged and defaults are used).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TVART_ROOT_FOLDER";

/// Environment variable holding the color oracle API key
pub const ORACLE_KEY_ENV: &str = "TVART_OPENAI_API_KEY";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Base directory holding raw/ready/label/cache folders
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub display: DisplayConfig,
    pub label: LabelConfig,
    pub deep_zoom: DeepZoomConfig,
    pub museum: MuseumConfig,
    pub sync: SyncConfig,
    pub oracle: OracleConfig,
    pub device: DeviceConfig,
    /// Period of the persistent loop (`--stay`)
    pub loop_interval_secs: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Target display geometry and content category
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Remote content category holding this application's uploads
    pub category: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 3840,
            height: 2160,
            category: "MY-C0002".to_string(),
        }
    }
}

/// Label raster dimensions
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            width: 1448,
            height: 1072,
        }
    }
}

/// Deep-zoom tile fetcher invocation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeepZoomConfig {
    /// Executable name or path
    pub command: String,
    /// Maximum tiles fetched concurrently by the tool
    pub parallelism: u32,
    /// Minimum interval between two tile requests
    pub min_interval_ms: u64,
    /// Largest width/height the tool assembles
    pub max_dimension: u32,
}

impl Default for DeepZoomConfig {
    fn default() -> Self {
        Self {
            command: "dezoomify-rs".to_string(),
            parallelism: 16,
            min_interval_ms: 100,
            max_dimension: 8192,
        }
    }
}

/// Museum API access
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MuseumConfig {
    /// Minimum interval between two museum API calls, process wide
    pub min_interval_ms: u64,
}

impl Default for MuseumConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
        }
    }
}

/// Device synchronization tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Perceptual match threshold: mean absolute channel difference in [0, 1]
    pub match_threshold: f32,
    /// Upload attempts on transient transport errors
    pub upload_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.06,
            upload_attempts: 3,
        }
    }
}

/// External color suggestion service
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OracleConfig {
    /// API key; the oracle is disabled without one
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o".to_string(),
        }
    }
}

/// Device transport selection
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Directory-backed art store; synchronization is skipped when unset
    pub folder: Option<PathBuf>,
}

/// Where [`TomlConfig::load`] found its settings
///
/// Loading happens before logging is set up, so the caller reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl TomlConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the platform default
    /// location is tried and compiled defaults are used if nothing is there.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        p.display()
                    )));
                }
                p.to_path_buf()
            }
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok((Self::default(), ConfigSource::Defaults)),
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)?;
        Ok((config, ConfigSource::File(path)))
    }

    /// Oracle API key: environment wins over TOML. Blank keys count as absent.
    pub fn oracle_api_key(&self) -> Option<String> {
        std::env::var(ORACLE_KEY_ENV)
            .ok()
            .filter(|k| is_valid_key(k))
            .or_else(|| self.oracle.api_key.clone().filter(|k| is_valid_key(k)))
    }

    pub fn loop_interval_secs(&self) -> u64 {
        self.loop_interval_secs.unwrap_or(120)
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Platform default config file: `<config dir>/tvart/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tvart").join("config.toml"))
}

/// Get OS-dependent default root folder path
pub fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tvart"))
        .unwrap_or_else(|| PathBuf::from("./tvart_data"))
}

/// User agent sent with every outbound HTTP request
pub fn get_user_agent() -> String {
    format!(
        "tvart/{} (+https://github.com/tvart/tvart)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Folders under the root folder
#[derive(Debug, Clone)]
pub struct FolderLayout {
    pub root: PathBuf,
    /// Acquired source images
    pub raw: PathBuf,
    /// Display-ready composites
    pub ready: PathBuf,
    /// Deep-zoom tile cache shared across runs
    pub tile_cache: PathBuf,
    /// Last thumbnails fetched from the device
    pub thumbs: PathBuf,
    pub label: PathBuf,
    pub temp: PathBuf,
}

impl FolderLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            raw: root.join("raw"),
            ready: root.join("ready"),
            tile_cache: root.join("tile-cache"),
            thumbs: root.join("tv-thumbs"),
            label: root.join("label"),
            temp: root.join("temp"),
            root,
        }
    }

    /// Verify the root exists and create any missing sub-folder.
    ///
    /// A missing root is a configuration error: it usually means a wrong
    /// path or an unmounted volume, and creating it would hide that.
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(Error::Config(format!(
                "Root folder {} does not exist",
                self.root.display()
            )));
        }

        for folder in [
            &self.raw,
            &self.ready,
            &self.tile_cache,
            &self.thumbs,
            &self.label,
            &self.temp,
        ] {
            if !folder.exists() {
                info!("Creating folder {}", folder.display());
                std::fs::create_dir_all(folder)?;
            }
        }
        Ok(())
    }
}
