//! Configuration for spyglass debugging sessions.
//!
//! Configuration lives in a TOML file (`spyglass.toml` by default). Every
//! field has a default, so an empty file (or no file at all) is valid.

mod logging;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use logging::{init_tracing, LoggingConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpyglassConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub breakpoints: BreakpointsConfig,
    #[serde(default)]
    pub source_maps: SourceMapsConfig,
    #[serde(default)]
    pub formatting: FormattingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakpointsConfig {
    /// JSON file that persists breakpoints between sessions.
    ///
    /// When unset, breakpoints only live for the lifetime of the process.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// Capacity of the breakpoint notification channel. Subscribers that fall
    /// further behind than this miss notifications.
    #[serde(default = "BreakpointsConfig::default_event_capacity")]
    pub event_capacity: usize,
}

impl BreakpointsConfig {
    fn default_event_capacity() -> usize {
        256
    }
}

impl Default for BreakpointsConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            event_capacity: Self::default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceMapsConfig {
    /// Load source maps announced by parsed scripts.
    #[serde(default = "SourceMapsConfig::default_enabled")]
    pub enabled: bool,

    /// Base URL for scripts whose own URL is relative.
    #[serde(default)]
    pub inspected_url: Option<Url>,
}

impl SourceMapsConfig {
    fn default_enabled() -> bool {
        true
    }
}

impl Default for SourceMapsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            inspected_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormattingConfig {
    /// Show sources pretty-printed when a formatter is available.
    #[serde(default)]
    pub format_source: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a snippet of the input; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl SpyglassConfig {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: SpyglassConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::load_from_str(&text)?;

        // Relative storage paths are relative to the config file.
        if let (Some(storage), Some(dir)) = (config.breakpoints.storage_path.as_mut(), path.parent())
        {
            if storage.is_relative() {
                *storage = dir.join(&*storage);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.breakpoints.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "breakpoints.event_capacity must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

pub const SPYGLASS_CONFIG_ENV_VAR: &str = "SPYGLASS_CONFIG_PATH";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that set [`SPYGLASS_CONFIG_ENV_VAR`] must wrap the mutation and the
/// discovery call in this so parallel tests do not observe each other's
/// overrides.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the configuration file for a workspace root.
///
/// Search order:
/// 1) `SPYGLASS_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `spyglass.toml` in `workspace_root`
/// 3) `.spyglass.toml` in `workspace_root`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(SPYGLASS_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path);
    }

    ["spyglass.toml", ".spyglass.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
}

/// Load the configuration for a workspace root.
///
/// Returns the default configuration and `None` when no file is found.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(SpyglassConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((SpyglassConfig::default(), None));
    };

    tracing::debug!(target: "spyglass.config", path = %path.display(), "loading config");
    let config = SpyglassConfig::load_from_path(&path)?;
    Ok((config, Some(path)))
}
