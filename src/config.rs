//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/schemawatch/schemawatch.toml`
//! 3. Explicit config file (`--config`)
//! 4. Environment variables: `SCHEMAWATCH__<SECTION>__<KEY>`

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::prompt::Decision;

/// Lineage watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatcherSettings {
    /// Guard every node of the source model, not only top-level objects
    pub watch_hierarchy: bool,
    /// Answer used when nobody can be asked
    pub default_decision: Decision,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            watch_hierarchy: true,
            default_decision: Decision::CancelAndAbort,
        }
    }
}

/// Prompt settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptSettings {
    /// Ask on the terminal; when false the default decision is always used
    pub interactive: bool,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self { interactive: true }
    }
}

/// Unified configuration for schemawatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub watcher: WatcherSettings,
    pub prompt: PromptSettings,
}

/// Get the XDG config directory for schemawatch.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "schemawatch").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("schemawatch.toml"))
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `explicit` - Optional config file given on the command line; unlike
    ///   the global file it must exist
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        Self::load_layers(global_config_path().as_deref(), explicit)
    }

    /// Load defaults, then `global` (if present), then `explicit`, then env vars.
    pub fn load_layers(global: Option<&Path>, explicit: Option<&Path>) -> Result<Self, AppError> {
        let defaults = Config::try_from(&Settings::default()).map_err(config_err)?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(global_path) = global {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(AppError::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEMAWATCH")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .map_err(config_err)?
            .try_deserialize()
            .map_err(config_err)
    }

    /// Serialize settings to TOML string.
    pub fn to_toml(&self) -> Result<String, AppError> {
        toml::to_string_pretty(self).map_err(|e| AppError::Config {
            message: format!("serialize settings: {}", e),
        })
    }

    /// Generate a template config file with comments.
    pub fn template() -> String {
        r#"# schemawatch configuration
# Global: ~/.config/schemawatch/schemawatch.toml
# Env override: SCHEMAWATCH__WATCHER__DEFAULT_DECISION=keep-and-abort

[watcher]
# Guard every node of the source model (tables, columns) instead of
# only its top-level objects
watch_hierarchy = true

# Used when no one can be asked (non-interactive, or prompt disabled):
# "proceed-and-clear", "keep-and-abort" or "cancel-and-abort"
default_decision = "cancel-and-abort"

[prompt]
# Ask on the terminal before breaking lineage references
interactive = true
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> AppError {
    AppError::Config {
        message: e.to_string(),
    }
}
