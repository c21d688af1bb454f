//! Configuration loader.
//!
//! Loads the hook engine's configuration in priority order:
//! 1. Project: `{cwd}/.rigging/hooks.json`
//! 2. User: `~/.rigging/hooks.json`
//!
//! No file at either location means defaults, not an error.

use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::config::HooksConfig;
use crate::error::HookError;

pub const CONFIG_FILENAME: &str = "hooks.json";
pub const CONFIG_DIR: &str = ".rigging";

/// Load the configuration for `cwd`.
pub fn load_config(cwd: &Path) -> Result<HooksConfig, HookError> {
    let project_path = project_config_path(cwd);
    if project_path.exists() {
        debug!(path = %project_path.display(), "loading project hooks config");
        return load_from_file(&project_path);
    }

    if let Some(user_path) = user_config_path() {
        if user_path.exists() {
            debug!(path = %user_path.display(), "loading user hooks config");
            return load_from_file(&user_path);
        }
    }

    debug!("no hooks.json found; using defaults");
    Ok(HooksConfig::default())
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &Path) -> Result<HooksConfig, HookError> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        warn!(path = %path.display(), %err, "failed to read hooks config");
        HookError::ConfigError(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|err| {
        warn!(path = %path.display(), %err, "failed to parse hooks config");
        HookError::ConfigError(format!("failed to parse {}: {err}", path.display()))
    })
}

pub fn project_config_path(cwd: &Path) -> PathBuf {
    cwd.join(CONFIG_DIR).join(CONFIG_FILENAME)
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILENAME))
}
