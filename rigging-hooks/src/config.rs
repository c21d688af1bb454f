//! JSON configuration for the hook engine.
//!
//! ## Example
//!
//! ```json
//! {
//!   "disableAllHooks": false,
//!   "hooksDir": "ci-cd",
//!   "callablePrefix": "hook:",
//!   "defaultMode": "exec",
//!   "sourcePatterns": ["*-env*"],
//!   "execPatterns": ["*-job*"],
//!   "runEndHook": true,
//!   "allowDuplicateHandlers": false
//! }
//! ```

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::types::ExecMode;

/// Default directory scanned for external implementations.
pub const DEFAULT_HOOKS_DIR: &str = "ci-cd";

/// Default prefix of the direct callable run ahead of a hook's merged
/// implementation list.
pub const DEFAULT_CALLABLE_PREFIX: &str = "hook:";

/// Configuration surface of the hook engine. Every field has a default so
/// an absent or empty config file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksConfig {
    /// Global kill switch for all hooks.
    #[serde(default)]
    pub disable_all_hooks: bool,

    /// Directory scanned (non-recursively) for external implementations.
    #[serde(default = "default_hooks_dir")]
    pub hooks_dir: PathBuf,

    /// Prefix of the direct callable convention (`{prefix}{hook}`).
    #[serde(default = "default_callable_prefix")]
    pub callable_prefix: String,

    /// Execution mode when no override pattern matches.
    #[serde(default)]
    pub default_mode: ExecMode,

    /// Filenames matching these globs always run embedded.
    #[serde(default)]
    pub source_patterns: Vec<String>,

    /// Filenames matching these globs always run as subprocesses.
    #[serde(default)]
    pub exec_patterns: Vec<String>,

    /// Run the `end` hook from the runtime's finalizer.
    #[serde(default = "default_true")]
    pub run_end_hook: bool,

    /// Let the same handler appear twice on one signal's list.
    #[serde(default)]
    pub allow_duplicate_handlers: bool,
}

fn default_hooks_dir() -> PathBuf {
    PathBuf::from(DEFAULT_HOOKS_DIR)
}

fn default_callable_prefix() -> String {
    DEFAULT_CALLABLE_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            disable_all_hooks: false,
            hooks_dir: default_hooks_dir(),
            callable_prefix: default_callable_prefix(),
            default_mode: ExecMode::default(),
            source_patterns: Vec::new(),
            exec_patterns: Vec::new(),
            run_end_hook: true,
            allow_duplicate_handlers: false,
        }
    }
}
