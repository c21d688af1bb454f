//! Common hook types and name validation.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::error::HookError;

static HOOK_NAME: Lazy<Regex> = Lazy::new(|| {
    match Regex::new("^[A-Za-z0-9_-]+$") {
        Ok(re) => re,
        Err(_) => unreachable!("static pattern"),
    }
});

/// Whether a token is a valid hook identifier.
pub fn is_valid_hook_name(name: &str) -> bool {
    HOOK_NAME.is_match(name)
}

/// Validate a hook name, erroring with the offending token.
pub fn validate_hook_name(name: &str) -> Result<(), HookError> {
    if is_valid_hook_name(name) {
        Ok(())
    } else {
        Err(HookError::InvalidHookName(name.to_string()))
    }
}

/// How an external implementation is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Run as a captured subprocess, post-processed by middleware.
    #[default]
    Exec,
    /// Run embedded: inherited stdio and full process context, bypassing
    /// capture and middleware.
    Source,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecMode::Exec => f.write_str("exec"),
            ExecMode::Source => f.write_str("source"),
        }
    }
}

impl FromStr for ExecMode {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exec" => Ok(ExecMode::Exec),
            "source" => Ok(ExecMode::Source),
            other => Err(HookError::ConfigError(format!(
                "unknown execution mode: '{other}'"
            ))),
        }
    }
}
