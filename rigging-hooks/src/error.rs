//! Error types for the hook engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HookError {
    /// A hook name failed identifier validation.
    #[error("invalid hook name: '{0}'")]
    InvalidHookName(String),

    /// A callable name did not resolve in the callable registry.
    #[error("callable does not resolve: '{0}'")]
    UnresolvedCallable(String),

    /// The sort key is already taken for this hook.
    #[error("sort key '{sort_key}' is already registered for hook '{hook}'")]
    DuplicateSortKey { hook: String, sort_key: String },

    /// Unregister named an entry that does not exist.
    #[error("no registration with sort key '{sort_key}' for hook '{hook}'")]
    RegistrationNotFound { hook: String, sort_key: String },

    /// Failed to spawn an external implementation.
    #[error("failed to spawn hook implementation: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// Capture channels could not be acquired for an implementation.
    #[error("capture channel unavailable: {0}")]
    CaptureUnavailable(String),

    /// A contract directive line could not be interpreted.
    #[error("malformed contract directive '{line}': {reason}")]
    MalformedDirective { line: String, reason: String },

    /// Configuration could not be read or parsed.
    #[error("hook configuration error: {0}")]
    ConfigError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = HookError::DuplicateSortKey {
            hook: "build".to_string(),
            sort_key: "10".to_string(),
        };
        assert!(err.to_string().contains("build"));
        assert!(err.to_string().contains("10"));

        let err = HookError::MalformedDirective {
            line: "contract:bogus".to_string(),
            reason: "unknown directive kind".to_string(),
        };
        assert!(err.to_string().contains("contract:bogus"));
    }
}
