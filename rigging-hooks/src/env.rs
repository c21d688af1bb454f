//! The runtime's environment overlay.
//!
//! Contract directives mutate the environment hook implementations see.
//! Mutating the real process environment is unsound once threads exist, so
//! the framework owns an overlay instead: reads fall back to the process
//! environment, and the full overlay is exported to every implementation
//! spawned after the mutation.

use dashmap::DashMap;
use tracing::debug;

use crate::contract::EnvOp;

/// Separator used by append/prepend/remove-segment operations.
const SEGMENT_SEPARATOR: char = ':';

#[derive(Debug, Default)]
pub struct EnvOverlay {
    vars: DashMap<String, String>,
}

impl EnvOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value: overlay first, then the process environment.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.vars.get(name) {
            return Some(value.clone());
        }
        std::env::var(name).ok()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Apply one environment mutation.
    pub fn apply(&self, name: &str, op: EnvOp, value: &str) {
        let next = match op {
            EnvOp::Set => value.to_string(),
            EnvOp::Append => match self.get(name).filter(|v| !v.is_empty()) {
                Some(current) => format!("{current}{SEGMENT_SEPARATOR}{value}"),
                None => value.to_string(),
            },
            EnvOp::Prepend => match self.get(name).filter(|v| !v.is_empty()) {
                Some(current) => format!("{value}{SEGMENT_SEPARATOR}{current}"),
                None => value.to_string(),
            },
            EnvOp::RemoveSegment => self
                .get(name)
                .unwrap_or_default()
                .split(SEGMENT_SEPARATOR)
                .filter(|segment| *segment != value)
                .collect::<Vec<_>>()
                .join(&SEGMENT_SEPARATOR.to_string()),
        };
        debug!(name = %name, ?op, "environment overlay updated");
        self.vars.insert(name.to_string(), next);
    }

    /// The overlay's variables, for exporting to a spawned implementation.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.vars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let env = EnvOverlay::new();
        assert!(env.get("RIGGING_TEST_UNSET").is_none());

        env.apply("A", EnvOp::Set, "one");
        assert_eq!(env.get("A").as_deref(), Some("one"));

        env.apply("A", EnvOp::Set, "two");
        assert_eq!(env.get("A").as_deref(), Some("two"));
    }

    #[test]
    fn append_and_prepend_join_with_colons() {
        let env = EnvOverlay::new();
        env.apply("PATHISH", EnvOp::Append, "/a");
        assert_eq!(env.get("PATHISH").as_deref(), Some("/a"));

        env.apply("PATHISH", EnvOp::Append, "/b");
        assert_eq!(env.get("PATHISH").as_deref(), Some("/a:/b"));

        env.apply("PATHISH", EnvOp::Prepend, "/c");
        assert_eq!(env.get("PATHISH").as_deref(), Some("/c:/a:/b"));
    }

    #[test]
    fn remove_segment_drops_every_match() {
        let env = EnvOverlay::new();
        env.apply("P", EnvOp::Set, "/a:/b:/a:/c");
        env.apply("P", EnvOp::RemoveSegment, "/a");
        assert_eq!(env.get("P").as_deref(), Some("/b:/c"));

        env.apply("P", EnvOp::RemoveSegment, "/b");
        env.apply("P", EnvOp::RemoveSegment, "/c");
        assert_eq!(env.get("P").as_deref(), Some(""));
    }

    #[test]
    fn snapshot_exports_overlay_vars() {
        let env = EnvOverlay::new();
        env.set("X", "1");
        env.set("Y", "2");

        let mut snapshot = env.snapshot();
        snapshot.sort();
        assert_eq!(
            snapshot,
            vec![
                ("X".to_string(), "1".to_string()),
                ("Y".to_string(), "2".to_string()),
            ]
        );

        env.clear();
        assert!(env.snapshot().is_empty());
    }
}
