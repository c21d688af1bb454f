//! Name-to-callable resolution.
//!
//! Registration APIs across the framework take callable *names*; this
//! registry is the single place a name resolves to runnable logic. It
//! replaces the dynamically-named indirection of the system this framework
//! descends from with an ordinary keyed lookup.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::callable::Callable;

/// Thread-safe map from stable string key to a callable.
#[derive(Default)]
pub struct CallableRegistry {
    entries: DashMap<String, Arc<dyn Callable>>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a callable under `name`.
    ///
    /// The last definition wins, like a shell function.
    pub fn define(&self, name: impl Into<String>, callable: Arc<dyn Callable>) {
        let name = name.into();
        if self.entries.insert(name.clone(), callable).is_some() {
            debug!(name = %name, "callable redefined");
        }
    }

    /// Resolve a name to its callable, if defined.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Callable>> {
        self.entries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a definition. Returns whether anything was removed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// All defined names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every definition.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for CallableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::Invocation;
    use crate::callable::callable_from_fn;

    #[tokio::test]
    async fn define_then_resolve() {
        let registry = CallableRegistry::new();
        registry.define("greet", callable_from_fn(|_| async { 0 }));

        let callable = registry.resolve("greet").expect("defined above");
        assert_eq!(callable.call(Invocation::bare(0)).await, 0);
        assert!(registry.resolve("missing").is_none());
    }

    #[tokio::test]
    async fn redefinition_wins() {
        let registry = CallableRegistry::new();
        registry.define("f", callable_from_fn(|_| async { 1 }));
        registry.define("f", callable_from_fn(|_| async { 2 }));

        let callable = registry.resolve("f").expect("defined above");
        assert_eq!(callable.call(Invocation::bare(0)).await, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let registry = CallableRegistry::new();
        registry.define("a", callable_from_fn(|_| async { 0 }));
        registry.define("b", callable_from_fn(|_| async { 0 }));

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert_eq!(registry.names(), vec!["b".to_string()]);

        registry.clear();
        assert!(registry.is_empty());
    }
}
