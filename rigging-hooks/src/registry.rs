//! Hook declaration and registration.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use rigging_core::CallableRegistry;
use rigging_core::NamedCallable;
use tracing::debug;
use tracing::warn;

use crate::error::HookError;
use crate::middleware::ContractMiddleware;
use crate::middleware::Middleware;
use crate::types::validate_hook_name;

/// Declared hooks with provenance, ordered registrations, and per-hook
/// middleware overrides.
pub struct HookRegistry {
    callables: Arc<CallableRegistry>,
    /// Hook name to the contexts that declared it (diagnostics only).
    declared: DashMap<String, BTreeSet<String>>,
    /// Hook name to sort-key-ordered registered callables.
    registrations: DashMap<String, BTreeMap<String, NamedCallable>>,
    /// Per-hook middleware overrides; hooks without one use the default.
    middleware: DashMap<String, Arc<dyn Middleware>>,
}

impl HookRegistry {
    pub fn new(callables: Arc<CallableRegistry>) -> Self {
        Self {
            callables,
            declared: DashMap::new(),
            registrations: DashMap::new(),
            middleware: DashMap::new(),
        }
    }

    /// Declare hooks from `context`.
    ///
    /// The whole batch is validated before anything is recorded, so one
    /// invalid name declares nothing. Re-declaring from the same context
    /// is a silent no-op; a new context is allowed but warned about.
    pub fn declare(&self, names: &[&str], context: &str) -> Result<(), HookError> {
        for name in names {
            validate_hook_name(name)?;
        }
        for name in names {
            let mut contexts = self.declared.entry((*name).to_string()).or_default();
            if contexts.contains(context) {
                continue;
            }
            if !contexts.is_empty() {
                warn!(
                    hook = %name,
                    context = %context,
                    "hook redeclared from a new context; implementations may be ambiguous"
                );
            }
            contexts.insert(context.to_string());
            debug!(hook = %name, context = %context, "hook declared");
        }
        Ok(())
    }

    pub fn is_declared(&self, hook: &str) -> bool {
        self.declared.contains_key(hook)
    }

    /// Contexts that declared a hook, in declaration-name order.
    pub fn declaring_contexts(&self, hook: &str) -> Vec<String> {
        self.declared
            .get(hook)
            .map(|contexts| contexts.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every declared hook, sorted.
    pub fn declared_hooks(&self) -> Vec<String> {
        let mut hooks: Vec<String> = self.declared.iter().map(|e| e.key().clone()).collect();
        hooks.sort();
        hooks
    }

    /// Attach a named callable to a hook under a unique sort key. The
    /// hook does not need to be declared yet.
    pub fn register(&self, hook: &str, sort_key: &str, callable_name: &str) -> Result<(), HookError> {
        validate_hook_name(hook)?;
        let callable = self
            .callables
            .resolve(callable_name)
            .ok_or_else(|| HookError::UnresolvedCallable(callable_name.to_string()))?;

        let mut entries = self.registrations.entry(hook.to_string()).or_default();
        if entries.contains_key(sort_key) {
            return Err(HookError::DuplicateSortKey {
                hook: hook.to_string(),
                sort_key: sort_key.to_string(),
            });
        }
        entries.insert(
            sort_key.to_string(),
            NamedCallable::new(callable_name, callable),
        );
        debug!(hook = %hook, sort_key = %sort_key, callable = %callable_name, "hook implementation registered");
        Ok(())
    }

    /// Remove exactly one registration. Missing entries are a hard error.
    pub fn unregister(&self, hook: &str, sort_key: &str) -> Result<(), HookError> {
        let removed = self
            .registrations
            .get_mut(hook)
            .and_then(|mut entries| entries.remove(sort_key));
        match removed {
            Some(_) => {
                debug!(hook = %hook, sort_key = %sort_key, "hook implementation unregistered");
                Ok(())
            }
            None => Err(HookError::RegistrationNotFound {
                hook: hook.to_string(),
                sort_key: sort_key.to_string(),
            }),
        }
    }

    /// Registered callables for a hook, ascending by sort key.
    pub fn registrations_for(&self, hook: &str) -> Vec<(String, NamedCallable)> {
        self.registrations
            .get(hook)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(key, callable)| (key.clone(), callable.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Override the hook's output middleware.
    pub fn set_middleware(&self, hook: &str, middleware: Arc<dyn Middleware>) {
        self.middleware.insert(hook.to_string(), middleware);
    }

    /// Drop the override, returning the hook to the default middleware.
    pub fn reset_middleware(&self, hook: &str) {
        self.middleware.remove(hook);
    }

    /// The hook's active middleware. The default is contract-aware
    /// passthrough.
    pub fn middleware_for(&self, hook: &str) -> Arc<dyn Middleware> {
        self.middleware
            .get(hook)
            .map(|m| Arc::clone(m.value()))
            .unwrap_or_else(|| Arc::new(ContractMiddleware))
    }

    /// Drop every declaration, registration and override.
    pub fn clear(&self) {
        self.declared.clear();
        self.registrations.clear();
        self.middleware.clear();
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("declared", &self.declared_hooks())
            .finish_non_exhaustive()
    }
}
