//! The hook executor.
//!
//! Resolves a hook's implementations - the direct callable, registered
//! callables and discovered external executables - merges them into one
//! deterministic order and drives the capture runner and middleware for
//! each. Implementations run strictly sequentially; the pending flow state
//! is applied only after the whole hook has finished.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use rigging_core::CallableRegistry;
use rigging_core::NamedCallable;
use tracing::debug;
use tracing::warn;

use crate::capture::run_captured;
use crate::capture::run_captured_command;
use crate::config::HooksConfig;
use crate::contract::FlowController;
use crate::contract::Termination;
use crate::discovery::ExternalImpl;
use crate::discovery::ModePatterns;
use crate::discovery::discover_external;
use crate::env::EnvOverlay;
use crate::error::HookError;
use crate::registry::HookRegistry;
use crate::types::ExecMode;

/// Result of one hook invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookRunOutcome {
    /// Last observed exit status across the hook's implementations;
    /// zero when the hook had none.
    pub status: i32,

    /// Termination request left by contract directives, surfaced after
    /// every implementation has run. The process-level exit is the
    /// caller's job.
    pub termination: Option<Termination>,
}

impl HookRunOutcome {
    fn success() -> Self {
        Self {
            status: 0,
            termination: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// One entry of the merged execution list.
enum Implementation {
    Registered {
        sort_key: String,
        callable: NamedCallable,
    },
    External(ExternalImpl),
}

impl Implementation {
    fn sort_key(&self) -> &str {
        match self {
            Implementation::Registered { sort_key, .. } => sort_key,
            Implementation::External(external) => &external.sort_key,
        }
    }

    fn label(&self) -> String {
        match self {
            Implementation::Registered { callable, .. } => callable.name.clone(),
            Implementation::External(external) => external.path.display().to_string(),
        }
    }
}

/// Orchestrates one hook's implementations.
pub struct HookExecutor {
    callables: Arc<CallableRegistry>,
    registry: Arc<HookRegistry>,
    env: Arc<EnvOverlay>,
    flow: Arc<FlowController>,
    /// Shared last-recorded exit status; every implementation updates it
    /// so a later signal dispatch captures the truth.
    status: Arc<AtomicI32>,
    hooks_dir: PathBuf,
    callable_prefix: String,
    patterns: ModePatterns,
    default_mode: Mutex<ExecMode>,
    disabled: bool,
}

impl HookExecutor {
    pub fn new(
        callables: Arc<CallableRegistry>,
        registry: Arc<HookRegistry>,
        env: Arc<EnvOverlay>,
        flow: Arc<FlowController>,
        status: Arc<AtomicI32>,
        config: &HooksConfig,
    ) -> Self {
        Self {
            callables,
            registry,
            env,
            flow,
            status,
            hooks_dir: config.hooks_dir.clone(),
            callable_prefix: config.callable_prefix.clone(),
            patterns: ModePatterns::new(&config.source_patterns, &config.exec_patterns),
            default_mode: Mutex::new(config.default_mode),
            disabled: config.disable_all_hooks,
        }
    }

    /// The executor's current default execution mode.
    pub fn default_mode(&self) -> ExecMode {
        *self.default_mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a hook.
    ///
    /// An undeclared hook returns success immediately - hooks are opt-in
    /// extension points, not mandatory. Otherwise the direct callable
    /// (`{prefix}{hook}`) runs first, unconditionally, followed by the
    /// merged registered-plus-external list in ascending sort-key order.
    /// The pending flow state is applied once all of them have finished.
    pub async fn run(&self, hook: &str, args: &[String]) -> Result<HookRunOutcome, HookError> {
        if self.disabled {
            debug!(hook = %hook, "hooks are disabled; skipping");
            return Ok(HookRunOutcome::success());
        }
        if !self.registry.is_declared(hook) {
            debug!(hook = %hook, "hook not declared; nothing to run");
            return Ok(HookRunOutcome::success());
        }

        let default_mode = self.default_mode();
        let mut implementations: Vec<Implementation> = self
            .registry
            .registrations_for(hook)
            .into_iter()
            .map(|(sort_key, callable)| Implementation::Registered { sort_key, callable })
            .collect();
        implementations.extend(
            discover_external(&self.hooks_dir, hook, &self.patterns, default_mode)
                .into_iter()
                .map(Implementation::External),
        );
        // Stable: registered entries precede externals on a shared key.
        implementations.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

        let middleware = self.registry.middleware_for(hook);
        let mut last_status = 0;

        let direct_name = format!("{}{hook}", self.callable_prefix);
        if let Some(direct) = self.callables.resolve(&direct_name) {
            debug!(hook = %hook, callable = %direct_name, "running direct callable");
            let status = match run_captured(
                &direct_name,
                direct,
                args.to_vec(),
                self.status.load(Ordering::SeqCst),
            )
            .await
            {
                Ok((status, buffer)) => middleware.process(hook, &buffer, status, &self.flow),
                Err(err) => {
                    warn!(hook = %hook, callable = %direct_name, %err, "direct callable failed to run");
                    1
                }
            };
            last_status = status;
            self.status.store(status, Ordering::SeqCst);
        }

        for implementation in &implementations {
            let label = implementation.label();
            debug!(hook = %hook, implementation = %label, sort_key = %implementation.sort_key(), "running implementation");
            let status = self
                .run_implementation(hook, implementation, args, middleware.as_ref())
                .await;
            last_status = status;
            self.status.store(status, Ordering::SeqCst);
        }

        // Deferred on purpose: one implementation's termination request
        // must not short-circuit siblings queued in the same invocation.
        let termination = self.flow.apply().await;
        Ok(HookRunOutcome {
            status: last_status,
            termination,
        })
    }

    async fn run_implementation(
        &self,
        hook: &str,
        implementation: &Implementation,
        args: &[String],
        middleware: &dyn crate::middleware::Middleware,
    ) -> i32 {
        let captured_status = self.status.load(Ordering::SeqCst);
        match implementation {
            Implementation::Registered { callable, .. } => {
                match run_captured(
                    &callable.name,
                    Arc::clone(&callable.callable),
                    args.to_vec(),
                    captured_status,
                )
                .await
                {
                    Ok((status, buffer)) => middleware.process(hook, &buffer, status, &self.flow),
                    Err(err) => {
                        warn!(hook = %hook, callable = %callable.name, %err, "registered implementation failed to run");
                        1
                    }
                }
            }
            Implementation::External(external) => match external.mode {
                ExecMode::Exec => {
                    match run_captured_command(&external.path, args, self.env.snapshot()).await {
                        Ok((status, buffer)) => {
                            middleware.process(hook, &buffer, status, &self.flow)
                        }
                        Err(err) => {
                            warn!(hook = %hook, path = %external.path.display(), %err, "external implementation failed to run");
                            1
                        }
                    }
                }
                // Embedded: full access to the current process context,
                // no capture, no middleware; the status is taken as-is.
                ExecMode::Source => self.run_embedded(&external.path, args).await,
            },
        }
    }

    async fn run_embedded(&self, path: &Path, args: &[String]) -> i32 {
        let mut command = tokio::process::Command::new(path);
        command.args(args).envs(self.env.snapshot());
        match command.status().await {
            Ok(status) => status.code().unwrap_or(1),
            Err(err) => {
                warn!(path = %path.display(), %err, "embedded implementation failed to start");
                1
            }
        }
    }

    /// Run a hook with the default execution mode overridden for the
    /// duration of this one call; the previous mode is restored whether
    /// the run succeeds or fails.
    pub async fn run_forced(
        &self,
        hook: &str,
        mode: ExecMode,
        args: &[String],
    ) -> Result<HookRunOutcome, HookError> {
        let previous = {
            let mut guard = self.default_mode.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *guard, mode)
        };
        let result = self.run(hook, args).await;
        *self.default_mode.lock().unwrap_or_else(|e| e.into_inner()) = previous;
        result
    }
}

impl std::fmt::Debug for HookExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookExecutor")
            .field("hooks_dir", &self.hooks_dir)
            .field("default_mode", &self.default_mode())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rigging_core::Invocation;
    use rigging_core::callable_from_fn;

    struct Rig {
        callables: Arc<CallableRegistry>,
        registry: Arc<HookRegistry>,
        executor: HookExecutor,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn rig_with(config: HooksConfig) -> Rig {
        let callables = Arc::new(CallableRegistry::new());
        let registry = Arc::new(HookRegistry::new(Arc::clone(&callables)));
        let env = Arc::new(EnvOverlay::new());
        let flow = Arc::new(FlowController::new(Arc::clone(&env)));
        let executor = HookExecutor::new(
            Arc::clone(&callables),
            Arc::clone(&registry),
            env,
            flow,
            Arc::new(AtomicI32::new(0)),
            &config,
        );
        Rig {
            callables,
            registry,
            executor,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn rig() -> Rig {
        rig_with(HooksConfig::default())
    }

    impl Rig {
        /// Define a callable that logs its tag and returns `status`.
        fn tracked(&self, name: &str, status: i32) {
            let log = Arc::clone(&self.log);
            let tag = name.to_string();
            self.callables.define(
                name,
                callable_from_fn(move |_inv: Invocation| {
                    let log = Arc::clone(&log);
                    let tag = tag.clone();
                    async move {
                        log.lock().unwrap_or_else(|e| e.into_inner()).push(tag);
                        status
                    }
                }),
            );
        }

        fn events(&self) -> Vec<String> {
            self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[tokio::test]
    async fn undeclared_hook_is_a_successful_no_op() {
        let rig = rig();
        let outcome = rig.executor.run("never-declared", &[]).await.unwrap();
        assert_eq!(outcome, HookRunOutcome::success());
    }

    #[tokio::test]
    async fn declared_hook_with_no_implementations_succeeds() {
        let rig = rig();
        rig.registry.declare(&["empty"], "test").unwrap();
        let outcome = rig.executor.run("empty", &[]).await.unwrap();
        assert!(outcome.is_success());
        assert!(outcome.termination.is_none());
    }

    #[tokio::test]
    async fn direct_callable_runs_first_then_sort_key_order() {
        let rig = rig();
        rig.registry.declare(&["build"], "test").unwrap();
        rig.tracked("hook:build", 0);
        rig.tracked("late", 0);
        rig.tracked("early", 0);
        rig.registry.register("build", "20", "late").unwrap();
        rig.registry.register("build", "10", "early").unwrap();

        let outcome = rig.executor.run("build", &[]).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(rig.events(), vec!["hook:build", "early", "late"]);
    }

    #[tokio::test]
    async fn failing_implementation_does_not_abort_siblings() {
        let rig = rig();
        rig.registry.declare(&["deploy"], "test").unwrap();
        rig.tracked("breaks", 3);
        rig.tracked("still-runs", 0);
        rig.registry.register("deploy", "10", "breaks").unwrap();
        rig.registry.register("deploy", "20", "still-runs").unwrap();

        let outcome = rig.executor.run("deploy", &[]).await.unwrap();
        assert_eq!(rig.events(), vec!["breaks", "still-runs"]);
        // Last observed status wins.
        assert_eq!(outcome.status, 0);

        // Reversed order: the failure is the last observation.
        let rig = rig_with(HooksConfig::default());
        rig.registry.declare(&["deploy"], "test").unwrap();
        rig.tracked("ok", 0);
        rig.tracked("fails-last", 5);
        rig.registry.register("deploy", "10", "ok").unwrap();
        rig.registry.register("deploy", "20", "fails-last").unwrap();
        let outcome = rig.executor.run("deploy", &[]).await.unwrap();
        assert_eq!(outcome.status, 5);
    }

    #[tokio::test]
    async fn exit_directive_waits_for_every_sibling() {
        let rig = rig();
        rig.registry.declare(&["finish"], "test").unwrap();

        let log = Arc::clone(&rig.log);
        rig.callables.define(
            "wants-out",
            callable_from_fn(move |inv: Invocation| {
                let log = Arc::clone(&log);
                async move {
                    log.lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push("wants-out".to_string());
                    inv.io.out_line("contract:exit:7");
                    0
                }
            }),
        );
        rig.tracked("sibling", 0);
        rig.registry.register("finish", "10", "wants-out").unwrap();
        rig.registry.register("finish", "20", "sibling").unwrap();

        let outcome = rig.executor.run("finish", &[]).await.unwrap();
        // The sibling still ran after the exit request.
        assert_eq!(rig.events(), vec!["wants-out", "sibling"]);
        assert_eq!(outcome.termination, Some(Termination { code: 7 }));
    }

    #[tokio::test]
    async fn implementations_see_the_previous_status() {
        let rig = rig();
        rig.registry.declare(&["chain"], "test").unwrap();

        rig.callables
            .define("sets-status", callable_from_fn(|_| async { 9 }));
        let log = Arc::clone(&rig.log);
        rig.callables.define(
            "reads-status",
            callable_from_fn(move |inv: Invocation| {
                let log = Arc::clone(&log);
                async move {
                    log.lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(format!("saw:{}", inv.status));
                    0
                }
            }),
        );
        rig.registry.register("chain", "10", "sets-status").unwrap();
        rig.registry.register("chain", "20", "reads-status").unwrap();

        rig.executor.run("chain", &[]).await.unwrap();
        assert_eq!(rig.events(), vec!["saw:9"]);
    }

    #[tokio::test]
    async fn run_forced_restores_the_default_mode() {
        let rig = rig();
        rig.registry.declare(&["any"], "test").unwrap();
        assert_eq!(rig.executor.default_mode(), ExecMode::Exec);

        rig.executor
            .run_forced("any", ExecMode::Source, &[])
            .await
            .unwrap();
        assert_eq!(rig.executor.default_mode(), ExecMode::Exec);
    }

    #[tokio::test]
    async fn kill_switch_disables_every_hook() {
        let rig = rig_with(HooksConfig {
            disable_all_hooks: true,
            ..HooksConfig::default()
        });
        rig.registry.declare(&["build"], "test").unwrap();
        rig.tracked("hook:build", 0);

        let outcome = rig.executor.run("build", &[]).await.unwrap();
        assert!(outcome.is_success());
        assert!(rig.events().is_empty());
    }

    #[tokio::test]
    async fn custom_middleware_replaces_the_default() {
        struct StatusOverride;
        impl crate::middleware::Middleware for StatusOverride {
            fn process(
                &self,
                _hook: &str,
                _buffer: &crate::capture::CaptureBuffer,
                _status: i32,
                _flow: &FlowController,
            ) -> i32 {
                42
            }
        }

        let rig = rig();
        rig.registry.declare(&["mw"], "test").unwrap();
        rig.tracked("impl", 0);
        rig.registry.register("mw", "10", "impl").unwrap();
        rig.registry.set_middleware("mw", Arc::new(StatusOverride));

        let outcome = rig.executor.run("mw", &[]).await.unwrap();
        assert_eq!(outcome.status, 42);
    }
}
