//! The framework-state object.
//!
//! One [`Runtime`] owns every registry the framework keeps: callables,
//! signal dispatcher and trap stack, hook registry and executor, the
//! environment overlay and the pending flow state. Constructing a fresh
//! runtime is the "reset" operation test harnesses rely on; [`Runtime::reset`]
//! does the same in place.

use std::sync::Arc;

use rigging_core::CallableRegistry;
use rigging_signals::Signal;
use rigging_signals::SignalDispatcher;
use rigging_signals::TrapStack;
use tracing::debug;
use tracing::warn;

use crate::config::HooksConfig;
use crate::contract::FlowController;
use crate::contract::Termination;
use crate::env::EnvOverlay;
use crate::error::HookError;
use crate::executor::HookExecutor;
use crate::executor::HookRunOutcome;
use crate::registry::HookRegistry;
use crate::types::ExecMode;

/// Hook the finalizer runs when `runEndHook` is on.
pub const END_HOOK: &str = "end";

/// Everything the framework keeps for one process invocation.
pub struct Runtime {
    config: HooksConfig,
    callables: Arc<CallableRegistry>,
    dispatcher: Arc<SignalDispatcher>,
    trap_stack: TrapStack,
    registry: Arc<HookRegistry>,
    executor: HookExecutor,
    env: Arc<EnvOverlay>,
    flow: Arc<FlowController>,
}

impl Runtime {
    pub fn new(config: HooksConfig) -> Self {
        let callables = Arc::new(CallableRegistry::new());
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));
        dispatcher.set_allow_duplicates(config.allow_duplicate_handlers);
        let trap_stack = TrapStack::new(Arc::clone(&dispatcher));
        let env = Arc::new(EnvOverlay::new());
        let flow = Arc::new(FlowController::new(Arc::clone(&env)));
        let registry = Arc::new(HookRegistry::new(Arc::clone(&callables)));
        let executor = HookExecutor::new(
            Arc::clone(&callables),
            Arc::clone(&registry),
            Arc::clone(&env),
            Arc::clone(&flow),
            dispatcher.status_handle(),
            &config,
        );
        Self {
            config,
            callables,
            dispatcher,
            trap_stack,
            registry,
            executor,
            env,
            flow,
        }
    }

    /// Install OS-level signal listeners when signals are first touched.
    /// Left off by default so embedded and test use stays deterministic.
    pub fn enable_os_signals(&self) {
        self.dispatcher.set_os_delivery(true);
    }

    pub fn config(&self) -> &HooksConfig {
        &self.config
    }

    pub fn callables(&self) -> &Arc<CallableRegistry> {
        &self.callables
    }

    pub fn signals(&self) -> &Arc<SignalDispatcher> {
        &self.dispatcher
    }

    pub fn trap_stack(&self) -> &TrapStack {
        &self.trap_stack
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &HookExecutor {
        &self.executor
    }

    pub fn env(&self) -> &Arc<EnvOverlay> {
        &self.env
    }

    pub fn flow(&self) -> &Arc<FlowController> {
        &self.flow
    }

    /// Record the host's last exit status; signal dispatch and hook
    /// implementations observe it.
    pub fn record_status(&self, status: i32) {
        self.dispatcher.record_status(status);
    }

    pub fn last_status(&self) -> i32 {
        self.dispatcher.last_status()
    }

    pub async fn run_hook(&self, hook: &str, args: &[String]) -> Result<HookRunOutcome, HookError> {
        self.executor.run(hook, args).await
    }

    pub async fn run_hook_forced(
        &self,
        hook: &str,
        mode: ExecMode,
        args: &[String],
    ) -> Result<HookRunOutcome, HookError> {
        self.executor.run_forced(hook, mode, args).await
    }

    /// The guaranteed end-of-process path.
    ///
    /// Delivers the synthetic `EXIT` signal through the dispatcher, runs
    /// the `end` hook when configured to, and hands back any termination
    /// request that is still pending. Call this from the host's
    /// finalization block; the process-level exit is the caller's job.
    pub async fn finish(&self) -> Option<Termination> {
        debug!("running end-of-process finalizer");
        self.dispatcher.dispatch(Signal::Exit).await;

        if self.config.run_end_hook {
            match self.executor.run(END_HOOK, &[]).await {
                Ok(outcome) => return outcome.termination,
                Err(err) => warn!(%err, "end hook failed"),
            }
        }
        self.flow.apply().await
    }

    /// Tear down and recreate every registry in place.
    pub fn reset(&self) {
        debug!("resetting framework state");
        self.callables.clear();
        self.dispatcher.reset();
        self.trap_stack.reset();
        self.registry.clear();
        self.env.clear();
        self.flow.clear();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("hooks", &self.registry.declared_hooks())
            .field("signals", &self.dispatcher.initialized_signals())
            .finish_non_exhaustive()
    }
}
