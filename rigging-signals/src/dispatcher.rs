//! The signal dispatcher.
//!
//! One dispatcher multiplexes the single OS trap slot of each signal
//! across an ordered list of named handlers. The first registration for a
//! signal captures whatever occupied the trap slot as that signal's legacy
//! handler and installs the dispatcher in its place; later registrations
//! only append to the in-memory list.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use rigging_core::CallableRegistry;
use rigging_core::Invocation;
use rigging_core::NamedCallable;
use rigging_core::StdioHandles;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::error::SignalError;
use crate::signal::Signal;
use crate::traps::Trap;
use crate::traps::TrapTable;

#[derive(Default)]
struct SignalEntry {
    handlers: Vec<NamedCallable>,
    legacy: Option<NamedCallable>,
    initialized: bool,
    os_task: Option<JoinHandle<()>>,
}

/// Multiplexes one trap slot per signal across an ordered handler list.
pub struct SignalDispatcher {
    /// Handle to ourselves for the OS listener tasks; weak so a dropped
    /// dispatcher takes its listeners down with it.
    weak: Weak<SignalDispatcher>,
    callables: Arc<CallableRegistry>,
    traps: Arc<TrapTable>,
    entries: DashMap<Signal, SignalEntry>,
    /// Last recorded process exit status; captured first on every dispatch.
    status: Arc<AtomicI32>,
    allow_duplicates: AtomicBool,
    /// Whether first-touch initialization also installs the OS-level
    /// listener. Off by default so synthetic delivery stays deterministic;
    /// the runtime turns it on for real processes.
    os_delivery: AtomicBool,
}

impl SignalDispatcher {
    pub fn new(callables: Arc<CallableRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            callables,
            traps: Arc::new(TrapTable::new()),
            entries: DashMap::new(),
            status: Arc::new(AtomicI32::new(0)),
            allow_duplicates: AtomicBool::new(false),
            os_delivery: AtomicBool::new(false),
        })
    }

    /// The trap table this dispatcher captures legacy handlers from.
    pub fn traps(&self) -> &Arc<TrapTable> {
        &self.traps
    }

    /// Shared cell holding the last recorded exit status.
    pub fn status_handle(&self) -> Arc<AtomicI32> {
        Arc::clone(&self.status)
    }

    pub fn record_status(&self, status: i32) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn last_status(&self) -> i32 {
        self.status.load(Ordering::SeqCst)
    }

    /// Allow the same handler name to appear more than once on one
    /// signal's list (and therefore run more than once per delivery).
    pub fn set_allow_duplicates(&self, allow: bool) {
        self.allow_duplicates.store(allow, Ordering::SeqCst);
    }

    /// Install OS-level listeners when signals are first touched.
    pub fn set_os_delivery(&self, enabled: bool) {
        self.os_delivery.store(enabled, Ordering::SeqCst);
    }

    /// Attach `handler` to one or more signals.
    ///
    /// The handler name must resolve in the callable registry and at least
    /// one signal token must be given; either failure aborts the whole
    /// call with nothing registered. An unknown signal token is skipped
    /// with a diagnostic while the remaining signals proceed.
    pub fn register(&self, handler: &str, signals: &[&str]) -> Result<(), SignalError> {
        if signals.is_empty() {
            return Err(SignalError::NoSignals);
        }
        let callable = self
            .callables
            .resolve(handler)
            .ok_or_else(|| SignalError::UnresolvedHandler(handler.to_string()))?;

        for token in signals {
            let signal = match Signal::parse(token) {
                Ok(signal) => signal,
                Err(err) => {
                    warn!(signal = %token, %err, "skipping registration for unknown signal");
                    continue;
                }
            };

            let mut entry = self.entries.entry(signal).or_default();
            if !entry.initialized {
                self.init_entry(signal, entry.value_mut());
            }

            let duplicate = entry.handlers.iter().any(|h| h.name == handler);
            if duplicate && !self.allow_duplicates.load(Ordering::SeqCst) {
                return Err(SignalError::DuplicateHandler {
                    handler: handler.to_string(),
                    signal,
                });
            }
            entry
                .handlers
                .push(NamedCallable::new(handler, Arc::clone(&callable)));
            debug!(signal = %signal, handler = %handler, "signal handler registered");
        }
        Ok(())
    }

    /// First touch of a signal: capture the legacy trap, take over the
    /// slot, and (when enabled) install the one OS-level listener.
    fn init_entry(&self, signal: Signal, entry: &mut SignalEntry) {
        match self.traps.current(signal) {
            Some(Trap::Handler(previous)) => {
                debug!(signal = %signal, legacy = %previous.name, "captured legacy trap handler");
                entry.legacy = Some(previous);
            }
            Some(Trap::Dispatcher) => {
                // Already ours; nothing to capture.
                debug!(signal = %signal, "dispatcher already installed");
            }
            None => {}
        }
        self.traps.install_dispatcher(signal);
        entry.initialized = true;

        if self.os_delivery.load(Ordering::SeqCst) {
            entry.os_task = self.spawn_os_listener(signal);
        }
    }

    #[cfg(unix)]
    fn spawn_os_listener(&self, signal: Signal) -> Option<JoinHandle<()>> {
        let kind = signal.kind()?;
        let mut stream = match tokio::signal::unix::signal(kind) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(signal = %signal, %err, "failed to install OS signal listener");
                return None;
            }
        };
        let dispatcher = self.weak.clone();
        Some(tokio::spawn(async move {
            loop {
                if stream.recv().await.is_none() {
                    break;
                }
                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                dispatcher.dispatch(signal).await;
            }
        }))
    }

    #[cfg(not(unix))]
    fn spawn_os_listener(&self, _signal: Signal) -> Option<JoinHandle<()>> {
        None
    }

    /// Deliver a signal to its handler chain.
    ///
    /// The current exit status is captured before anything else runs; the
    /// legacy handler goes first, then every registered handler in
    /// registration order, each receiving the captured status. A failing
    /// handler is logged and skipped. Returns the originally captured
    /// status so delivery leaves the observable result untouched.
    pub async fn dispatch(&self, signal: Signal) -> i32 {
        let status = self.status.load(Ordering::SeqCst);

        let (legacy, handlers) = {
            match self.entries.get(&signal) {
                Some(entry) if entry.initialized => {
                    (entry.legacy.clone(), entry.handlers.clone())
                }
                _ => {
                    debug!(signal = %signal, "dispatch on untouched signal; nothing to run");
                    return status;
                }
            }
        };

        if let Some(legacy) = legacy {
            let rc = self.invoke(&legacy, status).await;
            if rc != 0 {
                warn!(signal = %signal, handler = %legacy.name, status = rc, "legacy trap handler failed");
            }
        }
        for handler in handlers {
            let rc = self.invoke(&handler, status).await;
            if rc != 0 {
                warn!(signal = %signal, handler = %handler.name, status = rc, "signal handler failed; continuing");
            }
        }
        status
    }

    async fn invoke(&self, handler: &NamedCallable, status: i32) -> i32 {
        let invocation = Invocation {
            args: vec![status.to_string()],
            status,
            io: StdioHandles::passthrough(),
        };
        handler.callable.call(invocation).await
    }

    /// Remove all occurrences of `handler` from the named signals.
    pub fn unregister(&self, handler: &str, signals: &[&str]) -> Result<(), SignalError> {
        if signals.is_empty() {
            return Err(SignalError::NoSignals);
        }
        for token in signals {
            let signal = match Signal::parse(token) {
                Ok(signal) => signal,
                Err(err) => {
                    warn!(signal = %token, %err, "skipping unregister for unknown signal");
                    continue;
                }
            };
            let removed = match self.entries.get_mut(&signal) {
                Some(mut entry) => {
                    let before = entry.handlers.len();
                    entry.handlers.retain(|h| h.name != handler);
                    before - entry.handlers.len()
                }
                None => 0,
            };
            if removed == 0 {
                return Err(SignalError::HandlerNotRegistered {
                    handler: handler.to_string(),
                    signal,
                });
            }
            debug!(signal = %signal, handler = %handler, removed, "signal handler unregistered");
        }
        Ok(())
    }

    /// Empty the handler lists of the named signals, preserving legacy
    /// traps and initialization.
    pub fn clear(&self, signals: &[&str]) -> Result<(), SignalError> {
        if signals.is_empty() {
            return Err(SignalError::NoSignals);
        }
        for token in signals {
            let signal = match Signal::parse(token) {
                Ok(signal) => signal,
                Err(err) => {
                    warn!(signal = %token, %err, "skipping clear for unknown signal");
                    continue;
                }
            };
            if let Some(mut entry) = self.entries.get_mut(&signal) {
                entry.handlers.clear();
            }
        }
        Ok(())
    }

    /// Reinstate the legacy trap (or empty the slot when none existed)
    /// and forget this dispatcher's state for the named signals.
    pub fn restore(&self, signals: &[&str]) -> Result<(), SignalError> {
        if signals.is_empty() {
            return Err(SignalError::NoSignals);
        }
        for token in signals {
            let signal = match Signal::parse(token) {
                Ok(signal) => signal,
                Err(err) => {
                    warn!(signal = %token, %err, "skipping restore for unknown signal");
                    continue;
                }
            };
            match self.entries.remove(&signal) {
                Some((_, entry)) => {
                    if let Some(task) = entry.os_task {
                        task.abort();
                    }
                    match entry.legacy {
                        Some(legacy) => {
                            debug!(signal = %signal, handler = %legacy.name, "legacy trap restored");
                            self.traps.set_handler(signal, legacy);
                        }
                        None => {
                            self.traps.clear(signal);
                        }
                    }
                }
                None => {
                    // Never touched; nothing to restore. Log-only per the
                    // error contract for legacy restore.
                    debug!(signal = %signal, "restore on untouched signal");
                }
            }
        }
        Ok(())
    }

    /// Handler names currently registered for a signal, in order.
    pub fn handlers(&self, signal: Signal) -> Vec<String> {
        self.entries
            .get(&signal)
            .map(|entry| entry.handlers.iter().map(|h| h.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Signals the dispatcher has taken over, in numeric order.
    pub fn initialized_signals(&self) -> Vec<Signal> {
        let mut signals: Vec<Signal> = self
            .entries
            .iter()
            .filter(|e| e.initialized)
            .map(|e| *e.key())
            .collect();
        signals.sort();
        signals
    }

    /// Read-only listing of handler names per signal. With no tokens,
    /// lists every initialized signal.
    pub fn list(&self, signals: &[&str]) -> Result<Vec<(Signal, Vec<String>)>, SignalError> {
        let selected = if signals.is_empty() {
            self.initialized_signals()
        } else {
            let mut selected = Vec::with_capacity(signals.len());
            for token in signals {
                selected.push(Signal::parse(token)?);
            }
            selected
        };
        Ok(selected
            .into_iter()
            .map(|signal| (signal, self.handlers(signal)))
            .collect())
    }

    /// Snapshot one signal's handler list (for the trap stack).
    pub(crate) fn snapshot_handlers(&self, signal: Signal) -> Vec<NamedCallable> {
        self.entries
            .get(&signal)
            .map(|entry| entry.handlers.clone())
            .unwrap_or_default()
    }

    /// Overwrite one signal's handler list from a snapshot, initializing
    /// the signal first if it was never touched (or was restored away).
    pub(crate) fn restore_snapshot(&self, signal: Signal, handlers: Vec<NamedCallable>) {
        let mut entry = self.entries.entry(signal).or_default();
        if !entry.initialized {
            self.init_entry(signal, entry.value_mut());
        }
        entry.handlers = handlers;
    }

    /// Tear down every signal: abort OS listeners, drop handler lists and
    /// captured legacy traps, release every trap slot.
    pub fn reset(&self) {
        for mut entry in self.entries.iter_mut() {
            if let Some(task) = entry.os_task.take() {
                task.abort();
            }
        }
        self.entries.clear();
        self.traps.clear_all();
        self.status.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for SignalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalDispatcher")
            .field("signals", &self.initialized_signals())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rigging_core::callable_from_fn;
    use std::sync::Mutex;

    /// Registry plus a shared event log the handlers append to.
    fn rig() -> (Arc<CallableRegistry>, Arc<Mutex<Vec<String>>>) {
        let callables = Arc::new(CallableRegistry::new());
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        (callables, log)
    }

    fn logging_handler(
        callables: &CallableRegistry,
        log: &Arc<Mutex<Vec<String>>>,
        name: &str,
    ) {
        let log = Arc::clone(log);
        let tag = name.to_string();
        callables.define(
            name,
            callable_from_fn(move |inv| {
                let log = Arc::clone(&log);
                let tag = tag.clone();
                async move {
                    log.lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(format!("{tag}:{}", inv.status));
                    0
                }
            }),
        );
    }

    fn events(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order_after_legacy() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));

        // A trap that existed before the dispatcher took over.
        logging_handler(&callables, &log, "legacy");
        let legacy = NamedCallable::new(
            "legacy",
            callables.resolve("legacy").expect("defined above"),
        );
        dispatcher.traps().set_handler(Signal::Term, legacy);

        logging_handler(&callables, &log, "first");
        logging_handler(&callables, &log, "second");
        dispatcher.register("first", &["TERM"]).unwrap();
        dispatcher.register("second", &["TERM"]).unwrap();

        dispatcher.record_status(3);
        let status = dispatcher.dispatch(Signal::Term).await;

        assert_eq!(status, 3);
        assert_eq!(events(&log), vec!["legacy:3", "first:3", "second:3"]);
        assert!(dispatcher.traps().is_dispatcher(Signal::Term));
    }

    #[tokio::test]
    async fn failing_handler_does_not_abort_the_rest() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));

        callables.define("broken", callable_from_fn(|_| async { 1 }));
        logging_handler(&callables, &log, "after");
        dispatcher.register("broken", &["INT"]).unwrap();
        dispatcher.register("after", &["INT"]).unwrap();

        let status = dispatcher.dispatch(Signal::Int).await;
        assert_eq!(status, 0);
        assert_eq!(events(&log), vec!["after:0"]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_without_the_flag() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));
        logging_handler(&callables, &log, "once");

        dispatcher.register("once", &["HUP"]).unwrap();
        let err = dispatcher.register("once", &["HUP"]).unwrap_err();
        assert!(matches!(err, SignalError::DuplicateHandler { .. }));
        assert_eq!(dispatcher.handlers(Signal::Hup).len(), 1);

        dispatcher.set_allow_duplicates(true);
        dispatcher.register("once", &["HUP"]).unwrap();
        assert_eq!(dispatcher.handlers(Signal::Hup).len(), 2);

        dispatcher.dispatch(Signal::Hup).await;
        assert_eq!(events(&log), vec!["once:0", "once:0"]);
    }

    #[tokio::test]
    async fn unknown_signal_is_skipped_but_valid_ones_proceed() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));
        logging_handler(&callables, &log, "h");

        dispatcher.register("h", &["BOGUS", "usr1"]).unwrap();
        assert_eq!(dispatcher.handlers(Signal::Usr1), vec!["h".to_string()]);
        assert_eq!(dispatcher.initialized_signals(), vec![Signal::Usr1]);
    }

    #[tokio::test]
    async fn unresolved_handler_fails_with_no_partial_registration() {
        let (callables, _log) = rig();
        let dispatcher = SignalDispatcher::new(callables);

        let err = dispatcher.register("ghost", &["INT", "TERM"]).unwrap_err();
        assert!(matches!(err, SignalError::UnresolvedHandler(_)));
        assert!(dispatcher.initialized_signals().is_empty());

        let err = dispatcher.register("ghost", &[]).unwrap_err();
        assert!(matches!(err, SignalError::NoSignals));
    }

    #[tokio::test]
    async fn unregister_removes_all_occurrences() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));
        logging_handler(&callables, &log, "dup");
        logging_handler(&callables, &log, "keep");

        dispatcher.set_allow_duplicates(true);
        dispatcher.register("dup", &["INT"]).unwrap();
        dispatcher.register("keep", &["INT"]).unwrap();
        dispatcher.register("dup", &["INT"]).unwrap();

        dispatcher.unregister("dup", &["INT"]).unwrap();
        assert_eq!(dispatcher.handlers(Signal::Int), vec!["keep".to_string()]);

        let err = dispatcher.unregister("dup", &["INT"]).unwrap_err();
        assert!(matches!(err, SignalError::HandlerNotRegistered { .. }));
    }

    #[tokio::test]
    async fn clear_keeps_legacy_and_initialization() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));

        logging_handler(&callables, &log, "legacy");
        dispatcher.traps().set_handler(
            Signal::Int,
            NamedCallable::new("legacy", callables.resolve("legacy").expect("defined")),
        );
        logging_handler(&callables, &log, "h");
        dispatcher.register("h", &["INT"]).unwrap();

        dispatcher.clear(&["INT"]).unwrap();
        assert!(dispatcher.handlers(Signal::Int).is_empty());
        assert_eq!(dispatcher.initialized_signals(), vec![Signal::Int]);

        // Legacy still runs on delivery.
        dispatcher.dispatch(Signal::Int).await;
        assert_eq!(events(&log), vec!["legacy:0"]);
    }

    #[tokio::test]
    async fn restore_reinstates_the_legacy_trap() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));

        logging_handler(&callables, &log, "legacy");
        dispatcher.traps().set_handler(
            Signal::Term,
            NamedCallable::new("legacy", callables.resolve("legacy").expect("defined")),
        );
        logging_handler(&callables, &log, "h");
        dispatcher.register("h", &["TERM"]).unwrap();
        assert!(dispatcher.traps().is_dispatcher(Signal::Term));

        dispatcher.restore(&["TERM"]).unwrap();
        match dispatcher.traps().current(Signal::Term) {
            Some(Trap::Handler(h)) => assert_eq!(h.name, "legacy"),
            other => panic!("unexpected trap slot: {other:?}"),
        }
        assert!(dispatcher.initialized_signals().is_empty());

        // No legacy existed for INT: restore empties the slot.
        dispatcher.register("h", &["INT"]).unwrap();
        dispatcher.restore(&["INT"]).unwrap();
        assert!(dispatcher.traps().current(Signal::Int).is_none());
    }

    #[tokio::test]
    async fn dispatch_preserves_recorded_status() {
        let (callables, _log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));
        callables.define("noisy", callable_from_fn(|_| async { 17 }));
        dispatcher.register("noisy", &["QUIT"]).unwrap();

        dispatcher.record_status(42);
        assert_eq!(dispatcher.dispatch(Signal::Quit).await, 42);
        assert_eq!(dispatcher.last_status(), 42);
    }

    #[tokio::test]
    async fn list_reports_registered_handlers() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));
        logging_handler(&callables, &log, "a");
        logging_handler(&callables, &log, "b");
        dispatcher.register("a", &["INT", "TERM"]).unwrap();
        dispatcher.register("b", &["INT"]).unwrap();

        let listing = dispatcher.list(&[]).unwrap();
        assert_eq!(
            listing,
            vec![
                (Signal::Int, vec!["a".to_string(), "b".to_string()]),
                (Signal::Term, vec!["a".to_string()]),
            ]
        );

        let listing = dispatcher.list(&["SIGTERM"]).unwrap();
        assert_eq!(listing, vec![(Signal::Term, vec!["a".to_string()])]);
    }

    #[tokio::test]
    async fn reset_tears_everything_down() {
        let (callables, log) = rig();
        let dispatcher = SignalDispatcher::new(Arc::clone(&callables));
        logging_handler(&callables, &log, "h");
        dispatcher.register("h", &["INT"]).unwrap();
        dispatcher.record_status(9);

        dispatcher.reset();
        assert!(dispatcher.initialized_signals().is_empty());
        assert!(dispatcher.traps().current(Signal::Int).is_none());
        assert_eq!(dispatcher.last_status(), 0);
    }
}
