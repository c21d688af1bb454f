//! Scoped snapshots of the dispatcher's handler lists.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use rigging_core::NamedCallable;
use tracing::debug;
use tracing::warn;

use crate::dispatcher::SignalDispatcher;
use crate::error::SignalError;
use crate::signal::Signal;

type Frame = BTreeMap<Signal, Vec<NamedCallable>>;

/// Push/pop of full handler-list snapshots, enabling a scoped temporary
/// handler set around a sensitive region of code.
pub struct TrapStack {
    dispatcher: Arc<SignalDispatcher>,
    frames: Mutex<Vec<Frame>>,
}

impl TrapStack {
    pub fn new(dispatcher: Arc<SignalDispatcher>) -> Self {
        Self {
            dispatcher,
            frames: Mutex::new(Vec::new()),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Snapshot the handler lists of the named signals (default: every
    /// signal the dispatcher has taken over) into a new frame. Returns
    /// the new depth.
    pub fn push(&self, signals: &[&str]) -> Result<usize, SignalError> {
        let selected = self.select(signals);
        let mut frame = Frame::new();
        for signal in selected {
            frame.insert(signal, self.dispatcher.snapshot_handlers(signal));
        }

        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        frames.push(frame);
        let depth = frames.len();
        debug!(depth, "trap stack frame pushed");
        Ok(depth)
    }

    /// Restore the most recent frame and discard it. Popping with no
    /// pushed frame is a hard error. Returns the remaining depth.
    pub fn pop(&self, signals: &[&str]) -> Result<usize, SignalError> {
        let (frame, depth) = {
            let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
            let frame = frames.pop().ok_or(SignalError::EmptyTrapStack)?;
            (frame, frames.len())
        };

        // The frame is restored wholesale; tokens only widen the request
        // and anything not recorded at push time is flagged.
        for token in signals {
            match Signal::parse(token) {
                Ok(signal) if frame.contains_key(&signal) => {}
                Ok(signal) => {
                    warn!(signal = %signal, "pop requested a signal the frame never recorded")
                }
                Err(err) => warn!(signal = %token, %err, "skipping unknown signal in pop"),
            }
        }
        for (signal, handlers) in frame {
            self.dispatcher.restore_snapshot(signal, handlers);
        }
        debug!(depth, "trap stack frame popped");
        Ok(depth)
    }

    /// Alias for [`TrapStack::push`], for bracketed usage.
    pub fn scope_begin(&self, signals: &[&str]) -> Result<usize, SignalError> {
        self.push(signals)
    }

    /// Alias for [`TrapStack::pop`], for bracketed usage.
    pub fn scope_end(&self, signals: &[&str]) -> Result<usize, SignalError> {
        self.pop(signals)
    }

    fn select(&self, signals: &[&str]) -> Vec<Signal> {
        if signals.is_empty() {
            return self.dispatcher.initialized_signals();
        }
        let mut selected = Vec::with_capacity(signals.len());
        for token in signals {
            match Signal::parse(token) {
                Ok(signal) => selected.push(signal),
                Err(err) => warn!(signal = %token, %err, "skipping unknown signal in push"),
            }
        }
        selected
    }

    /// Drop every frame (test-harness reset).
    pub fn reset(&self) {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl std::fmt::Debug for TrapStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrapStack")
            .field("depth", &self.depth())
            .finish()
    }
}
