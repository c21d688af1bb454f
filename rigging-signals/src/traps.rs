//! Single-trap-slot emulation.
//!
//! The OS offers one trap slot per signal. [`TrapTable`] models that slot
//! so the dispatcher can capture whatever occupied it before taking over,
//! and reinstate it on restore. A host program that wants a plain,
//! un-multiplexed trap installs it here; the dispatcher treats such an
//! entry as the signal's legacy handler.

use dashmap::DashMap;
use rigging_core::NamedCallable;

use crate::signal::Signal;

/// Occupant of one signal's trap slot.
#[derive(Debug, Clone)]
pub enum Trap {
    /// The framework's own dispatcher owns the slot.
    Dispatcher,
    /// A plain handler, installed outside the dispatcher.
    Handler(NamedCallable),
}

/// Per-signal single handler slot.
#[derive(Debug, Default)]
pub struct TrapTable {
    slots: DashMap<Signal, Trap>,
}

impl TrapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a plain handler in the slot, replacing any occupant.
    pub fn set_handler(&self, signal: Signal, handler: NamedCallable) {
        self.slots.insert(signal, Trap::Handler(handler));
    }

    /// Hand the slot to the dispatcher.
    pub fn install_dispatcher(&self, signal: Signal) {
        self.slots.insert(signal, Trap::Dispatcher);
    }

    /// Current occupant, if any.
    pub fn current(&self, signal: Signal) -> Option<Trap> {
        self.slots.get(&signal).map(|t| t.clone())
    }

    /// Whether the dispatcher currently owns the slot.
    pub fn is_dispatcher(&self, signal: Signal) -> bool {
        matches!(self.current(signal), Some(Trap::Dispatcher))
    }

    /// Empty the slot. Returns whether anything was removed.
    pub fn clear(&self, signal: Signal) -> bool {
        self.slots.remove(&signal).is_some()
    }

    /// Empty every slot.
    pub fn clear_all(&self) {
        self.slots.clear();
    }
}
