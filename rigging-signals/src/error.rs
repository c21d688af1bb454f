//! Error types for the signal subsystem.

use thiserror::Error;

use crate::signal::Signal;

#[derive(Error, Debug)]
pub enum SignalError {
    /// A token did not resolve to a known signal name or number.
    #[error("unknown signal: '{0}'")]
    UnknownSignal(String),

    /// A management call was made without naming any signal.
    #[error("no signal given")]
    NoSignals,

    /// The handler name does not resolve to a registered callable.
    #[error("handler does not resolve to a callable: '{0}'")]
    UnresolvedHandler(String),

    /// The handler is already registered for this signal and duplicates
    /// are not allowed.
    #[error("handler '{handler}' is already registered for {signal}")]
    DuplicateHandler { handler: String, signal: Signal },

    /// Unregister named a handler that is not on the signal's list.
    #[error("handler '{handler}' is not registered for {signal}")]
    HandlerNotRegistered { handler: String, signal: Signal },

    /// Pop was called with no pushed trap-stack frame.
    #[error("trap stack is empty")]
    EmptyTrapStack,
}
