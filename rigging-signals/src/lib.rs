//! Multiplexed signal dispatch for the rigging lifecycle framework.
//!
//! An operating system offers exactly one trap slot per signal. This crate
//! multiplexes that slot across an ordered list of named handlers while
//! preserving whatever handler existed before the framework took over:
//!
//! - [`Signal`] - canonical signal identity, parsed from names, `SIG`-prefixed
//!   or lower-case variants, and numeric codes (`0` is the synthetic
//!   end-of-process signal [`Signal::Exit`])
//! - [`TrapTable`] - the single-slot-per-signal seam a pre-existing handler
//!   lives in
//! - [`SignalDispatcher`] - ordered handler lists per signal; on delivery the
//!   legacy handler runs first, then every registered handler in registration
//!   order, and the originally captured exit status is preserved
//! - [`TrapStack`] - push/pop snapshots of the handler lists for scoped
//!   temporary handler sets

mod dispatcher;
mod error;
mod signal;
mod stack;
mod traps;

pub use dispatcher::*;
pub use error::*;
pub use signal::*;
pub use stack::*;
pub use traps::*;
