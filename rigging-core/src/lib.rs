//! Shared callable model for the rigging lifecycle framework.
//!
//! Both subsystems of the framework — the signal dispatcher and the hook
//! engine — execute units of user logic that are registered under a stable
//! string name and invoked with positional arguments, the last recorded
//! process exit status, and a pair of output handles. This crate owns that
//! common ground:
//!
//! - [`Callable`] - object-safe async unit of user logic
//! - [`CallableRegistry`] - name-to-callable resolution
//! - [`StdioHandles`] - line-oriented output handles, either captured into
//!   channels or passed through to the host's own stdout/stderr

mod callable;
mod registry;
mod stdio;

pub use callable::*;
pub use registry::*;
pub use stdio::*;
