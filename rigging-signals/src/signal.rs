//! Signal name canonicalization.

use std::fmt;
use std::str::FromStr;

use crate::error::SignalError;

/// Canonical identity of a trappable signal.
///
/// `Exit` is the synthetic end-of-process signal: it has no OS trap and is
/// delivered by the runtime's finalizer instead of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    Exit,
    Hup,
    Int,
    Quit,
    Usr1,
    Usr2,
    Pipe,
    Alrm,
    Term,
    Chld,
    Winch,
}

/// Every signal the framework knows, in numeric order.
pub const ALL_SIGNALS: [Signal; 11] = [
    Signal::Exit,
    Signal::Hup,
    Signal::Int,
    Signal::Quit,
    Signal::Usr1,
    Signal::Usr2,
    Signal::Pipe,
    Signal::Alrm,
    Signal::Term,
    Signal::Chld,
    Signal::Winch,
];

impl Signal {
    /// Canonical upper-case name without the `SIG` prefix.
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Exit => "EXIT",
            Signal::Hup => "HUP",
            Signal::Int => "INT",
            Signal::Quit => "QUIT",
            Signal::Usr1 => "USR1",
            Signal::Usr2 => "USR2",
            Signal::Pipe => "PIPE",
            Signal::Alrm => "ALRM",
            Signal::Term => "TERM",
            Signal::Chld => "CHLD",
            Signal::Winch => "WINCH",
        }
    }

    /// Signal number per the Linux table; `Exit` is the synthetic `0`.
    pub fn number(&self) -> i32 {
        match self {
            Signal::Exit => 0,
            Signal::Hup => 1,
            Signal::Int => 2,
            Signal::Quit => 3,
            Signal::Usr1 => 10,
            Signal::Usr2 => 12,
            Signal::Pipe => 13,
            Signal::Alrm => 14,
            Signal::Term => 15,
            Signal::Chld => 17,
            Signal::Winch => 28,
        }
    }

    fn from_number(number: i32) -> Option<Self> {
        ALL_SIGNALS.iter().copied().find(|s| s.number() == number)
    }

    fn from_name(name: &str) -> Option<Self> {
        ALL_SIGNALS.iter().copied().find(|s| s.name() == name)
    }

    /// Parse a signal token: canonical name, `SIG`-prefixed or lower-case
    /// variant, or numeric code (`0` maps to [`Signal::Exit`]).
    pub fn parse(token: &str) -> Result<Self, SignalError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SignalError::UnknownSignal(token.to_string()));
        }

        if token.chars().all(|c| c.is_ascii_digit()) {
            let number: i32 = token
                .parse()
                .map_err(|_| SignalError::UnknownSignal(token.to_string()))?;
            return Self::from_number(number)
                .ok_or_else(|| SignalError::UnknownSignal(token.to_string()));
        }

        let upper = token.to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        Self::from_name(bare).ok_or_else(|| SignalError::UnknownSignal(token.to_string()))
    }

    /// The tokio signal kind carrying this signal's OS delivery, when one
    /// exists. `Exit` has none.
    #[cfg(unix)]
    pub fn kind(&self) -> Option<tokio::signal::unix::SignalKind> {
        use tokio::signal::unix::SignalKind;
        match self {
            Signal::Exit => None,
            Signal::Hup => Some(SignalKind::hangup()),
            Signal::Int => Some(SignalKind::interrupt()),
            Signal::Quit => Some(SignalKind::quit()),
            Signal::Usr1 => Some(SignalKind::user_defined1()),
            Signal::Usr2 => Some(SignalKind::user_defined2()),
            Signal::Pipe => Some(SignalKind::pipe()),
            Signal::Alrm => Some(SignalKind::alarm()),
            Signal::Term => Some(SignalKind::terminate()),
            Signal::Chld => Some(SignalKind::child()),
            Signal::Winch => Some(SignalKind::window_change()),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Signal {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
