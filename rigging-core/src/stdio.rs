//! Line-oriented output handles handed to in-process callables.

use std::io::Write;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;
use tracing::debug;

/// Where a single output line ends up.
#[derive(Debug, Clone)]
enum LineSink {
    /// Captured into a channel drained by a reader task.
    Channel(UnboundedSender<String>),
    /// Forwarded to the host's own stdout.
    HostStdout,
    /// Forwarded to the host's own stderr.
    HostStderr,
}

impl LineSink {
    fn emit(&self, line: String) {
        match self {
            LineSink::Channel(tx) => {
                // The reader side is gone once capture has been drained;
                // late writers lose their output rather than erroring.
                if tx.send(line).is_err() {
                    debug!("output line dropped: capture channel closed");
                }
            }
            LineSink::HostStdout => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{line}");
            }
            LineSink::HostStderr => {
                let mut err = std::io::stderr().lock();
                let _ = writeln!(err, "{line}");
            }
        }
    }
}

/// The two output handles of one callable invocation.
///
/// Cloneable so a callable can hand them to helpers; all clones feed the
/// same destination.
#[derive(Debug, Clone)]
pub struct StdioHandles {
    out: LineSink,
    err: LineSink,
}

impl StdioHandles {
    /// Handles wired to fresh capture channels, plus the matching
    /// receivers for the two reader tasks.
    pub fn captured() -> (Self, UnboundedReceiver<String>, UnboundedReceiver<String>) {
        let (out_tx, out_rx) = unbounded_channel();
        let (err_tx, err_rx) = unbounded_channel();
        let handles = Self {
            out: LineSink::Channel(out_tx),
            err: LineSink::Channel(err_tx),
        };
        (handles, out_rx, err_rx)
    }

    /// Handles that forward straight to the host's stdout/stderr.
    ///
    /// Used for signal handlers and embedded-mode execution, which bypass
    /// capture entirely.
    pub fn passthrough() -> Self {
        Self {
            out: LineSink::HostStdout,
            err: LineSink::HostStderr,
        }
    }

    /// Emit one line on the callable's stdout.
    pub fn out_line(&self, line: impl Into<String>) {
        self.out.emit(line.into());
    }

    /// Emit one line on the callable's stderr.
    pub fn err_line(&self, line: impl Into<String>) {
        self.err.emit(line.into());
    }
}
