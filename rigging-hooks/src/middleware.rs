//! Output middleware.
//!
//! After the capture runner drains an implementation's output, the hook's
//! active middleware decides what to re-emit on the host's own streams and
//! whether to react to embedded contract directives.

use std::io::Write;

use tracing::error;

use crate::capture::CaptureBuffer;
use crate::capture::CapturedLine;
use crate::capture::StreamOrigin;
use crate::contract::DIRECTIVE_PREFIX;
use crate::contract::FlowController;

/// Consumes a capture buffer plus the implementation's exit status and
/// decides what the host observes.
pub trait Middleware: Send + Sync {
    fn process(
        &self,
        hook: &str,
        buffer: &CaptureBuffer,
        status: i32,
        flow: &FlowController,
    ) -> i32;
}

fn reemit(line: &CapturedLine) {
    match line.origin {
        StreamOrigin::Stdout => {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line.text);
        }
        StreamOrigin::Stderr => {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line.text);
        }
    }
}

/// Transparent passthrough: every captured line is re-emitted on the
/// stream it came from and the exit status is returned unchanged.
#[derive(Debug, Default)]
pub struct PassthroughMiddleware;

impl Middleware for PassthroughMiddleware {
    fn process(
        &self,
        _hook: &str,
        buffer: &CaptureBuffer,
        status: i32,
        _flow: &FlowController,
    ) -> i32 {
        for line in &buffer.lines {
            reemit(line);
        }
        status
    }
}

/// Passthrough plus the contract protocol: stdout lines carrying the
/// directive prefix are consumed and handed to the flow controller instead
/// of being re-emitted. Directives on stderr are not honored and pass
/// through as ordinary output. A malformed directive is reported and the
/// hook carries on.
#[derive(Debug, Default)]
pub struct ContractMiddleware;

impl Middleware for ContractMiddleware {
    fn process(
        &self,
        hook: &str,
        buffer: &CaptureBuffer,
        status: i32,
        flow: &FlowController,
    ) -> i32 {
        for line in &buffer.lines {
            if line.origin == StreamOrigin::Stdout && line.text.starts_with(DIRECTIVE_PREFIX) {
                if let Err(err) = flow.handle_directive(&line.text) {
                    error!(hook = %hook, %err, "bad contract directive");
                }
                continue;
            }
            reemit(line);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvOverlay;
    use std::sync::Arc;

    fn buffer(lines: &[(StreamOrigin, &str)]) -> CaptureBuffer {
        CaptureBuffer {
            lines: lines
                .iter()
                .map(|(origin, text)| CapturedLine {
                    origin: *origin,
                    text: (*text).to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn passthrough_returns_status_unchanged() {
        let flow = FlowController::new(Arc::new(EnvOverlay::new()));
        let buf = buffer(&[
            (StreamOrigin::Stdout, "a"),
            (StreamOrigin::Stderr, "b"),
        ]);
        assert_eq!(PassthroughMiddleware.process("h", &buf, 5, &flow), 5);
        // Passthrough never touches the flow state, even for directives.
        let buf = buffer(&[(StreamOrigin::Stdout, "contract:exit:3")]);
        PassthroughMiddleware.process("h", &buf, 0, &flow);
        assert!(!flow.pending().terminate);
    }

    #[test]
    fn contract_middleware_consumes_stdout_directives() {
        let env = Arc::new(EnvOverlay::new());
        let flow = FlowController::new(Arc::clone(&env));
        let buf = buffer(&[
            (StreamOrigin::Stdout, "ordinary"),
            (StreamOrigin::Stdout, "contract:env:RIGGING_MW_TEST=1"),
            (StreamOrigin::Stdout, "contract:exit:9"),
        ]);

        assert_eq!(ContractMiddleware.process("h", &buf, 2, &flow), 2);
        assert_eq!(env.get("RIGGING_MW_TEST").as_deref(), Some("1"));
        let pending = flow.pending();
        assert!(pending.terminate);
        assert_eq!(pending.exit_code, Some(9));
    }

    #[test]
    fn stderr_directives_are_not_honored() {
        let flow = FlowController::new(Arc::new(EnvOverlay::new()));
        let buf = buffer(&[(StreamOrigin::Stderr, "contract:exit:9")]);

        ContractMiddleware.process("h", &buf, 0, &flow);
        assert!(!flow.pending().terminate);
    }

    #[test]
    fn malformed_directive_does_not_abort_processing() {
        let env = Arc::new(EnvOverlay::new());
        let flow = FlowController::new(Arc::clone(&env));
        let buf = buffer(&[
            (StreamOrigin::Stdout, "contract:bogus:x"),
            (StreamOrigin::Stdout, "contract:env:RIGGING_MW_AFTER=yes"),
        ]);

        assert_eq!(ContractMiddleware.process("h", &buf, 0, &flow), 0);
        assert_eq!(env.get("RIGGING_MW_AFTER").as_deref(), Some("yes"));
    }
}
