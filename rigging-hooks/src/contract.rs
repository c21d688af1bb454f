//! The embedded contract protocol and the flow controller.
//!
//! A hook implementation influences the host by emitting directive lines
//! on its stdout. Environment directives take effect immediately;
//! route/exit directives only mark a pending flow state, which the
//! executor applies once every implementation of the hook has run — one
//! implementation's termination request never short-circuits its siblings.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;
use tracing::warn;

use crate::env::EnvOverlay;
use crate::error::HookError;

/// Reserved prefix marking a stdout line as a directive.
pub const DIRECTIVE_PREFIX: &str = "contract:";

/// Environment variable driving the log filter; mutating it through a
/// directive triggers logger reconfiguration.
pub const LOG_FILTER_ENV: &str = "RIGGING_LOG";

/// Environment mutation kinds carried by `contract:env:` directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvOp {
    /// `NAME=VALUE`
    Set,
    /// `NAME+=VALUE` - append a colon-joined segment.
    Append,
    /// `NAME^=VALUE` - prepend a colon-joined segment.
    Prepend,
    /// `NAME-=VALUE` - remove every matching colon-joined segment.
    RemoveSegment,
}

/// One parsed contract directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Env {
        name: String,
        op: EnvOp,
        value: String,
    },
    /// Run another script in the current process context before exiting.
    Route(PathBuf),
    /// Request process termination with this exit code.
    Exit(i32),
}

fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn malformed(line: &str, reason: impl Into<String>) -> HookError {
    HookError::MalformedDirective {
        line: line.to_string(),
        reason: reason.into(),
    }
}

/// Parse one stdout line as a contract directive.
///
/// The line must carry the [`DIRECTIVE_PREFIX`]; anything after the prefix
/// that does not match the grammar is a malformed-directive error, which
/// callers report without aborting the hook.
pub fn parse_directive(line: &str) -> Result<Directive, HookError> {
    let body = line
        .strip_prefix(DIRECTIVE_PREFIX)
        .ok_or_else(|| malformed(line, "missing directive prefix"))?;

    if let Some(rest) = body.strip_prefix("env:") {
        return parse_env(rest, line);
    }
    if let Some(rest) = body.strip_prefix("route:") {
        if rest.is_empty() {
            return Err(malformed(line, "empty route target"));
        }
        return Ok(Directive::Route(PathBuf::from(rest)));
    }
    if let Some(rest) = body.strip_prefix("exit:") {
        let code: i32 = rest
            .parse()
            .map_err(|_| malformed(line, "exit code is not an integer"))?;
        return Ok(Directive::Exit(code));
    }
    Err(malformed(line, "unknown directive kind"))
}

fn parse_env(rest: &str, line: &str) -> Result<Directive, HookError> {
    let Some(eq) = rest.find('=') else {
        return Err(malformed(line, "missing '=' in env directive"));
    };
    let (op, name_end) = match rest[..eq].chars().last() {
        Some('+') => (EnvOp::Append, eq - 1),
        Some('^') => (EnvOp::Prepend, eq - 1),
        Some('-') => (EnvOp::RemoveSegment, eq - 1),
        _ => (EnvOp::Set, eq),
    };
    let name = &rest[..name_end];
    if !is_valid_env_name(name) {
        return Err(malformed(line, "invalid variable name"));
    }
    Ok(Directive::Env {
        name: name.to_string(),
        op,
        value: rest[eq + 1..].to_string(),
    })
}

/// Pending process-level request accumulated by middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
    pub terminate: bool,
    pub route: Option<PathBuf>,
    pub exit_code: Option<i32>,
}

/// A termination request surfaced by [`FlowController::apply`]; the
/// process-level exit is performed by the caller of the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub code: i32,
}

type LogReloadFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Interprets contract directives and applies the pending flow state
/// after a hook's implementations have all finished.
pub struct FlowController {
    env: Arc<EnvOverlay>,
    state: Mutex<FlowState>,
    log_reload: Mutex<Option<LogReloadFn>>,
}

impl FlowController {
    pub fn new(env: Arc<EnvOverlay>) -> Self {
        Self {
            env,
            state: Mutex::new(FlowState::default()),
            log_reload: Mutex::new(None),
        }
    }

    /// Install the callback invoked when a directive mutates the log
    /// filter variable.
    pub fn set_log_reload(&self, reload: impl Fn(&str) + Send + Sync + 'static) {
        *self.log_reload.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(reload));
    }

    /// Interpret one directive line.
    ///
    /// Environment mutations apply immediately; route and exit requests
    /// only update the pending state (the last directive of each kind
    /// wins).
    pub fn handle_directive(&self, line: &str) -> Result<(), HookError> {
        match parse_directive(line)? {
            Directive::Env { name, op, value } => {
                self.env.apply(&name, op, &value);
                if name == LOG_FILTER_ENV {
                    let filter = self.env.get(LOG_FILTER_ENV).unwrap_or_default();
                    debug!(filter = %filter, "log filter changed by directive");
                    let reload = self
                        .log_reload
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .clone();
                    if let Some(reload) = reload {
                        reload(&filter);
                    }
                }
            }
            Directive::Route(target) => {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.terminate = true;
                state.route = Some(target);
            }
            Directive::Exit(code) => {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.terminate = true;
                state.exit_code = Some(code);
            }
        }
        Ok(())
    }

    /// The pending flow state, for inspection.
    pub fn pending(&self) -> FlowState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Discard any pending request.
    pub fn clear(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = FlowState::default();
    }

    /// Consume the pending state. A no-op unless terminate is marked;
    /// when marked, the route target (if any) runs in the current process
    /// context first, then the termination request is handed back with
    /// the recorded (default zero) exit code.
    pub async fn apply(&self) -> Option<Termination> {
        let state = {
            let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        if !state.terminate {
            return None;
        }

        if let Some(target) = &state.route {
            debug!(target = %target.display(), "running route target");
            let mut command = tokio::process::Command::new(target);
            command.envs(self.env.snapshot());
            match command.status().await {
                Ok(status) if !status.success() => {
                    warn!(target = %target.display(), %status, "route target failed");
                }
                Err(err) => {
                    warn!(target = %target.display(), %err, "route target could not be run");
                }
                Ok(_) => {}
            }
        }

        Some(Termination {
            code: state.exit_code.unwrap_or(0),
        })
    }
}

impl std::fmt::Debug for FlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowController")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
