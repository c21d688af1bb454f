//! The capture runner.
//!
//! Executes one hook implementation with its two output streams redirected
//! into capture channels. Two concurrent reader tasks drain the channels,
//! tagging every line with its origin stream and appending to one shared
//! ordered buffer. Ordering within a stream is preserved; interleaving
//! between the streams is best-effort.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;

use rigging_core::Callable;
use rigging_core::Invocation;
use rigging_core::StdioHandles;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::error::HookError;

/// Which stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

/// One captured line, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLine {
    pub origin: StreamOrigin,
    pub text: String,
}

/// The ordered, stream-tagged record of one implementation's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureBuffer {
    pub lines: Vec<CapturedLine>,
}

impl CaptureBuffer {
    pub fn stdout_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.origin == StreamOrigin::Stdout)
            .map(|l| l.text.as_str())
            .collect()
    }

    pub fn stderr_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.origin == StreamOrigin::Stderr)
            .map(|l| l.text.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

type SharedLines = Arc<Mutex<Vec<CapturedLine>>>;

fn push_line(lines: &SharedLines, origin: StreamOrigin, text: String) {
    lines
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(CapturedLine { origin, text });
}

fn drain_channel(
    mut rx: UnboundedReceiver<String>,
    origin: StreamOrigin,
    lines: SharedLines,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            push_line(&lines, origin, text);
        }
    })
}

fn drain_stream(
    stream: impl AsyncRead + Unpin + Send + 'static,
    origin: StreamOrigin,
    lines: SharedLines,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream).lines();
        loop {
            match reader.next_line().await {
                Ok(Some(text)) => push_line(&lines, origin, text),
                Ok(None) => break,
                Err(err) => {
                    warn!(?origin, %err, "capture read error");
                    break;
                }
            }
        }
    })
}

async fn join_readers(out_task: JoinHandle<()>, err_task: JoinHandle<()>) {
    for task in [out_task, err_task] {
        if let Err(err) = task.await {
            warn!(%err, "capture reader task failed");
        }
    }
}

fn take_lines(lines: SharedLines) -> Vec<CapturedLine> {
    match Arc::try_unwrap(lines) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
        // A reader leaked its handle; fall back to copying.
        Err(shared) => shared.lock().unwrap_or_else(|e| e.into_inner()).clone(),
    }
}

/// Run an in-process callable with captured output.
///
/// Returns the callable's exit status and the filled buffer. The capture
/// channels live only for this call and are torn down before it returns.
pub async fn run_captured(
    label: &str,
    callable: Arc<dyn Callable>,
    args: Vec<String>,
    status: i32,
) -> Result<(i32, CaptureBuffer), HookError> {
    let (io, out_rx, err_rx) = StdioHandles::captured();
    let lines: SharedLines = Arc::new(Mutex::new(Vec::new()));

    let out_task = drain_channel(out_rx, StreamOrigin::Stdout, Arc::clone(&lines));
    let err_task = drain_channel(err_rx, StreamOrigin::Stderr, Arc::clone(&lines));

    debug!(label = %label, "running captured callable");
    let exit_status = callable.call(Invocation { args, status, io }).await;

    // The invocation owned the only senders; once the call future is done
    // the channels close and both readers drain to completion.
    join_readers(out_task, err_task).await;

    Ok((exit_status, CaptureBuffer { lines: take_lines(lines) }))
}

/// Run an external implementation as a captured subprocess.
///
/// The child's stdout and stderr are piped through the same two-reader
/// scheme as in-process callables; `envs` is the environment overlay
/// exported to the child. A missing exit code maps to 1.
pub async fn run_captured_command(
    program: &Path,
    args: &[String],
    envs: Vec<(String, String)>,
) -> Result<(i32, CaptureBuffer), HookError> {
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .envs(envs)
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(HookError::SpawnFailed)?;

    let stdout = child.stdout.take().ok_or_else(|| {
        HookError::CaptureUnavailable("child stdout pipe missing".to_string())
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        HookError::CaptureUnavailable("child stderr pipe missing".to_string())
    })?;

    let lines: SharedLines = Arc::new(Mutex::new(Vec::new()));
    let out_task = drain_stream(stdout, StreamOrigin::Stdout, Arc::clone(&lines));
    let err_task = drain_stream(stderr, StreamOrigin::Stderr, Arc::clone(&lines));

    debug!(program = %program.display(), "running captured subprocess");
    let exit = child.wait().await.map_err(HookError::SpawnFailed)?;
    join_readers(out_task, err_task).await;

    let code = exit.code().unwrap_or(1);
    Ok((code, CaptureBuffer { lines: take_lines(lines) }))
}
