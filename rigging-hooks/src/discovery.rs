//! External implementation discovery.
//!
//! Hook implementations may be shipped as executables in a configured
//! directory, named `{hook}-{label}` or `{hook}_{label}`. The label is the
//! implementation's sort key; glob pattern lists decide whether a file
//! runs embedded ("source") or as a captured subprocess ("exec").

use std::path::Path;
use std::path::PathBuf;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use tracing::debug;
use tracing::warn;

use crate::types::ExecMode;

/// One executable discovered in the hooks directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalImpl {
    /// Filename with the hook-name prefix and separator stripped.
    pub sort_key: String,
    pub path: PathBuf,
    pub mode: ExecMode,
}

/// Compiled execution-mode override patterns. Source patterns are
/// checked before exec patterns; neither matching falls back to the
/// executor's default mode.
#[derive(Debug)]
pub struct ModePatterns {
    source: GlobSet,
    exec: GlobSet,
}

impl ModePatterns {
    pub fn new(source: &[String], exec: &[String]) -> Self {
        Self {
            source: compile(source, "source"),
            exec: compile(exec, "exec"),
        }
    }

    pub fn empty() -> Self {
        Self::new(&[], &[])
    }

    /// Resolve the execution mode for a filename.
    pub fn mode_for(&self, file_name: &str, default: ExecMode) -> ExecMode {
        if self.source.is_match(file_name) {
            return ExecMode::Source;
        }
        if self.exec.is_match(file_name) {
            return ExecMode::Exec;
        }
        default
    }
}

fn compile(patterns: &[String], which: &str) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => {
                warn!(pattern = %pattern, which, %err, "skipping invalid mode pattern");
            }
        }
    }
    match builder.build() {
        Ok(set) => set,
        Err(err) => {
            warn!(which, %err, "mode pattern set failed to build; treating as empty");
            GlobSet::empty()
        }
    }
}

/// Strip `{hook}-` or `{hook}_` from a filename, yielding the sort key.
fn sort_key_for(file_name: &str, hook: &str) -> Option<String> {
    let rest = file_name.strip_prefix(hook)?;
    let mut chars = rest.chars();
    match chars.next() {
        Some('-') | Some('_') => Some(chars.as_str().to_string()),
        _ => None,
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Find a hook's external implementations in `dir`.
///
/// Non-recursive; only executable regular files whose name matches the
/// hook's naming pattern count. A missing directory yields no
/// implementations.
pub fn discover_external(
    dir: &Path,
    hook: &str,
    patterns: &ModePatterns,
    default_mode: ExecMode,
) -> Vec<ExternalImpl> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), %err, "hooks directory not readable; no external implementations");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(sort_key) = sort_key_for(file_name, hook) else {
            continue;
        };
        if !is_executable(&path) {
            debug!(path = %path.display(), "skipping non-executable hook file");
            continue;
        }
        let mode = patterns.mode_for(file_name, default_mode);
        debug!(path = %path.display(), sort_key = %sort_key, %mode, "external implementation discovered");
        found.push(ExternalImpl {
            sort_key,
            path,
            mode,
        });
    }
    found
}
