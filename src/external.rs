//! Resolution of external program names and exit-status translation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use crate::command::ExitCode;
use crate::env::Environment;

/// Resolve a command name to an executable path the way a shell would.
///
/// Behavior:
/// - Absolute path: returned when it names an executable file.
/// - Name containing a separator (e.g. `bin/tool`, `./script`): taken
///   relative to the session working directory.
/// - Bare name: each directory of the session `PATH` is searched in order
///   and the first executable match wins.
///
/// Returns `None` when nothing executable is found.
pub fn resolve_program(env: &Environment, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return is_executable(path).then(|| path.to_path_buf());
    }

    if name.contains('/') {
        let candidate = env.current_dir.join(path);
        return is_executable(&candidate).then_some(candidate);
    }

    let search_paths = env.get_var("PATH")?;
    for dir in std::env::split_paths(&search_paths) {
        let candidate = if dir.is_absolute() {
            dir.join(name)
        } else {
            env.current_dir.join(dir).join(name)
        };
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Translate a child's wait status into a shell exit code.
pub fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    match ExitStatusExt::signal(&status) {
        Some(signal) => 128 + signal,
        None => -1,
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_status: ExitStatus) -> ExitCode {
    -1
}
