//! Executable resolution for the programs a session launches.

use std::path::{Path, PathBuf};

/// Resolve an executable by name.
///
/// The search order is:
/// 1. Explicit paths (absolute or containing a separator), accepted only if
///    they point at a file.
/// 2. The current process PATH via `which`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    match explicit_path(executable)? {
        Lookup::Explicit(found) => found,
        Lookup::Search(name) => which_async(name).await,
    }
}

/// Blocking version of `resolve_executable_path`.
#[must_use]
pub fn resolve_executable_path_blocking(executable: &str) -> Option<PathBuf> {
    match explicit_path(executable)? {
        Lookup::Explicit(found) => found,
        Lookup::Search(name) => which::which(name).ok(),
    }
}

enum Lookup<'a> {
    Explicit(Option<PathBuf>),
    Search(&'a str),
}

fn explicit_path(executable: &str) -> Option<Lookup<'_>> {
    let executable = executable.trim();
    if executable.is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() || path.components().count() > 1 {
        let found = path.is_file().then(|| path.to_path_buf());
        return Some(Lookup::Explicit(found));
    }
    Some(Lookup::Search(executable))
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    let found = tokio::task::spawn_blocking(move || which::which(&executable))
        .await
        .ok()
        .and_then(Result::ok);
    if found.is_none() {
        tracing::debug!("Executable not found on PATH");
    }
    found
}
