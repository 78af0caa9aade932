use nix::unistd::{AccessFlags, access};
use std::path::{Path, PathBuf};

/// Resolve an executable the way the interpreter's orchestrator does.
///
/// Behavior:
/// - `/abs/path` or `./relative`: returned as-is when it is executable.
/// - Any other name: each directory of `search_path` (colon separated) is joined
///   with the name in order, and the first executable candidate wins.
/// - Empty name: `None`.
pub fn find_executable(search_path: &str, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.starts_with('/') || name.starts_with("./") {
        let path = Path::new(name);
        return is_executable(path).then(|| path.to_path_buf());
    }

    search_path
        .split(':')
        .map(|dir| PathBuf::from(format!("{}/{}", dir, name)))
        .find(|candidate| is_executable(candidate))
}

/// Whether `path` names a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}
