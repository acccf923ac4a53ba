//! Executable validation.

use std::path::Path;

/// Whether `path` names a regular file the current user could execute.
///
/// On Unix this requires at least one execute permission bit; elsewhere any
/// regular file is accepted.
pub fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
