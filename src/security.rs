//! File permissions for per-user data
//!
//! User settings and the recent-files list live in the user's config
//! directory and may name private paths. On Unix the directory is made
//! owner-only (0o700) and the files owner read/write (0o600). Elsewhere these
//! helpers only create the directory.

use crate::error::{Error, Result};
use std::path::Path;

/// Restrict a file to owner read/write.
///
/// # Errors
///
/// Returns an error if the file metadata cannot be read or the permissions
/// cannot be changed.
#[cfg(unix)]
pub fn set_private_file_permissions(path: &Path) -> Result<()> {
    set_mode(path, 0o600)
}

/// Restrict a directory to the owner.
///
/// # Errors
///
/// Returns an error if the directory metadata cannot be read or the
/// permissions cannot be changed.
#[cfg(unix)]
pub fn set_private_dir_permissions(path: &Path) -> Result<()> {
    set_mode(path, 0o700)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?
        .permissions();
    perms.set_mode(mode);

    std::fs::set_permissions(path, perms).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(not(unix))]
pub fn set_private_file_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub fn set_private_dir_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Create `path` (and parents) if needed, then make it owner-only.
///
/// Existing directories keep their permissions.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or secured.
pub fn ensure_private_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| Error::DirectoryCreate {
        path: path.to_path_buf(),
        source: e,
    })?;
    set_private_dir_permissions(path)
}
