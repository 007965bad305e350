//! Filesystem primitives used by the orchestrator.

use std::io;
use std::path::Path;

use log::{debug, warn};
use tokio::fs;

/// EXDEV
#[cfg(unix)]
const CROSS_DEVICE_ERROR: i32 = 18;
/// ERROR_NOT_SAME_DEVICE
#[cfg(windows)]
const CROSS_DEVICE_ERROR: i32 = 17;

fn is_cross_device(e: &io::Error) -> bool {
    #[cfg(any(unix, windows))]
    {
        e.raw_os_error() == Some(CROSS_DEVICE_ERROR)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

/// Whether something exists at `path`. Errors count as "does not exist".
pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Create `path` and its parents. Existing directories are fine.
pub async fn make_directories(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await
}

/// Move a file, copying across filesystems when a rename is not possible.
pub async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("Cross-device move, copying {} to {}", from.display(), to.display());
            copy_then_remove(from, to).await
        }
        Err(e) => Err(e),
    }
}

/// Copy `from` to `to`, then delete `from`. A failed copy leaves no `to`.
pub(crate) async fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(from, to).await {
        match fs::remove_file(to).await {
            Ok(()) => {}
            Err(cleanup) if cleanup.kind() == io::ErrorKind::NotFound => {}
            Err(cleanup) => warn!("Failed to remove partial copy {}: {}", to.display(), cleanup),
        }
        return Err(e);
    }
    fs::remove_file(from).await
}
