//! Single-attempt rename strategies
//!
//! A strategy performs exactly one replace of `to` by `from`. Retrying is the
//! job of [`crate::RetryPolicy`].

use runtime_core::RenameError;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// One attempt at replacing a checkpoint file
pub trait RenameStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Replace `to` with `from`, removing `from`
    fn rename(&self, from: &Path, to: &Path) -> Result<(), RenameError>;
}

/// Host rename, atomic for same-volume replace on POSIX filesystems
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRename;

impl RenameStrategy for NativeRename {
    fn name(&self) -> &'static str {
        "native"
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), RenameError> {
        trace!(from = %from.display(), to = %to.display(), "Native rename");
        std::fs::rename(from, to).map_err(|e| classify_io_error(from, to, e))
    }
}

/// Strategy used by the process-wide engine on this host
pub fn platform_strategy() -> Arc<dyn RenameStrategy> {
    #[cfg(windows)]
    {
        Arc::new(crate::transaction::TransactionalReplace::new(
            crate::transaction::TransactionCapability::new(crate::windows::resolve_ktm),
            crate::windows::ReplaceFallback,
        ))
    }

    #[cfg(not(windows))]
    {
        Arc::new(NativeRename)
    }
}

/// Map a failed host move onto the rename taxonomy
pub(crate) fn classify_io_error(from: &Path, to: &Path, error: io::Error) -> RenameError {
    if is_cross_device(&error) {
        RenameError::CrossDevice {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        }
    } else {
        RenameError::NativeMoveFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: error,
        }
    }
}

fn is_cross_device(error: &io::Error) -> bool {
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(libc::EXDEV)
    }

    #[cfg(windows)]
    {
        error.raw_os_error() == Some(windows_sys::Win32::Foundation::ERROR_NOT_SAME_DEVICE as i32)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = error;
        false
    }
}
