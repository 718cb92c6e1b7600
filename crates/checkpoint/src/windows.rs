//! Windows rename support
//!
//! `MoveFileEx` with replace-existing is not atomic, so renames go through
//! the Kernel Transaction Manager when it is present (Vista and later). Its
//! entry points are resolved at runtime so the binary still starts on hosts
//! without `KtmW32.dll`.

use runtime_core::RenameError;
use std::ffi::c_void;
use std::io;
use std::iter;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::Arc;
use tracing::trace;
use windows_sys::Win32::Foundation::{CloseHandle, BOOL, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{
    MoveFileExW, MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH,
};
use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryA};

use crate::strategy::{classify_io_error, RenameStrategy};
use crate::transaction::{TransactionFacility, TxHandle};

type CreateTransactionFn = unsafe extern "system" fn(
    *mut c_void,
    *mut c_void,
    u32,
    u32,
    u32,
    u32,
    *mut u16,
) -> HANDLE;

type CommitTransactionFn = unsafe extern "system" fn(HANDLE) -> BOOL;

type MoveFileTransactedFn = unsafe extern "system" fn(
    *const u16,
    *const u16,
    *const c_void,
    *const c_void,
    u32,
    HANDLE,
) -> BOOL;

/// Kernel Transaction Manager entry points
struct KtmFacility {
    create_transaction: CreateTransactionFn,
    commit_transaction: CommitTransactionFn,
    move_file_transacted: MoveFileTransactedFn,
}

impl TransactionFacility for KtmFacility {
    fn create(&self, description: &str) -> io::Result<TxHandle> {
        let mut description: Vec<u16> = description.encode_utf16().chain(iter::once(0)).collect();
        // SAFETY: pointer arguments are null or point to a NUL-terminated buffer that
        // outlives the call.
        let handle = unsafe {
            (self.create_transaction)(
                ptr::null_mut(),
                ptr::null_mut(),
                0,
                0,
                0,
                0,
                description.as_mut_ptr(),
            )
        };
        if handle.is_null() || handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        Ok(TxHandle(handle as isize))
    }

    fn move_file(&self, tx: TxHandle, from: &Path, to: &Path) -> io::Result<()> {
        let from = wide_path(from);
        let to = wide_path(to);
        // SAFETY: both paths are NUL-terminated and `tx` is an open transaction.
        let ok = unsafe {
            (self.move_file_transacted)(
                from.as_ptr(),
                to.as_ptr(),
                ptr::null(),
                ptr::null(),
                MOVEFILE_REPLACE_EXISTING,
                tx.0 as HANDLE,
            )
        };
        check(ok)
    }

    fn commit(&self, tx: TxHandle) -> io::Result<()> {
        // SAFETY: `tx` is an open transaction.
        check(unsafe { (self.commit_transaction)(tx.0 as HANDLE) })
    }

    fn close(&self, tx: TxHandle) -> io::Result<()> {
        // SAFETY: `tx` is open and is closed exactly once by its owner.
        check(unsafe { CloseHandle(tx.0 as HANDLE) })
    }
}

/// Resolve the transaction entry points from `KtmW32.dll` and `Kernel32.dll`
pub(crate) fn resolve_ktm() -> Result<Arc<dyn TransactionFacility>, RenameError> {
    // SAFETY: library and symbol names are NUL-terminated; each resolved symbol
    // is cast to its documented signature.
    unsafe {
        let kernel32 = LoadLibraryA(b"Kernel32.dll\0".as_ptr());
        if kernel32.is_null() {
            return Err(unavailable("could not load Kernel32.dll"));
        }

        let ktm = LoadLibraryA(b"KtmW32.dll\0".as_ptr());
        if ktm.is_null() {
            return Err(unavailable("could not load KtmW32.dll"));
        }

        let create = GetProcAddress(ktm, b"CreateTransaction\0".as_ptr());
        let commit = GetProcAddress(ktm, b"CommitTransaction\0".as_ptr());
        let move_file = GetProcAddress(kernel32, b"MoveFileTransactedW\0".as_ptr());

        match (create, commit, move_file) {
            (Some(create), Some(commit), Some(move_file)) => Ok(Arc::new(KtmFacility {
                create_transaction: std::mem::transmute::<_, CreateTransactionFn>(create),
                commit_transaction: std::mem::transmute::<_, CommitTransactionFn>(commit),
                move_file_transacted: std::mem::transmute::<_, MoveFileTransactedFn>(move_file),
            })),
            _ => Err(unavailable("failed to get transaction functions")),
        }
    }
}

/// Best-effort replace used when transactions are unavailable
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ReplaceFallback;

impl RenameStrategy for ReplaceFallback {
    fn name(&self) -> &'static str {
        "replace-fallback"
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), RenameError> {
        trace!(from = %from.display(), to = %to.display(), "MoveFileEx replace");
        let wide_from = wide_path(from);
        let wide_to = wide_path(to);
        // SAFETY: both paths are NUL-terminated.
        let ok = unsafe {
            MoveFileExW(
                wide_from.as_ptr(),
                wide_to.as_ptr(),
                MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
            )
        };
        check(ok).map_err(|e| classify_io_error(from, to, e))
    }
}

fn wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(iter::once(0)).collect()
}

fn check(ok: BOOL) -> io::Result<()> {
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn unavailable(reason: &str) -> RenameError {
    RenameError::TransactionUnavailable {
        reason: format!("{}: {}", reason, io::Error::last_os_error()),
    }
}
