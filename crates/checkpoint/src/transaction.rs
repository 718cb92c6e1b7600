//! Transactional rename emulation for hosts whose replace is not atomic
//!
//! The transaction facility is resolved lazily, at most once per
//! [`TransactionCapability`], and the outcome is cached for the lifetime of
//! the value. When it cannot be resolved the strategy degrades permanently to
//! its non-transactional fallback.

use runtime_core::{RenameError, TransactionStep};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::strategy::RenameStrategy;

/// Description attached to every rename transaction
pub const TRANSACTION_DESCRIPTION: &str = "AtomicFileRenameTransaction";

/// Raw handle of an open transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle(pub isize);

/// Host transaction manager entry points
pub trait TransactionFacility: Send + Sync {
    /// Open a named transaction
    fn create(&self, description: &str) -> io::Result<TxHandle>;

    /// Enqueue a move-with-replace inside the transaction
    fn move_file(&self, tx: TxHandle, from: &Path, to: &Path) -> io::Result<()>;

    /// Commit every operation enqueued in the transaction
    fn commit(&self, tx: TxHandle) -> io::Result<()>;

    /// Release the transaction handle
    fn close(&self, tx: TxHandle) -> io::Result<()>;
}

/// Resolver for the transaction facility
pub type TransactionProbe =
    Box<dyn Fn() -> Result<Arc<dyn TransactionFacility>, RenameError> + Send + Sync>;

/// Memoized answer to "can renames run inside a transaction here"
pub struct TransactionCapability {
    probe: TransactionProbe,
    resolved: OnceLock<Option<Arc<dyn TransactionFacility>>>,
}

impl TransactionCapability {
    /// Create a capability that resolves with `probe` on first use
    pub fn new<F>(probe: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TransactionFacility>, RenameError> + Send + Sync + 'static,
    {
        Self {
            probe: Box::new(probe),
            resolved: OnceLock::new(),
        }
    }

    /// Capability that is never available
    pub fn unavailable() -> Self {
        Self::new(|| {
            Err(RenameError::TransactionUnavailable {
                reason: "no transaction facility on this host".to_string(),
            })
        })
    }

    /// The resolved facility, running the probe if this is the first use
    pub fn facility(&self) -> Option<&Arc<dyn TransactionFacility>> {
        self.resolved
            .get_or_init(|| match (self.probe)() {
                Ok(facility) => {
                    info!("Transactional rename available");
                    Some(facility)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Falling back to non-transactional replace; commits are not atomic if interrupted"
                    );
                    None
                }
            })
            .as_ref()
    }

    /// Whether the facility resolved
    pub fn is_available(&self) -> bool {
        self.facility().is_some()
    }

    /// Whether the probe has already run
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl fmt::Debug for TransactionCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCapability")
            .field("resolved", &self.resolved.get().map(|f| f.is_some()))
            .finish()
    }
}

/// Open transaction, closed on every exit path
struct Transaction<'a> {
    facility: &'a dyn TransactionFacility,
    handle: TxHandle,
    closed: bool,
}

impl<'a> Transaction<'a> {
    fn begin(facility: &'a dyn TransactionFacility) -> Result<Self, RenameError> {
        let handle = facility
            .create(TRANSACTION_DESCRIPTION)
            .map_err(|source| step_failed(TransactionStep::Create, source))?;
        Ok(Self {
            facility,
            handle,
            closed: false,
        })
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), RenameError> {
        self.facility
            .move_file(self.handle, from, to)
            .map_err(|source| step_failed(TransactionStep::Move, source))
    }

    fn commit(&self) -> Result<(), RenameError> {
        self.facility
            .commit(self.handle)
            .map_err(|source| step_failed(TransactionStep::Commit, source))
    }

    fn close(mut self) -> Result<(), RenameError> {
        self.closed = true;
        self.facility
            .close(self.handle)
            .map_err(|source| step_failed(TransactionStep::Close, source))
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.facility.close(self.handle) {
                warn!(error = %e, "Failed to close abandoned rename transaction");
            }
        }
    }
}

fn step_failed(step: TransactionStep, source: io::Error) -> RenameError {
    RenameError::TransactionStepFailed { step, source }
}

/// Rename inside a host transaction, or through `fallback` when the
/// facility is unavailable
pub struct TransactionalReplace<S> {
    capability: TransactionCapability,
    fallback: S,
}

impl<S: RenameStrategy> TransactionalReplace<S> {
    pub fn new(capability: TransactionCapability, fallback: S) -> Self {
        Self {
            capability,
            fallback,
        }
    }

    pub fn capability(&self) -> &TransactionCapability {
        &self.capability
    }

    fn rename_transacted(
        facility: &dyn TransactionFacility,
        from: &Path,
        to: &Path,
    ) -> Result<(), RenameError> {
        let tx = Transaction::begin(facility)?;
        tx.move_file(from, to)?;
        tx.commit()?;
        tx.close()
    }
}

impl<S: RenameStrategy> RenameStrategy for TransactionalReplace<S> {
    fn name(&self) -> &'static str {
        "transactional"
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), RenameError> {
        match self.capability.facility() {
            Some(facility) => {
                debug!(from = %from.display(), to = %to.display(), "Transactional rename");
                Self::rename_transacted(facility.as_ref(), from, to)
            }
            None => self.fallback.rename(from, to),
        }
    }
}
