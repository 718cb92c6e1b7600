//! Checkpoint commit for long-running simulations
//!
//! Replaces a previous checkpoint with a newly written one so that a reader
//! observes either the complete old file or the complete new file, at any
//! point the process may be killed. Transient failures (files briefly locked
//! by backup or antivirus agents, slow network filesystems) are retried with
//! bounded, randomized backoff.
//!
//! # Example
//!
//! ```no_run
//! use checkpoint::{commit_checkpoint, CheckpointWriter};
//! use std::path::Path;
//!
//! # fn example() -> runtime_core::Result<()> {
//! // Either write through the writer...
//! CheckpointWriter::default().write_checkpoint(Path::new("nbody.ckpt"), b"state")?;
//!
//! // ...or commit a file written elsewhere on the same volume
//! commit_checkpoint("nbody.ckpt.tmp", "nbody.ckpt")?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod retry;
pub mod strategy;
pub mod transaction;
pub mod writer;

#[cfg(windows)]
mod windows;

pub use engine::{commit_checkpoint, commit_checkpoint_async, CommitEngine, CommitEngineHandle};
pub use retry::RetryPolicy;
pub use strategy::{platform_strategy, NativeRename, RenameStrategy};
pub use transaction::{
    TransactionCapability, TransactionFacility, TransactionProbe, TransactionalReplace, TxHandle,
    TRANSACTION_DESCRIPTION,
};
pub use writer::CheckpointWriter;
