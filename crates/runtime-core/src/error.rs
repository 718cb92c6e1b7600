//! Error types for checkpoint commits and preference parsing

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Step of a transactional rename attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStep {
    Create,
    Move,
    Commit,
    Close,
}

impl std::fmt::Display for TransactionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStep::Create => write!(f, "create transaction"),
            TransactionStep::Move => write!(f, "enqueue move"),
            TransactionStep::Commit => write!(f, "commit transaction"),
            TransactionStep::Close => write!(f, "close transaction handle"),
        }
    }
}

/// Failure of an atomic checkpoint commit
#[derive(Error, Debug)]
pub enum RenameError {
    #[error("Checkpoint source missing: {path}")]
    SourceMissing { path: PathBuf },

    /// Informational: the engine degrades to the non-transactional replace
    #[error("Transaction facility unavailable: {reason}")]
    TransactionUnavailable { reason: String },

    #[error("Transactional rename failed to {step}: {source}")]
    TransactionStepFailed {
        step: TransactionStep,
        #[source]
        source: std::io::Error,
    },

    #[error("Rename {from:?} -> {to:?} failed: {source}")]
    NativeMoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rename {from:?} -> {to:?} crosses filesystem volumes")]
    CrossDevice { from: PathBuf, to: PathBuf },

    #[error("Rename retry budget exhausted after {attempts} attempts ({elapsed:?}): {last}")]
    RetryBudgetExhausted {
        attempts: u32,
        elapsed: Duration,
        last: Box<RenameError>,
    },
}

impl RenameError {
    /// Returns true if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RenameError::TransactionStepFailed { .. } | RenameError::NativeMoveFailed { .. }
        )
    }

    /// The error of the final attempt, unwrapping budget exhaustion
    pub fn last_attempt(&self) -> &RenameError {
        match self {
            RenameError::RetryBudgetExhausted { last, .. } => last.last_attempt(),
            other => other,
        }
    }
}

/// Failure of a preference parse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrefError {
    #[error("Preference name '{name}' too long: delimiter needs {needed} bytes, limit is {limit}")]
    DelimiterOverflow {
        name: String,
        needed: usize,
        limit: usize,
    },

    #[error("Preference '{name}' has unsupported kind {kind}")]
    UnsupportedKind { name: String, kind: String },

    #[error("{} missing, {} malformed preferences", missing.len(), malformed.len())]
    Incomplete {
        missing: Vec<String>,
        malformed: Vec<String>,
    },
}

impl PrefError {
    /// Returns true if the preference specification itself is unusable
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PrefError::Incomplete { .. })
    }

    /// Number of entries that were not filled in
    pub fn unfilled(&self) -> usize {
        match self {
            PrefError::Incomplete { missing, malformed } => missing.len() + malformed.len(),
            _ => 0,
        }
    }
}

/// Core error type for the checkpoint client runtime
#[derive(Error, Debug)]
pub enum Error {
    #[error("Checkpoint commit failed: {0}")]
    Rename(#[from] RenameError),

    #[error("Preference parse failed: {0}")]
    Preferences(#[from] PrefError),

    #[error("Checkpoint write failed: {message}")]
    CheckpointWriteFailed { message: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Rename(e) => e.is_retryable(),
            Error::CheckpointWriteFailed { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Preferences(e) => e.is_fatal(),
            Error::InvalidConfig { .. } | Error::Internal { .. } => true,
            _ => false,
        }
    }

    /// Returns a retry delay hint in milliseconds, if applicable
    pub fn retry_delay_hint_ms(&self) -> Option<u64> {
        match self {
            Error::Rename(RenameError::RetryBudgetExhausted { .. }) => Some(60_000),
            Error::Rename(e) if e.is_retryable() => Some(1000),
            Error::CheckpointWriteFailed { .. } => Some(1000),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
