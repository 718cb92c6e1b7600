//! Runtime Core - Foundation for the checkpointing science client
//!
//! Provides the error taxonomy, configuration and logging bootstrap shared
//! by the checkpoint commit engine and the project preference parser.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CheckpointConfig, PreferenceConfig, RetryConfig, RuntimeConfig};
pub use error::{Error, PrefError, RenameError, Result, TransactionStep};
pub use logging::init_tracing;
