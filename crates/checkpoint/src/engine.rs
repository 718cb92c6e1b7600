//! Atomic checkpoint commit
//!
//! [`commit_checkpoint`] replaces the checkpoint at `new_path` with the file
//! at `old_path` so that a reader opening `new_path` sees either the previous
//! or the new content, never a partial file. Both paths must be on the same
//! volume; a cross-volume request fails with [`RenameError::CrossDevice`]
//! instead of degrading to copy and delete.

use runtime_core::{Error, RenameError, Result, RetryConfig};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};

use crate::retry::RetryPolicy;
use crate::strategy::{platform_strategy, RenameStrategy};

/// Rename strategy plus retry policy
pub struct CommitEngine {
    strategy: Arc<dyn RenameStrategy>,
    policy: RetryPolicy,
}

/// Thread-safe handle to a commit engine
pub type CommitEngineHandle = Arc<CommitEngine>;

static GLOBAL_ENGINE: OnceLock<CommitEngineHandle> = OnceLock::new();

impl CommitEngine {
    pub fn new(strategy: Arc<dyn RenameStrategy>, policy: RetryPolicy) -> Self {
        Self { strategy, policy }
    }

    /// Engine using this host's rename strategy
    pub fn for_platform(config: RetryConfig) -> Self {
        Self::new(platform_strategy(), config.into())
    }

    /// Process-wide engine with the default retry policy.
    ///
    /// Built on first use, so the platform strategy (and its transaction
    /// probe) is chosen once per process.
    pub fn global() -> CommitEngineHandle {
        GLOBAL_ENGINE
            .get_or_init(|| Arc::new(Self::for_platform(RetryConfig::default())))
            .clone()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Move `old_path` over `new_path`, retrying transient failures.
    ///
    /// Blocks for up to the retry budget plus one backoff interval.
    ///
    /// An attempt can fail after the move already happened (a committed
    /// transaction whose handle failed to close). Retrying then stops with
    /// [`RenameError::SourceMissing`] and `new_path` holds the new content.
    #[instrument(skip(self), fields(strategy = self.strategy.name()))]
    pub fn commit(&self, old_path: &Path, new_path: &Path) -> std::result::Result<(), RenameError> {
        check_source(old_path)?;

        let mut first = true;
        self.policy.run(|| {
            if !std::mem::take(&mut first) {
                check_source(old_path)?;
            }
            self.strategy.rename(old_path, new_path)
        })?;

        debug!(
            from = %old_path.display(),
            to = %new_path.display(),
            "Checkpoint committed"
        );
        Ok(())
    }

    /// Commit on tokio's blocking pool so async callers do not stall a worker
    pub async fn commit_async(self: Arc<Self>, old_path: PathBuf, new_path: PathBuf) -> Result<()> {
        tokio::task::spawn_blocking(move || self.commit(&old_path, &new_path))
            .await
            .map_err(|e| Error::Internal {
                message: format!("checkpoint commit task failed: {}", e),
            })??;
        Ok(())
    }
}

impl fmt::Debug for CommitEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitEngine")
            .field("strategy", &self.strategy.name())
            .field("policy", &self.policy)
            .finish()
    }
}

fn check_source(old_path: &Path) -> std::result::Result<(), RenameError> {
    match std::fs::symlink_metadata(old_path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(RenameError::SourceMissing {
            path: old_path.to_path_buf(),
        }),
        _ => Ok(()),
    }
}

/// Atomically replace `new_path` with `old_path` using the process-wide engine.
///
/// The result must be checked: on error the previous checkpoint at
/// `new_path` is still intact and the caller should retry later.
pub fn commit_checkpoint<P, Q>(old_path: P, new_path: Q) -> std::result::Result<(), RenameError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    CommitEngine::global().commit(old_path.as_ref(), new_path.as_ref())
}

/// Async form of [`commit_checkpoint`]
pub async fn commit_checkpoint_async<P, Q>(old_path: P, new_path: Q) -> Result<()>
where
    P: Into<PathBuf>,
    Q: Into<PathBuf>,
{
    CommitEngine::global()
        .commit_async(old_path.into(), new_path.into())
        .await
}
