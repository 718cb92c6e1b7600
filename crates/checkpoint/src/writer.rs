//! Checkpoint writer: write to a sibling temp file, sync, then commit

use bytes::Bytes;
use runtime_core::{CheckpointConfig, Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::engine::{CommitEngine, CommitEngineHandle};

/// Writes checkpoint files so the previous checkpoint survives any
/// interruption of the write
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    engine: CommitEngineHandle,
    temp_suffix: String,
}

impl Default for CheckpointWriter {
    fn default() -> Self {
        Self::new(CommitEngine::global())
    }
}

impl CheckpointWriter {
    /// Create a writer committing through `engine`
    pub fn new(engine: CommitEngineHandle) -> Self {
        Self {
            engine,
            temp_suffix: CheckpointConfig::default().temp_suffix,
        }
    }

    /// Create a writer with its own engine built from configuration
    pub fn from_config(config: &CheckpointConfig) -> Self {
        Self {
            engine: Arc::new(CommitEngine::for_platform(config.retry)),
            temp_suffix: config.temp_suffix.clone(),
        }
    }

    pub fn engine(&self) -> &CommitEngineHandle {
        &self.engine
    }

    /// Temporary path next to `path`, so the commit stays on one volume
    fn temp_path(&self, path: &Path) -> PathBuf {
        let temp_name = format!(
            ".{}.{}.{}",
            path.file_name().unwrap_or_default().to_string_lossy(),
            Uuid::new_v4(),
            self.temp_suffix
        );
        path.with_file_name(temp_name)
    }

    /// Write `data` as the checkpoint at `path`.
    ///
    /// On failure the temp file is removed and `path` holds either its
    /// previous content or, when the move went through before the attempt
    /// failed, exactly `data`. It never holds a partial file.
    #[instrument(skip(self, data), fields(path = %path.display(), size = data.len()))]
    pub fn write_checkpoint(&self, path: &Path, data: &[u8]) -> Result<u64> {
        let start = Instant::now();
        let temp_path = self.temp_path(path);

        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::CheckpointWriteFailed {
                message: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        if let Err(e) = Self::write_temp(&temp_path, data) {
            Self::discard(&temp_path);
            return Err(e);
        }

        if let Err(e) = self.engine.commit(&temp_path, path) {
            error!(error = %e, "Failed to commit checkpoint, keeping previous one");
            Self::discard(&temp_path);
            return Err(e.into());
        }

        Self::sync_parent(path);

        let size = data.len() as u64;
        info!(
            size_bytes = size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Checkpoint write complete"
        );
        Ok(size)
    }

    /// Async form of [`CheckpointWriter::write_checkpoint`], run on the
    /// blocking pool
    pub async fn write_checkpoint_async(&self, path: PathBuf, data: Bytes) -> Result<u64> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write_checkpoint(&path, &data))
            .await
            .map_err(|e| Error::Internal {
                message: format!("checkpoint write task failed: {}", e),
            })?
    }

    /// Read a committed checkpoint
    pub fn read_checkpoint(path: &Path) -> Result<Bytes> {
        let data = fs::read(path)?;
        debug!(path = %path.display(), size = data.len(), "Read checkpoint");
        Ok(Bytes::from(data))
    }

    fn write_temp(temp_path: &Path, data: &[u8]) -> Result<()> {
        let mut file = File::create(temp_path).map_err(|e| Error::CheckpointWriteFailed {
            message: format!("Failed to create temp file {:?}: {}", temp_path, e),
        })?;

        file.write_all(data).map_err(|e| Error::CheckpointWriteFailed {
            message: format!("Failed to write data: {}", e),
        })?;

        // Data must be durable before the rename makes it visible
        file.sync_all().map_err(|e| Error::CheckpointWriteFailed {
            message: format!("Failed to sync file: {}", e),
        })
    }

    fn discard(temp_path: &Path) {
        if let Err(e) = fs::remove_file(temp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %temp_path.display(), error = %e, "Failed to remove temp checkpoint");
            }
        }
    }

    /// Best effort: persist the directory entry of the rename
    fn sync_parent(path: &Path) {
        #[cfg(unix)]
        {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Ok(dir) = File::open(parent) {
                    let _ = dir.sync_all();
                }
            }
        }

        #[cfg(not(unix))]
        let _ = path;
    }
}
