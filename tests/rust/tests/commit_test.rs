//! Commit engine behavior across crates: atomicity when a write is
//! interrupted, the retry bound, and the transactional path with its fallback

use anyhow::Result;
use checkpoint::{
    commit_checkpoint, CheckpointWriter, CommitEngine, NativeRename, RenameStrategy, RetryPolicy,
    TransactionCapability, TransactionFacility, TransactionalReplace, TxHandle,
};
use runtime_core::{RenameError, TransactionStep};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const OLD: &[u8] = b"checkpoint at step 1000: [0.125, 0.250, 0.375]";
const NEW: &[u8] = b"checkpoint at step 2000: [0.500, 0.625, 0.750, 0.875, 1.000]";

fn quick_policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(200), Duration::from_millis(10))
}

/// Fault hit during the commit, applied to the writer's real temp file
#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    /// Temp file emptied, as if the process died right after creating it
    TempCreated,
    /// Temp file cut to half its length
    TempPartial,
    /// Temp file complete and synced, rename never issued
    TempSynced,
    /// Rename done, then the attempt reports failure
    AfterMove,
}

struct FaultyRename {
    fault: Fault,
}

fn truncate(path: &Path, len: u64) {
    std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .unwrap()
        .set_len(len)
        .unwrap();
}

impl RenameStrategy for FaultyRename {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn rename(&self, from: &Path, to: &Path) -> std::result::Result<(), RenameError> {
        match self.fault {
            Fault::TempCreated => truncate(from, 0),
            Fault::TempPartial => truncate(from, std::fs::metadata(from).unwrap().len() / 2),
            Fault::TempSynced => {}
            Fault::AfterMove => NativeRename.rename(from, to)?,
        }
        Err(RenameError::NativeMoveFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: io::Error::from(io::ErrorKind::Interrupted),
        })
    }
}

fn setup_pair(dir: &Path) -> (PathBuf, PathBuf) {
    let old = dir.join("nbody.ckpt.tmp");
    let new = dir.join("nbody.ckpt");
    std::fs::write(&new, OLD).unwrap();
    std::fs::write(&old, NEW).unwrap();
    (old, new)
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_faulted_write_leaves_old_or_new_checkpoint() -> Result<()> {
    runtime_core::init_tracing("checkpoint=debug");

    for fault in [
        Fault::TempCreated,
        Fault::TempPartial,
        Fault::TempSynced,
        Fault::AfterMove,
    ] {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nbody.ckpt");
        std::fs::write(&path, OLD)?;

        let engine = Arc::new(CommitEngine::new(
            Arc::new(FaultyRename { fault }),
            quick_policy(),
        ));
        let result = CheckpointWriter::new(engine).write_checkpoint(&path, NEW);

        assert!(result.is_err(), "{fault:?}");
        let expected = if fault == Fault::AfterMove { NEW } else { OLD };
        assert_eq!(std::fs::read(&path)?, expected, "{fault:?}");
        assert_eq!(dir_entries(dir.path()), vec!["nbody.ckpt"], "{fault:?}");
    }
    Ok(())
}

#[test]
fn test_failed_transaction_commit_leaves_previous_checkpoint() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nbody.ckpt");
    std::fs::write(&path, OLD)?;

    let facility = Arc::new(StagedFacility::default());
    facility.fail_commit.store(true, Ordering::SeqCst);
    let probe_facility = facility.clone();
    let strategy = TransactionalReplace::new(
        TransactionCapability::new(move || {
            Ok(probe_facility.clone() as Arc<dyn TransactionFacility>)
        }),
        NativeRename,
    );
    let engine = Arc::new(CommitEngine::new(Arc::new(strategy), quick_policy()));

    let err = CheckpointWriter::new(engine)
        .write_checkpoint(&path, NEW)
        .unwrap_err();

    assert!(matches!(
        err,
        runtime_core::Error::Rename(RenameError::RetryBudgetExhausted { .. })
    ));
    assert_eq!(std::fs::read(&path)?, OLD);
    assert_eq!(dir_entries(dir.path()), vec!["nbody.ckpt"]);
    assert_eq!(
        facility.creates.load(Ordering::SeqCst),
        facility.closes.load(Ordering::SeqCst)
    );
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_concurrent_reader_never_sees_partial_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.ckpt");
    std::fs::write(&path, OLD)?;

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let done = done.clone();
        let path = path.clone();
        thread::spawn(move || {
            let mut reads = 0usize;
            while !done.load(Ordering::SeqCst) {
                let data = std::fs::read(&path).expect("destination must always exist");
                assert!(data == OLD || data == NEW, "partial read: {} bytes", data.len());
                reads += 1;
            }
            reads
        })
    };

    let writer = CheckpointWriter::default();
    for i in 0..200 {
        writer.write_checkpoint(&path, if i % 2 == 0 { NEW } else { OLD })?;
    }
    done.store(true, Ordering::SeqCst);

    assert!(reader.join().unwrap() > 0);
    Ok(())
}

struct AlwaysBusy;

impl RenameStrategy for AlwaysBusy {
    fn name(&self) -> &'static str {
        "busy"
    }

    fn rename(&self, from: &Path, to: &Path) -> std::result::Result<(), RenameError> {
        Err(RenameError::NativeMoveFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        })
    }
}

#[test]
fn test_default_retry_budget_bounds_the_stall() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (old, new) = setup_pair(dir.path());

    let policy = RetryPolicy::default();
    let engine = CommitEngine::new(Arc::new(AlwaysBusy), policy);

    let start = Instant::now();
    let err = engine.commit(&old, &new).unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, RenameError::RetryBudgetExhausted { .. }));
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < policy.worst_case_wait() + Duration::from_millis(500));
    assert_eq!(std::fs::read(&new)?, OLD);
    Ok(())
}

/// Transaction manager emulation: moves are staged and applied on commit
#[derive(Default)]
struct StagedFacility {
    next: AtomicUsize,
    staged: Mutex<HashMap<isize, (PathBuf, PathBuf)>>,
    open: Mutex<Vec<isize>>,
    fail_commit: AtomicBool,
    creates: AtomicUsize,
    closes: AtomicUsize,
}

impl TransactionFacility for StagedFacility {
    fn create(&self, _description: &str) -> io::Result<TxHandle> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = self.next.fetch_add(1, Ordering::SeqCst) as isize + 100;
        self.open.lock().unwrap().push(id);
        Ok(TxHandle(id))
    }

    fn move_file(&self, tx: TxHandle, from: &Path, to: &Path) -> io::Result<()> {
        if !from.exists() {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        self.staged
            .lock()
            .unwrap()
            .insert(tx.0, (from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    fn commit(&self, tx: TxHandle) -> io::Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "transaction aborted"));
        }
        let staged = self.staged.lock().unwrap().remove(&tx.0);
        match staged {
            Some((from, to)) => std::fs::rename(from, to),
            None => Ok(()),
        }
    }

    fn close(&self, tx: TxHandle) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.staged.lock().unwrap().remove(&tx.0);
        self.open.lock().unwrap().retain(|h| *h != tx.0);
        Ok(())
    }
}

#[test]
fn test_transactional_commit_moves_on_commit_and_closes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let facility = Arc::new(StagedFacility::default());
    let probe_facility = facility.clone();
    let strategy = TransactionalReplace::new(
        TransactionCapability::new(move || {
            Ok(probe_facility.clone() as Arc<dyn TransactionFacility>)
        }),
        NativeRename,
    );
    let engine = CommitEngine::new(Arc::new(strategy), quick_policy());

    for step in 0..3 {
        let (old, new) = setup_pair(dir.path());
        engine.commit(&old, &new)?;
        assert_eq!(std::fs::read(&new)?, NEW, "step {step}");
        assert!(!old.exists());
    }

    assert_eq!(facility.creates.load(Ordering::SeqCst), 3);
    assert_eq!(facility.closes.load(Ordering::SeqCst), 3);
    assert!(facility.open.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_failed_transaction_commit_is_retried_then_exhausted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (old, new) = setup_pair(dir.path());
    let facility = Arc::new(StagedFacility::default());
    facility.fail_commit.store(true, Ordering::SeqCst);
    let probe_facility = facility.clone();
    let strategy = TransactionalReplace::new(
        TransactionCapability::new(move || {
            Ok(probe_facility.clone() as Arc<dyn TransactionFacility>)
        }),
        NativeRename,
    );
    let engine = CommitEngine::new(Arc::new(strategy), quick_policy());

    let err = engine.commit(&old, &new).unwrap_err();

    assert!(matches!(
        err.last_attempt(),
        RenameError::TransactionStepFailed {
            step: TransactionStep::Commit,
            ..
        }
    ));
    let attempts = facility.creates.load(Ordering::SeqCst);
    assert!(attempts >= 2);
    assert_eq!(facility.closes.load(Ordering::SeqCst), attempts);
    assert!(facility.open.lock().unwrap().is_empty());
    assert_eq!(std::fs::read(&new)?, OLD);
    assert!(old.exists());
    Ok(())
}

#[test]
fn test_fallback_is_chosen_once_per_engine() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let probes = Arc::new(AtomicUsize::new(0));
    let counter = probes.clone();
    let strategy = Arc::new(TransactionalReplace::new(
        TransactionCapability::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RenameError::TransactionUnavailable {
                reason: "KtmW32.dll not present".to_string(),
            })
        }),
        NativeRename,
    ));
    let engine = Arc::new(CommitEngine::new(strategy.clone(), quick_policy()));

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let engine = engine.clone();
            let dir = dir.path().to_path_buf();
            thread::spawn(move || -> std::result::Result<(), RenameError> {
                for step in 0..10 {
                    let old = dir.join(format!("w{worker}-{step}.tmp"));
                    let new = dir.join(format!("w{worker}.ckpt"));
                    std::fs::write(&old, format!("{worker}:{step}")).unwrap();
                    engine.commit(&old, &new)?;
                }
                Ok(())
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap()?;
    }

    assert_eq!(probes.load(Ordering::SeqCst), 1);
    assert!(!strategy.capability().is_available());
    for worker in 0..4 {
        let data = std::fs::read_to_string(dir.path().join(format!("w{worker}.ckpt")))?;
        assert_eq!(data, format!("{worker}:9"));
    }
    Ok(())
}

#[test]
fn test_process_wide_commit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (old, new) = setup_pair(dir.path());

    commit_checkpoint(&old, &new)?;
    assert_eq!(std::fs::read(&new)?, NEW);

    let err = commit_checkpoint(&old, &new).unwrap_err();
    assert!(matches!(err, RenameError::SourceMissing { .. }));
    Ok(())
}

#[tokio::test]
async fn test_async_writer_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("async.ckpt");
    let writer = CheckpointWriter::default();

    writer
        .write_checkpoint_async(path.clone(), bytes::Bytes::from_static(OLD))
        .await?;
    checkpoint::commit_checkpoint_async(
        {
            let staged = dir.path().join("async.ckpt.next");
            std::fs::write(&staged, NEW)?;
            staged
        },
        path.clone(),
    )
    .await?;

    assert_eq!(CheckpointWriter::read_checkpoint(&path)?, NEW);
    Ok(())
}
