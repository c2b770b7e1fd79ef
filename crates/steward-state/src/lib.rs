//! Shared state store for Steward managers.
//!
//! Managers coordinate exclusively through a `StateStore`: an in-process map of
//! JSON documents behind its own lock. A store opened from a path can be
//! checkpointed to disk atomically (tempfile + rename + directory fsync) with a
//! blake3 checksum that is verified on load. `InstanceLock` keeps two daemons
//! from sharing one state file.

pub mod lock;
pub mod store;

pub use lock::InstanceLock;
pub use store::{StateGuard, StateStore, STATE_FORMAT_VERSION};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` into it is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("state checksum mismatch in {path}: expected {expected}, got {actual}")]
    IntegrityFailure {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("state checkpoint {0} carries no checksum")]
    MissingChecksum(String),
    #[error("state format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("state file is locked by another process: {0}")]
    Locked(String),
}
