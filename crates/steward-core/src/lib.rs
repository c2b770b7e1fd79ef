//! Convergence engine core for Steward.
//!
//! This crate drives a fixed set of pluggable managers through their lifecycle:
//! a one-time preparation step, repeated convergence passes, and a final
//! drain-then-stop sequence. The `Engine` owns no domain knowledge. It sequences
//! calls under a single lock, composes per-manager failures into a `MultiError`,
//! and hands the shared state store through untouched.

pub mod activity;
pub mod aggregate;
pub mod engine;
pub mod lifecycle;
pub mod manager;
pub mod registry;

pub use activity::{ActivityTracker, StopSignal};
pub use aggregate::MultiError;
pub use engine::Engine;
pub use lifecycle::EngineState;
pub use manager::{Manager, ManagerError, Stopper, Waiter};
pub use registry::{Capabilities, ManagerRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("state engine already stopped")]
    Stopped,
    #[error("state engine was not prepared")]
    NotPrepared,
    #[error(transparent)]
    Managers(#[from] MultiError),
}

impl CoreError {
    /// Sequencing failures indicate a caller bug rather than a manager problem.
    pub fn is_sequencing(&self) -> bool {
        matches!(self, CoreError::Stopped | CoreError::NotPrepared)
    }
}
