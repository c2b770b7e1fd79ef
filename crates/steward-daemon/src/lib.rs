//! The Steward daemon.
//!
//! Wires the shared `StateStore` and the convergence `Engine` together, loads
//! the TOML configuration, and drives the engine from a run loop: prepare once,
//! converge on every tick or on request, then wait and stop on shutdown.

pub mod checkpoint;
pub mod config;
pub mod runner;
pub mod signal;

pub use checkpoint::CheckpointManager;
pub use config::DaemonConfig;
pub use runner::{channel, Command, Daemon, DaemonHandle};
pub use signal::{install_signal_handler, shutdown_requested};

use thiserror::Error;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STATE_ERROR: u8 = 3;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(String),
    #[error("state error: {0}")]
    State(#[from] steward_state::StateError),
    #[error("engine error: {0}")]
    Engine(#[from] steward_core::CoreError),
    #[error("another daemon already owns {0}")]
    AlreadyRunning(String),
    #[error("signal handler error: {0}")]
    Signal(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn exit_code(&self) -> u8 {
        match self {
            DaemonError::Config(_) => EXIT_CONFIG_ERROR,
            DaemonError::State(_) | DaemonError::AlreadyRunning(_) => EXIT_STATE_ERROR,
            _ => EXIT_FAILURE,
        }
    }
}
