use crate::checkpoint::CheckpointManager;
use crate::config::DaemonConfig;
use crate::DaemonError;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use steward_core::{CoreError, Engine, Manager};
use steward_state::{InstanceLock, StateStore};
use tracing::{debug, info, warn};

/// Requests delivered to a running [`Daemon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run a convergence pass now instead of waiting for the next tick.
    EnsureNow,
    /// Leave the run loop, then drain and stop every manager.
    Shutdown,
}

/// Cloneable sender side of the daemon's command channel.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    tx: Sender<Command>,
}

impl DaemonHandle {
    /// Returns `false` if the daemon is no longer listening.
    pub fn ensure_now(&self) -> bool {
        self.tx.send(Command::EnsureNow).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.tx.send(Command::Shutdown).is_ok()
    }
}

pub fn channel() -> (DaemonHandle, Receiver<Command>) {
    let (tx, rx) = mpsc::channel();
    (DaemonHandle { tx }, rx)
}

pub struct Daemon {
    engine: Engine<StateStore>,
    interval: Duration,
    _instance: InstanceLock,
}

impl Daemon {
    /// Open the state under `data_dir`, take the instance lock, and register the
    /// built-in checkpoint manager.
    pub fn new(config: &DaemonConfig, data_dir: &Path) -> Result<Self, DaemonError> {
        config.validate()?;
        std::fs::create_dir_all(data_dir)?;

        let state_path = config.state_path(data_dir);
        let lock_path = state_path.with_extension("lock");
        let instance = InstanceLock::try_acquire(&lock_path)?
            .ok_or_else(|| DaemonError::AlreadyRunning(state_path.display().to_string()))?;

        let store = Arc::new(StateStore::open(&state_path)?);
        let engine = Engine::new(Arc::clone(&store));
        engine.add_manager(Arc::new(CheckpointManager::new(
            store,
            config.checkpoint_on_ensure,
        )));

        info!(
            "state at {}, ensuring every {}s",
            state_path.display(),
            config.ensure_interval_secs
        );
        Ok(Self {
            engine,
            interval: config.ensure_interval(),
            _instance: instance,
        })
    }

    pub fn engine(&self) -> &Engine<StateStore> {
        &self.engine
    }

    pub fn state(&self) -> &Arc<StateStore> {
        self.engine.state()
    }

    pub fn add_manager(&self, manager: Arc<dyn Manager>) {
        self.engine.add_manager(manager);
    }

    /// Prepare, then converge on every tick or `EnsureNow` until `Shutdown`
    /// arrives or every handle is dropped. Managers are always drained and
    /// stopped before this returns.
    pub fn run(&self, commands: &Receiver<Command>) -> Result<(), DaemonError> {
        let result = self.prepare().and_then(|()| self.ensure_loop(commands));
        self.shutdown();
        result
    }

    /// Prepare, converge once, then drain and stop.
    pub fn run_once(&self) -> Result<(), DaemonError> {
        let result = self.prepare().and_then(|()| self.ensure());
        self.shutdown();
        result
    }

    fn ensure_loop(&self, commands: &Receiver<Command>) -> Result<(), DaemonError> {
        loop {
            self.ensure()?;
            match commands.recv_timeout(self.interval) {
                Ok(Command::EnsureNow) => debug!("convergence requested"),
                Err(RecvTimeoutError::Timeout) => {}
                Ok(Command::Shutdown) => {
                    info!("shutdown requested");
                    return Ok(());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("command channel closed; shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn prepare(&self) -> Result<(), DaemonError> {
        match self.engine.prepare() {
            Ok(()) => {
                debug!("all managers prepared");
                Ok(())
            }
            Err(CoreError::Managers(e)) => {
                warn!("{} manager(s) failed to prepare: {e}", e.len());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // Manager failures are already logged by the engine; only sequencing
    // failures end the loop.
    fn ensure(&self) -> Result<(), DaemonError> {
        match self.engine.converge() {
            Ok(()) => Ok(()),
            Err(CoreError::Managers(e)) => {
                debug!("convergence pass finished with {} failure(s)", e.len());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // The checkpoint manager stops before managers registered after it, so the
    // durable checkpoint is taken once every stopper has returned.
    fn shutdown(&self) {
        info!("draining managers");
        self.engine.wait();
        self.engine.stop();
        match self.state().checkpoint() {
            Ok(true) => info!("state written after all managers stopped"),
            Ok(false) => debug!("state unchanged since the last checkpoint"),
            Err(e) => warn!("final state checkpoint failed: {e}"),
        }
    }
}
