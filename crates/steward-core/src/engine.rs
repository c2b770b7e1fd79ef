use crate::aggregate::MultiError;
use crate::lifecycle::EngineState;
use crate::manager::{Manager, ManagerError};
use crate::registry::ManagerRegistry;
use crate::CoreError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

struct Inner {
    prepared: bool,
    stopped: bool,
    registry: ManagerRegistry,
}

/// Dispatches state convergence to the registered managers.
///
/// Most of the actual work is done by the managers. The engine sequences their
/// lifecycle: `prepare` once, `converge` repeatedly, then `wait` and `stop`
/// during shutdown. A single lock serializes registration and every lifecycle
/// pass, so a manager is never asked to converge after being told to stop.
///
/// The shared state store `S` is passed through untouched; managers are built
/// with their own handle to it.
pub struct Engine<S> {
    state: Arc<S>,
    inner: Mutex<Inner>,
}

impl<S> Engine<S> {
    pub fn new(state: Arc<S>) -> Self {
        Self {
            state,
            inner: Mutex::new(Inner {
                prepared: false,
                stopped: false,
                registry: ManagerRegistry::new(),
            }),
        }
    }

    /// The shared state store managers coordinate through.
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Register a manager to take part in every subsequent lifecycle pass.
    ///
    /// Registering after `stop` is accepted, but the manager is never called.
    pub fn add_manager(&self, manager: Arc<dyn Manager>) {
        let mut inner = self.lock();
        if inner.stopped {
            debug!("manager registered after engine stop; it will not be driven");
        }
        let caps = inner.registry.register(manager);
        debug!(
            "registered manager #{} (wait: {}, stop: {})",
            inner.registry.len(),
            caps.wait,
            caps.stop
        );
    }

    /// Ask every manager to get ready before the first `converge`.
    ///
    /// Every manager is prepared even if an earlier one fails, and the engine
    /// counts as prepared afterwards regardless: failures are reported, not fatal.
    pub fn prepare(&self) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.stopped {
            return Err(CoreError::Stopped);
        }
        debug!("preparing {} managers", inner.registry.len());

        let mut errors: Vec<ManagerError> = Vec::new();
        for manager in inner.registry.managers() {
            if let Err(e) = manager.prepare() {
                warn!("state prepare error: {e}");
                errors.push(e);
            }
        }
        inner.prepared = true;

        MultiError::from_errors(errors)?;
        Ok(())
    }

    /// Run one convergence pass over every manager, in registration order.
    ///
    /// A failing manager does not stop the pass; its error is logged and
    /// collected, and the remaining managers are still called.
    pub fn converge(&self) -> Result<(), CoreError> {
        let inner = self.lock();
        if !inner.prepared {
            return Err(CoreError::NotPrepared);
        }
        if inner.stopped {
            return Err(CoreError::Stopped);
        }

        let mut errors: Vec<ManagerError> = Vec::new();
        for manager in inner.registry.managers() {
            if let Err(e) = manager.ensure() {
                warn!("state ensure error: {e}");
                errors.push(e);
            }
        }

        MultiError::from_errors(errors)?;
        Ok(())
    }

    /// Block until every manager's running activities have finished.
    ///
    /// Managers are drained one after another, in registration order.
    pub fn wait(&self) {
        let inner = self.lock();
        if inner.stopped {
            return;
        }
        debug!("waiting for manager activities");
        for waiter in inner.registry.waiters() {
            waiter.wait();
        }
    }

    /// Ask every manager to terminate its activities, then mark the engine stopped.
    ///
    /// Each stopper must confirm its activities finished before the next one is
    /// asked. Calling `stop` again is a no-op.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.stopped {
            return;
        }
        debug!("stopping manager activities");
        for stopper in inner.registry.stoppers() {
            stopper.stop();
        }
        inner.stopped = true;
        info!("state engine stopped");
    }

    pub fn lifecycle(&self) -> EngineState {
        let inner = self.lock();
        EngineState::from_flags(inner.prepared, inner.stopped)
    }

    pub fn manager_count(&self) -> usize {
        self.lock().registry.len()
    }

    // A poisoned lock means a manager panicked mid-pass. The flags and the
    // registry are still consistent, so carry on rather than wedge shutdown.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("state engine lock poisoned by a panicking manager; continuing");
            PoisonError::into_inner(poisoned)
        })
    }
}
