use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use steward_core::{ActivityTracker, Manager, ManagerError, Stopper, Waiter};
use steward_state::StateStore;
use tracing::{debug, info, warn};

/// Persists the shared state store.
///
/// Writing to disk is too slow for a convergence pass, so `ensure` only starts
/// a background checkpoint when the state changed and none is already running.
/// A failed background checkpoint is reported by the next `ensure`.
pub struct CheckpointManager {
    store: Arc<StateStore>,
    on_ensure: bool,
    tracker: ActivityTracker,
    in_flight: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl CheckpointManager {
    pub fn new(store: Arc<StateStore>, on_ensure: bool) -> Self {
        Self {
            store,
            on_ensure,
            tracker: ActivityTracker::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    fn take_last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Manager for CheckpointManager {
    fn prepare(&self) -> Result<(), ManagerError> {
        let Some(path) = self.store.path() else {
            return Ok(());
        };
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => Err(format!(
                "checkpoint directory {} does not exist",
                dir.display()
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn ensure(&self) -> Result<(), ManagerError> {
        if let Some(e) = self.take_last_error() {
            return Err(format!("state checkpoint failed: {e}").into());
        }
        if !self.on_ensure || !self.store.is_modified() {
            return Ok(());
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("checkpoint already in flight");
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);
        let last_error = Arc::clone(&self.last_error);
        let started = self.tracker.spawn("state-checkpoint", move |_| {
            if let Err(e) = store.checkpoint() {
                warn!("background checkpoint failed: {e}");
                *last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
            }
            in_flight.store(false, Ordering::SeqCst);
        });
        if !started {
            self.in_flight.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn waiter(&self) -> Option<&dyn Waiter> {
        Some(self)
    }

    fn stopper(&self) -> Option<&dyn Stopper> {
        Some(self)
    }
}

impl Waiter for CheckpointManager {
    fn wait(&self) {
        self.tracker.wait();
    }
}

impl Stopper for CheckpointManager {
    fn stop(&self) {
        self.tracker.stop();
        match self.store.checkpoint() {
            Ok(true) => info!("final state checkpoint written"),
            Ok(false) => debug!("state unchanged; no final checkpoint needed"),
            Err(e) => warn!("final state checkpoint failed: {e}"),
        }
    }
}
