//! Tracked background activity for managers.
//!
//! `Manager::ensure` must return promptly, so anything slow is handed to an
//! [`ActivityTracker`]. The tracker is what a manager's `Waiter` and `Stopper`
//! implementations delegate to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Cooperative termination flag handed to every tracked activity.
#[derive(Debug, Clone)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct ActivityTracker {
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` on a named thread. Returns `false` without running it once
    /// the tracker is stopping or if the thread could not be spawned.
    pub fn spawn<F>(&self, name: &str, work: F) -> bool
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let mut handles = self.handles();
        reap_finished(&mut handles);
        if self.stopping.load(Ordering::SeqCst) {
            debug!("refusing to start '{name}': tracker is stopping");
            return false;
        }
        let signal = StopSignal {
            flag: Arc::clone(&self.stopping),
        };
        match thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || work(signal))
        {
            Ok(handle) => {
                handles.push(handle);
                true
            }
            Err(e) => {
                warn!("failed to spawn activity '{name}': {e}");
                false
            }
        }
    }

    /// Number of tracked activities that have not finished yet.
    pub fn active(&self) -> usize {
        let mut handles = self.handles();
        reap_finished(&mut handles);
        handles.len()
    }

    /// Block until every tracked activity has finished, including ones spawned
    /// while waiting.
    pub fn wait(&self) {
        loop {
            let batch = std::mem::take(&mut *self.handles());
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                join_logged(handle);
            }
        }
    }

    /// Signal every activity to terminate and wait for them. New activities are
    /// refused from here on.
    pub fn stop(&self) {
        {
            let _guard = self.handles();
            self.stopping.store(true, Ordering::SeqCst);
        }
        self.wait();
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn join_logged(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("<unnamed>").to_owned();
    if handle.join().is_err() {
        warn!("activity '{name}' panicked");
    }
}

// Finished threads are joined eagerly so a long-lived tracker does not hold on
// to one handle per activity it ever ran.
fn reap_finished(handles: &mut Vec<JoinHandle<()>>) {
    let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(handles)
        .into_iter()
        .partition(JoinHandle::is_finished);
    *handles = running;
    for handle in finished {
        join_logged(handle);
    }
}
