use crate::runner::DaemonHandle;
use crate::DaemonError;
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Route SIGINT/SIGTERM to the run loop. The first signal asks the daemon to
/// drain and stop; a second one exits immediately.
pub fn install_signal_handler(handle: DaemonHandle) -> Result<(), DaemonError> {
    ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
            std::process::exit(1);
        }
        eprintln!("\nshutdown requested, draining managers...");
        let _ = handle.shutdown();
    })
    .map_err(|e| DaemonError::Signal(e.to_string()))
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
