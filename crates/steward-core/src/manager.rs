/// Failure reported by a manager. Managers are developed independently, so the
/// engine accepts any error type and only ever looks at its display text.
pub type ManagerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A unit responsible for observing one system concern and moving it towards
/// the desired state.
///
/// Managers coordinate with each other solely through the shared state store.
/// They must cope with `ensure` calls in any order relative to other managers.
pub trait Manager: Send + Sync {
    /// Prepare to run without producing externally visible side effects.
    fn prepare(&self) -> Result<(), ManagerError>;

    /// Evaluate desired versus actual state completely and start any corrective
    /// work. Must return promptly: long-running work belongs in tracked
    /// background activity, not in this call.
    fn ensure(&self) -> Result<(), ManagerError>;

    /// Managers with background activity that can be waited on return `Some(self)`.
    fn waiter(&self) -> Option<&dyn Waiter> {
        None
    }

    /// Managers with background activity that can be terminated return `Some(self)`.
    fn stopper(&self) -> Option<&dyn Stopper> {
        None
    }
}

pub trait Waiter {
    /// Block until all currently running activities have finished.
    fn wait(&self);
}

pub trait Stopper {
    /// Terminate all running activities. Must not return before they are finished.
    fn stop(&self);
}
