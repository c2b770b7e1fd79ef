use crate::manager::{Manager, Stopper, Waiter};
use std::sync::Arc;

/// Optional capabilities a manager exposed when it was registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub wait: bool,
    pub stop: bool,
}

impl Capabilities {
    fn of(manager: &dyn Manager) -> Self {
        Self {
            wait: manager.waiter().is_some(),
            stop: manager.stopper().is_some(),
        }
    }
}

struct Entry {
    manager: Arc<dyn Manager>,
    capabilities: Capabilities,
}

/// Insertion-ordered set of registered managers.
///
/// The registry itself is not synchronized; the engine keeps it behind the same
/// lock that serializes lifecycle passes, so membership never changes mid-pass.
#[derive(Default)]
pub struct ManagerRegistry {
    entries: Vec<Entry>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, manager: Arc<dyn Manager>) -> Capabilities {
        let capabilities = Capabilities::of(manager.as_ref());
        self.entries.push(Entry {
            manager,
            capabilities,
        });
        capabilities
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn managers(&self) -> impl Iterator<Item = &dyn Manager> {
        self.entries.iter().map(|e| e.manager.as_ref())
    }

    pub fn waiters(&self) -> impl Iterator<Item = &dyn Waiter> {
        self.entries
            .iter()
            .filter(|e| e.capabilities.wait)
            .filter_map(|e| e.manager.waiter())
    }

    pub fn stoppers(&self) -> impl Iterator<Item = &dyn Stopper> {
        self.entries
            .iter()
            .filter(|e| e.capabilities.stop)
            .filter_map(|e| e.manager.stopper())
    }
}
