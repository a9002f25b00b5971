//! Process-wide table of live communicators.
//!
//! Slots are cleared on release, never compacted, so a handle issued for one
//! communicator stays valid no matter which others are released around it.

use tracing::{debug, info};

use crate::comm::Communicator;

/// Opaque handle to a registered communicator; a stable slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommHandle(pub(crate) usize);

/// Ordered collection of optional communicator ownership slots.
#[derive(Default)]
pub struct CommRegistry {
    slots: Vec<Option<Communicator>>,
}

impl CommRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unreleased) communicators.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take ownership of `comm` and return a handle valid until release.
    pub fn register(&mut self, comm: Communicator) -> CommHandle {
        self.slots.push(Some(comm));
        let handle = CommHandle(self.slots.len() - 1);
        debug!(slot = handle.0, "communicator registered");
        handle
    }

    /// # Panics
    /// Panics if the handle was never issued or was already released.
    pub fn get(&self, handle: CommHandle) -> &Communicator {
        self.slots
            .get(handle.0)
            .and_then(|s| s.as_ref())
            .unwrap_or_else(|| panic!("communicator handle {} is not registered", handle.0))
    }

    /// # Panics
    /// Panics if the handle was never issued or was already released.
    pub fn get_mut(&mut self, handle: CommHandle) -> &mut Communicator {
        self.slots
            .get_mut(handle.0)
            .and_then(|s| s.as_mut())
            .unwrap_or_else(|| panic!("communicator handle {} is not registered", handle.0))
    }

    /// Drop the communicator and clear its slot. No index shifts: every other
    /// outstanding handle stays valid.
    ///
    /// # Panics
    /// Panics if the handle is unknown or already released.
    pub fn release(&mut self, handle: CommHandle) {
        let slot = self
            .slots
            .get_mut(handle.0)
            .unwrap_or_else(|| panic!("cannot find communicator {} to release", handle.0));
        if slot.take().is_none() {
            panic!("cannot find communicator {} to release", handle.0);
        }
        debug!(slot = handle.0, "communicator released");
    }

    /// Release every registered communicator.
    pub fn teardown(&mut self) {
        let live = self.len();
        self.slots.clear();
        info!(released = live, "communicator registry torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CollectiveEngine, LoopbackEngine};

    fn comm(color: Option<i32>) -> Communicator {
        let engine = LoopbackEngine::new();
        Communicator::new(engine.create_communicator(color).unwrap(), color)
    }

    #[test]
    fn test_release_keeps_other_handles_valid() {
        let mut reg = CommRegistry::new();
        let a = reg.register(comm(None));
        let b = reg.register(comm(Some(1)));
        let c = reg.register(comm(Some(2)));

        reg.release(b);

        assert_eq!(reg.get(a).color(), None);
        assert_eq!(reg.get(c).color(), Some(2));
        assert_eq!(reg.len(), 2);

        // handles issued after a release are stable too
        let d = reg.register(comm(Some(3)));
        assert_eq!(reg.get(d).color(), Some(3));
        assert_eq!(reg.get(a).color(), None);
    }

    #[test]
    fn test_teardown_clears_everything() {
        let mut reg = CommRegistry::new();
        reg.register(comm(None));
        reg.register(comm(Some(1)));
        reg.teardown();
        assert!(reg.is_empty());
    }

    #[test]
    #[should_panic(expected = "cannot find communicator")]
    fn test_double_release_panics() {
        let mut reg = CommRegistry::new();
        let a = reg.register(comm(None));
        reg.release(a);
        reg.release(a);
    }

    #[test]
    #[should_panic(expected = "cannot find communicator")]
    fn test_release_unknown_panics() {
        let mut reg = CommRegistry::new();
        reg.release(CommHandle(7));
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_get_released_panics() {
        let mut reg = CommRegistry::new();
        let a = reg.register(comm(None));
        reg.release(a);
        reg.get(a);
    }
}
