//! Explicit owner -> manager registry for hosts running several instances.

use std::collections::HashMap;

use super::manager::SaveManager;

/// Identity of the application instance that owns a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

/// One [`SaveManager`] per running application instance.
///
/// Managers are created on first use and torn down explicitly by whoever
/// owns the instance lifecycle.
#[derive(Default)]
pub struct SaveManagerRegistry {
    managers: HashMap<InstanceId, SaveManager>,
}

impl SaveManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager of `owner`, building and initializing it with `create` if
    /// none exists yet
    pub fn get_or_create(
        &mut self,
        owner: InstanceId,
        create: impl FnOnce() -> SaveManager,
    ) -> &mut SaveManager {
        self.managers.entry(owner).or_insert_with(|| {
            let mut manager = create();
            manager.init();
            manager
        })
    }

    pub fn get(&self, owner: InstanceId) -> Option<&SaveManager> {
        self.managers.get(&owner)
    }

    pub fn get_mut(&mut self, owner: InstanceId) -> Option<&mut SaveManager> {
        self.managers.get_mut(&owner)
    }

    /// Shut down and drop the manager of `owner`
    pub fn teardown(&mut self, owner: InstanceId) -> bool {
        match self.managers.remove(&owner) {
            Some(mut manager) => {
                manager.shutdown();
                true
            }
            None => false,
        }
    }

    pub fn teardown_all(&mut self) {
        for (_, mut manager) in self.managers.drain() {
            manager.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}
