//! Save/load lifecycle subscribers.

use std::sync::{Arc, Weak};

/// Receives save/load lifecycle notifications.
///
/// Every handler has an empty default, so observers implement only the ones
/// they care about.
pub trait SaveObserver: Send + Sync {
    fn on_save_began(&self) {}

    fn on_save_finished(&self, _error: bool) {}

    fn on_load_began(&self) {}

    fn on_load_finished(&self, _error: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SaveBegan,
    SaveFinished { error: bool },
    LoadBegan,
    LoadFinished { error: bool },
}

/// Ordered set of weakly held observers.
#[derive(Default)]
pub struct Subscribers {
    observers: Vec<Weak<dyn SaveObserver>>,
}

impl Subscribers {
    /// Add an observer; returns false if it is already subscribed
    pub fn subscribe<O: SaveObserver + 'static>(&mut self, observer: &Arc<O>) -> bool {
        let weak: Weak<O> = Arc::downgrade(observer);
        self.insert(weak)
    }

    /// Same as [`Subscribers::subscribe`] for type-erased handles
    pub fn subscribe_dyn(&mut self, observer: &Arc<dyn SaveObserver>) -> bool {
        self.insert(Arc::downgrade(observer))
    }

    pub fn unsubscribe<O: SaveObserver + ?Sized>(&mut self, observer: &Arc<O>) -> bool {
        let before = self.observers.len();
        self.observers
            .retain(|weak| !std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(observer)));
        self.observers.len() != before
    }

    pub fn contains<O: SaveObserver + ?Sized>(&self, observer: &Arc<O>) -> bool {
        self.observers
            .iter()
            .any(|weak| std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(observer)))
    }

    fn insert(&mut self, weak: Weak<dyn SaveObserver>) -> bool {
        let ptr = weak.as_ptr();
        if self
            .observers
            .iter()
            .any(|existing| std::ptr::addr_eq(existing.as_ptr(), ptr))
        {
            return false;
        }
        self.observers.push(weak);
        true
    }

    /// Live observer count
    pub fn len(&self) -> usize {
        self.observers
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every live observer in subscription order.
    /// Dropped observers are skipped and pruned.
    pub fn notify(&mut self, event: LifecycleEvent) {
        self.observers.retain(|weak| weak.strong_count() > 0);

        for observer in self.observers.iter().filter_map(Weak::upgrade) {
            match event {
                LifecycleEvent::SaveBegan => observer.on_save_began(),
                LifecycleEvent::SaveFinished { error } => observer.on_save_finished(error),
                LifecycleEvent::LoadBegan => observer.on_load_began(),
                LifecycleEvent::LoadFinished { error } => observer.on_load_finished(error),
            }
        }
    }
}
