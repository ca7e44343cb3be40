//! Observer registry
//!
//! Observers are zero-argument callbacks run after every successful
//! recompute. A panicking observer is logged and skipped; the rest still run.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::error;
use uuid::Uuid;

/// Observer callback
pub type Observer = Arc<dyn Fn() + Send + Sync>;

/// Token returned by `add_observer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Default)]
pub(crate) struct ObserverList {
    observers: RwLock<Vec<(ObserverId, Observer)>>,
}

impl ObserverList {
    pub(crate) fn add(&self, observer: Observer) -> ObserverId {
        let id = ObserverId(Uuid::new_v4());
        self.observers.write().push((id, observer));
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub(crate) fn clear(&self) {
        self.observers.write().clear();
    }

    /// Run every observer once, returning how many panicked
    pub(crate) fn notify(&self) -> usize {
        let snapshot: Vec<(ObserverId, Observer)> = self
            .observers
            .read()
            .iter()
            .map(|(id, observer)| (*id, Arc::clone(observer)))
            .collect();

        let mut failed = 0;
        for (id, observer) in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer())) {
                failed += 1;
                error!("Issue observer {} panicked: {}", id, panic_message(&payload));
            }
        }
        failed
    }
}

pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_remove_unknown_observer() {
        let list = ObserverList::default();
        let id = list.add(Arc::new(|| {}));
        assert!(list.remove(id));
        assert!(!list.remove(id));
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let list = ObserverList::default();
        let hits = Arc::new(AtomicUsize::new(0));

        list.add(Arc::new(|| panic!("renderer gone")));
        let counter = Arc::clone(&hits);
        list.add(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(list.notify(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
