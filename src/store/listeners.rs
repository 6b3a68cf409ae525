use crate::runtime::Component;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ordered callback list; entries are removed by the id `add` returned.
pub(crate) struct Listeners<T: ?Sized> {
    next_id: AtomicUsize,
    entries: Mutex<Vec<(usize, Arc<T>)>>,
}

impl<T: ?Sized> Listeners<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<T>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: usize) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|(entry, _)| *entry == id) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Current listeners in registration order. Callers invoke them after
    /// the lock is released so listeners may add or remove listeners.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Disposer returned by `subscribe` and `on_action`.
///
/// Disposing is idempotent. Dropping the handle does not unsubscribe.
#[derive(Clone)]
pub struct Unsubscribe {
    remove: Arc<dyn Fn() + Send + Sync>,
}

impl Unsubscribe {
    pub(crate) fn new(remove: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            remove: Arc::new(remove),
        }
    }

    pub fn unsubscribe(&self) {
        (self.remove)();
    }

    /// Tie the subscription to the current component unless `detached`.
    pub(crate) fn bind_to_current_component(self, detached: bool) -> Self {
        if !detached {
            if let Some(component) = Component::current() {
                let disposer = self.clone();
                component.on_unmounted(move || disposer.unsubscribe());
            }
        }
        self
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}
