use crate::runtime::{EffectScope, ReactiveRuntime};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A memoized computed value that automatically tracks dependencies.
///
/// Memos compute lazily on first read and only recompute after one of the
/// sources they read has changed.
pub struct Memo<T> {
    compute: Arc<dyn Fn() -> T + Send + Sync>,
    cached: Arc<RwLock<Option<T>>>,
    id: usize,
    runtime: Arc<ReactiveRuntime>,
}

impl<T: Clone + 'static> Memo<T> {
    /// Create a new memo in the current runtime and scope.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();

        runtime.register_memo(id);
        EffectScope::record(id);

        Self {
            compute: Arc::new(compute),
            cached: Arc::new(RwLock::new(None)),
            id,
            runtime,
        }
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        self.runtime.track_read(self.id);

        if !self.runtime.is_memo_dirty(self.id) {
            if let Some(value) = self.cached.read().as_ref() {
                return value.clone();
            }
        }

        let value = self.runtime.with_observer(self.id, || (self.compute)());
        *self.cached.write() = Some(value.clone());
        self.runtime.mark_memo_clean(self.id);
        value
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn runtime(&self) -> &Arc<ReactiveRuntime> {
        &self.runtime
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            compute: Arc::clone(&self.compute),
            cached: Arc::clone(&self.cached),
            id: self.id,
            runtime: Arc::clone(&self.runtime),
        }
    }
}

impl<T> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo").field("id", &self.id).finish()
    }
}

/// Create a new memoized computation.
///
/// # Example
///
/// ```
/// use pantry::{create_memo, Signal};
///
/// let count = Signal::new(5);
/// let doubled = create_memo({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(doubled.get(), 10);
/// ```
pub fn create_memo<T, F>(compute: F) -> Memo<T>
where
    T: Clone + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(compute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn memo_basic() {
        let count = Signal::new(5);
        let doubled = create_memo({
            let count = count.clone();
            move || count.get() * 2
        });

        assert_eq!(doubled.get(), 10);

        count.set(10);
        assert_eq!(doubled.get(), 20);
    }

    #[test]
    fn memo_caches_until_source_changes() {
        let runs = Arc::new(AtomicUsize::new(0));
        let source = Signal::new(1);
        let memo = create_memo({
            let source = source.clone();
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                source.get() + 1
            }
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(memo.get(), 2);
        assert_eq!(memo.get(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        source.set(5);
        assert_eq!(memo.get(), 6);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
