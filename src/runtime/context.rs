use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Fired on an observer when one of its sources changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Id of the signal or memo that changed.
    pub source: usize,
    /// Id of the observer being notified.
    pub observer: usize,
}

pub(crate) type ObserverFn = Arc<dyn Fn(&TriggerEvent) + Send + Sync>;

/// Dependency graph of one runtime.
#[derive(Default)]
struct ReactiveContext {
    current_observer: Option<usize>,
    // Map from source ID to set of observer IDs that depend on it
    dependencies: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to set of source IDs it depends on
    observer_deps: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to the effect function
    observers: HashMap<usize, ObserverFn>,
    // Map from memo ID to dirty state
    memo_dirty: HashMap<usize, bool>,
}

impl ReactiveContext {
    fn unlink(&mut self, observer_id: usize) {
        if let Some(old_deps) = self.observer_deps.remove(&observer_id) {
            for source_id in old_deps {
                if let Some(deps) = self.dependencies.get_mut(&source_id) {
                    deps.remove(&observer_id);
                }
            }
        }
    }
}

/// Reactive runtime owning one dependency graph.
///
/// Signals, memos and effects capture the runtime that was current when they
/// were created and keep using it afterwards. A [`Registry`](crate::Registry)
/// owns its own runtime and makes it current while stores are being built,
/// so every cell a store creates lives in that registry's graph.
///
/// # Examples
///
/// ```
/// use pantry::runtime::ReactiveRuntime;
/// use pantry::Signal;
///
/// ReactiveRuntime::scope(|| {
///     let signal = Signal::new(0);
///     assert_eq!(signal.get(), 0);
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct ReactiveRuntime {
    next_id: AtomicUsize,
    context: Mutex<ReactiveContext>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
}

impl ReactiveRuntime {
    /// Create a new isolated runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(ReactiveRuntime {
            next_id: AtomicUsize::new(0),
            context: Mutex::new(ReactiveContext::default()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_runtime(Self::new(), f)
    }

    /// Get or create the global runtime (fallback).
    pub fn global() -> Arc<Self> {
        static RUNTIME: OnceLock<Arc<ReactiveRuntime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current reactive runtime (scoped or global fallback).
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// The runtime is popped again even if `f` panics.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| stack.borrow_mut().push(runtime));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Generate the next unique ID for a reactive primitive.
    pub fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of live observers. Stopped effects are no longer counted.
    pub fn observer_count(&self) -> usize {
        self.context.lock().observers.len()
    }

    /// Track a read of a source by the current observer.
    pub fn track_read(&self, source_id: usize) {
        let mut ctx = self.context.lock();
        if let Some(observer) = ctx.current_observer {
            Self::link(&mut ctx, observer, source_id);
        }
    }

    /// Make `observer_id` depend on `source_id` without running anything.
    pub fn track(&self, observer_id: usize, source_id: usize) {
        let mut ctx = self.context.lock();
        Self::link(&mut ctx, observer_id, source_id);
    }

    fn link(ctx: &mut ReactiveContext, observer_id: usize, source_id: usize) {
        ctx.dependencies
            .entry(source_id)
            .or_default()
            .insert(observer_id);
        ctx.observer_deps
            .entry(observer_id)
            .or_default()
            .insert(source_id);
    }

    /// Notify all observers that depend on a source.
    pub fn notify_observers(&self, source_id: usize) {
        let observers = {
            let ctx = self.context.lock();
            ctx.dependencies
                .get(&source_id)
                .map(|obs| obs.iter().copied().collect::<Vec<_>>())
        };

        for observer_id in observers.unwrap_or_default() {
            self.mark_observer_dirty(source_id, observer_id);
        }
    }

    /// Mark an observer (memo or effect) as dirty and propagate to dependents.
    fn mark_observer_dirty(&self, source_id: usize, observer_id: usize) {
        let mut ctx = self.context.lock();

        if let Some(dirty) = ctx.memo_dirty.get_mut(&observer_id) {
            if *dirty {
                return;
            }
            *dirty = true;
            let dependents = ctx
                .dependencies
                .get(&observer_id)
                .map(|deps| deps.iter().copied().collect::<Vec<_>>());
            drop(ctx);

            for dependent_id in dependents.unwrap_or_default() {
                self.mark_observer_dirty(observer_id, dependent_id);
            }
            return;
        }

        let effect = ctx.observers.get(&observer_id).cloned();
        drop(ctx);

        if let Some(effect) = effect {
            effect(&TriggerEvent {
                source: source_id,
                observer: observer_id,
            });
        }
    }

    /// Register the callback run when one of `observer_id`'s sources changes.
    ///
    /// Any dependencies the observer had before are dropped.
    pub(crate) fn create_observer(&self, observer_id: usize, f: ObserverFn) {
        let mut ctx = self.context.lock();
        ctx.unlink(observer_id);
        ctx.observers.insert(observer_id, f);
    }

    /// Drop an observer and all its dependency edges.
    pub fn remove_observer(&self, observer_id: usize) {
        let mut ctx = self.context.lock();
        ctx.observers.remove(&observer_id);
        ctx.memo_dirty.remove(&observer_id);
        ctx.unlink(observer_id);
    }

    /// Run a function with a specific observer as the current context.
    pub fn with_observer<F, R>(&self, observer_id: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = self.context.lock().current_observer.replace(observer_id);
        let result = f();
        self.context.lock().current_observer = prev;
        result
    }

    /// Register a memo and mark it as dirty initially.
    pub fn register_memo(&self, memo_id: usize) {
        self.context.lock().memo_dirty.insert(memo_id, true);
    }

    /// Check if a memo is dirty (needs recomputation).
    pub fn is_memo_dirty(&self, memo_id: usize) -> bool {
        self.context
            .lock()
            .memo_dirty
            .get(&memo_id)
            .copied()
            .unwrap_or(true)
    }

    /// Mark a memo as clean (after recomputation).
    pub fn mark_memo_clean(&self, memo_id: usize) {
        if let Some(dirty) = self.context.lock().memo_dirty.get_mut(&memo_id) {
            *dirty = false;
        }
    }
}
