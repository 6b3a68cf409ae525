use super::ReactiveRuntime;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<EffectScope>> = const { RefCell::new(Vec::new()) };
}

struct ScopeInner {
    runtime: Arc<ReactiveRuntime>,
    active: AtomicBool,
    observers: Mutex<Vec<usize>>,
    children: Mutex<Vec<EffectScope>>,
}

/// Groups the effects and memos created while it runs so they can be
/// stopped together.
///
/// Stopping a scope removes every observer it collected from the runtime and
/// stops its child scopes. A stopped scope refuses to run anything.
#[derive(Clone)]
pub struct EffectScope {
    inner: Arc<ScopeInner>,
}

impl EffectScope {
    /// Create a detached scope bound to the current runtime.
    pub fn new() -> Self {
        Self::in_runtime(ReactiveRuntime::current())
    }

    /// Create a detached scope bound to `runtime`.
    pub fn in_runtime(runtime: Arc<ReactiveRuntime>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                runtime,
                active: AtomicBool::new(true),
                observers: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a scope that is stopped whenever `self` is stopped.
    ///
    /// Children that were stopped on their own are dropped from `self` here.
    pub fn child(&self) -> Self {
        let child = Self::in_runtime(Arc::clone(&self.inner.runtime));
        if self.is_active() {
            let mut children = self.inner.children.lock();
            children.retain(EffectScope::is_active);
            children.push(child.clone());
        } else {
            child.inner.active.store(false, Ordering::SeqCst);
        }
        child
    }

    /// The scope at the top of this thread's scope stack.
    pub fn current() -> Option<Self> {
        SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// The runtime this scope's observers live in.
    pub fn runtime(&self) -> &Arc<ReactiveRuntime> {
        &self.inner.runtime
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Run `f` with this scope and its runtime as current.
    ///
    /// Returns `None` without calling `f` if the scope was stopped.
    pub fn run<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        if !self.is_active() {
            tracing::warn!("cannot run an inactive effect scope");
            return None;
        }

        struct PopOnDrop;
        impl Drop for PopOnDrop {
            fn drop(&mut self) {
                SCOPE_STACK.with(|stack| {
                    stack.borrow_mut().pop();
                });
            }
        }

        SCOPE_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        let _guard = PopOnDrop;
        Some(ReactiveRuntime::with_runtime(
            Arc::clone(&self.inner.runtime),
            f,
        ))
    }

    /// Attach an observer to the current scope, if there is one.
    pub(crate) fn record(observer_id: usize) {
        if let Some(scope) = Self::current() {
            if scope.is_active() {
                scope.inner.observers.lock().push(observer_id);
            }
        }
    }

    /// Stop every observer collected by this scope and its children.
    pub fn stop(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let observers = std::mem::take(&mut *self.inner.observers.lock());
        for observer_id in observers {
            self.inner.runtime.remove_observer(observer_id);
        }
        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children {
            child.stop();
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of child scopes still held by this scope.
    pub fn child_count(&self) -> usize {
        self.inner.children.lock().len()
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}
