use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type UnmountHook = Box<dyn FnOnce() + Send>;

thread_local! {
    static COMPONENT_STACK: RefCell<Vec<Component>> = const { RefCell::new(Vec::new()) };
}

struct ComponentInner {
    name: String,
    mounted: AtomicBool,
    unmount_hooks: Mutex<Vec<UnmountHook>>,
}

/// Lifecycle handle of a UI component instance.
///
/// While [`Component::run`] executes, the component is current and
/// subscriptions made through stores are tied to it: they are removed when
/// the component unmounts unless they were created detached.
#[derive(Clone)]
pub struct Component {
    inner: Arc<ComponentInner>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ComponentInner {
                name: name.into(),
                mounted: AtomicBool::new(true),
                unmount_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    /// The component whose `run` is currently executing on this thread.
    pub fn current() -> Option<Self> {
        COMPONENT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Run `f` with this component as the current one.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        COMPONENT_STACK.with(|stack| stack.borrow_mut().push(self.clone()));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        COMPONENT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Register a hook run once when the component unmounts.
    ///
    /// On an already unmounted component the hook runs immediately.
    pub fn on_unmounted(&self, hook: impl FnOnce() + Send + 'static) {
        if self.is_mounted() {
            self.inner.unmount_hooks.lock().push(Box::new(hook));
        } else {
            hook();
        }
    }

    /// Unmount the component, running its hooks in registration order.
    pub fn unmount(&self) {
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        let hooks = std::mem::take(&mut *self.inner.unmount_hooks.lock());
        tracing::debug!(component = %self.inner.name, hooks = hooks.len(), "unmounting component");
        for hook in hooks {
            hook();
        }
    }
}

/// Register `hook` on the current component. Returns `false` when no
/// component is current.
pub fn on_unmounted(hook: impl FnOnce() + Send + 'static) -> bool {
    match Component::current() {
        Some(component) => {
            component.on_unmounted(hook);
            true
        }
        None => false,
    }
}
