//! Actions and the interception around every action call.

use super::Store;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What an action hands back to its caller.
///
/// A pending return does nothing until it is awaited: dropping it means
/// the async part of the action never runs and its `after`/`on_error`
/// hooks never fire.
///
/// ```compile_fail
/// #![deny(unused_must_use)]
/// use pantry::{define_store, Action, OptionsStore, Registry};
/// use serde_json::Value;
///
/// let store = define_store(OptionsStore::new("loader").action(
///     "load",
///     Action::future(|_store, _args| async { Ok::<_, anyhow::Error>(Value::Null) }),
/// ))
/// .use_store_in(&Registry::new())?;
/// store.call("load", vec![])?;
/// # Ok::<_, anyhow::Error>(())
/// ```
#[must_use = "pending actions only run when awaited"]
pub enum ActionReturn {
    /// The action finished synchronously with this value.
    Ready(Value),
    /// The action settles later. Awaiting the future yields the value and
    /// fires the `after`/`on_error` hooks of that call.
    Pending(BoxFuture<'static, anyhow::Result<Value>>),
}

impl ActionReturn {
    pub fn is_pending(&self) -> bool {
        matches!(self, ActionReturn::Pending(_))
    }

    /// The value of a ready return; `None` for a pending one, which is
    /// dropped without running.
    pub fn into_ready(self) -> Option<Value> {
        match self {
            ActionReturn::Ready(value) => Some(value),
            ActionReturn::Pending(_) => None,
        }
    }

    /// Wait for the final value.
    pub async fn resolve(self) -> anyhow::Result<Value> {
        match self {
            ActionReturn::Ready(value) => Ok(value),
            ActionReturn::Pending(future) => future.await,
        }
    }
}

impl From<Value> for ActionReturn {
    fn from(value: Value) -> Self {
        ActionReturn::Ready(value)
    }
}

impl fmt::Debug for ActionReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionReturn::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            ActionReturn::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

type ActionFn = dyn Fn(&Store, Vec<Value>) -> anyhow::Result<ActionReturn> + Send + Sync;

/// A state-mutating operation exposed on a store.
///
/// The body receives the store it is installed on and the call arguments.
#[derive(Clone)]
pub struct Action(Arc<ActionFn>);

impl Action {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Store, Vec<Value>) -> anyhow::Result<ActionReturn> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// An action that always completes before returning.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Store, Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(move |store, args| f(store, args).map(ActionReturn::Ready))
    }

    /// An action whose result is produced by a future.
    ///
    /// Synchronous work done before building the future runs during the
    /// call; the future itself runs when the caller awaits it.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(&Store, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(move |store, args| Ok(ActionReturn::Pending(f(store, args).boxed())))
    }

    pub(crate) fn invoke(&self, store: &Store, args: Vec<Value>) -> anyhow::Result<ActionReturn> {
        (self.0)(store, args)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action")
    }
}

type AfterHook = Box<dyn FnOnce(&Value) + Send>;
type ErrorHook = Box<dyn FnOnce(&anyhow::Error) + Send>;

/// Hooks registered by listeners for one action call.
#[derive(Default)]
struct CallHooks {
    after: Mutex<Vec<AfterHook>>,
    on_error: Mutex<Vec<ErrorHook>>,
}

impl CallHooks {
    fn succeeded(self, value: &Value) {
        for hook in self.after.into_inner() {
            hook(value);
        }
    }

    fn failed(self, error: &anyhow::Error) {
        for hook in self.on_error.into_inner() {
            hook(error);
        }
    }
}

/// What an action listener sees before the action body runs.
pub struct ActionContext<'a> {
    name: &'a str,
    args: &'a [Value],
    store: &'a Store,
    hooks: &'a CallHooks,
}

impl ActionContext<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn store(&self) -> &Store {
        self.store
    }

    /// Receive the action's value once it is available.
    ///
    /// For an action that completes synchronously the hook runs before
    /// [`Store::call`] returns, not on a later turn. For a pending action it
    /// runs when the returned future resolves.
    pub fn after(&self, hook: impl FnOnce(&Value) + Send + 'static) {
        self.hooks.after.lock().push(Box::new(hook));
    }

    /// Receive the action's error if it fails.
    pub fn on_error(&self, hook: impl FnOnce(&anyhow::Error) + Send + 'static) {
        self.hooks.on_error.lock().push(Box::new(hook));
    }
}

/// Callback registered with [`Store::on_action`].
pub type ActionListener = dyn Fn(&ActionContext<'_>) + Send + Sync;

/// Decorate `action` so every call goes through the store's action listeners.
pub(crate) fn instrument(name: &str, action: Action) -> Action {
    let name: Arc<str> = Arc::from(name);
    Action::new(move |store, args| {
        let hooks = CallHooks::default();
        {
            let context = ActionContext {
                name: &name,
                args: &args,
                store,
                hooks: &hooks,
            };
            for listener in store.action_listeners() {
                listener(&context);
            }
        }

        tracing::trace!(store = %store.id(), action = %name, "calling action");
        match action.invoke(store, args) {
            Err(error) => {
                hooks.failed(&error);
                Err(error)
            }
            Ok(ActionReturn::Ready(value)) => {
                hooks.succeeded(&value);
                Ok(ActionReturn::Ready(value))
            }
            Ok(ActionReturn::Pending(future)) => Ok(ActionReturn::Pending(
                async move {
                    match future.await {
                        Ok(value) => {
                            hooks.succeeded(&value);
                            Ok(value)
                        }
                        Err(error) => {
                            hooks.failed(&error);
                            Err(error)
                        }
                    }
                }
                .boxed(),
            )),
        }
    })
}
