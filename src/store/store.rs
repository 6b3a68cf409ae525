use super::action::{Action, ActionListener, ActionReturn};
use super::definition::StoreOptions;
use super::listeners::{Listeners, Unsubscribe};
use super::mutation::{Mutation, MutationKind, StateEvent};
use super::patch;
use crate::error::{json_kind, Result, StoreError};
use crate::registry::{self, Extension, Extensions, Registry, RegistryInner};
use crate::runtime::{EffectScope, TriggerEvent};
use crate::signal::{Effect, Memo, Signal};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Callback registered with [`Store::subscribe`].
pub type SubscriptionCallback = dyn Fn(&Mutation, &Value) + Send + Sync;

pub(crate) type StateFactory = Arc<dyn Fn() -> Value + Send + Sync>;

pub(crate) struct StoreInner {
    pub(crate) id: String,
    pub(crate) registry: Weak<RegistryInner>,
    // Accessor table: one cell per top-level state field.
    pub(crate) fields: RwLock<IndexMap<String, Signal<Value>>>,
    // Signal id -> field name, for trigger events.
    pub(crate) sources: RwLock<HashMap<usize, String>>,
    pub(crate) actions: IndexMap<String, Action>,
    pub(crate) getters: IndexMap<String, Memo<Value>>,
    pub(crate) state_factory: Option<StateFactory>,
    pub(crate) options: StoreOptions,
    pub(crate) subscriptions: Listeners<SubscriptionCallback>,
    pub(crate) action_listeners: Listeners<ActionListener>,
    pub(crate) listening: AtomicBool,
    pub(crate) dev_mode: bool,
    pub(crate) events: Mutex<Vec<StateEvent>>,
    pub(crate) extensions: RwLock<IndexMap<String, Extension>>,
    pub(crate) scope: EffectScope,
    pub(crate) watcher: Effect,
}

/// A live store: state cells, getters, instrumented actions and the
/// control methods around them.
///
/// Handles are cheap to clone and all point at the same instance.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether both handles refer to the same store instance.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The registry that created this store, if it is still alive.
    pub fn registry(&self) -> Option<Registry> {
        self.inner.registry.upgrade().map(Registry::from_inner)
    }

    /// Read-only view of the definition, as plugins see it.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Snapshot of the whole state. Reads are tracked, so getters that call
    /// this depend on every field.
    pub fn state(&self) -> Value {
        let fields = self.inner.fields.read().clone();
        Value::Object(
            fields
                .into_iter()
                .map(|(key, cell)| (key, cell.get()))
                .collect(),
        )
    }

    fn snapshot(&self) -> Map<String, Value> {
        let fields = self.inner.fields.read().clone();
        fields
            .into_iter()
            .map(|(key, cell)| (key, cell.get_untracked()))
            .collect()
    }

    /// Deserialize the current state.
    pub fn state_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.snapshot()))?)
    }

    /// Replace the whole state, observed as one direct mutation.
    ///
    /// Fields missing from `state` become `null`; new keys become new fields.
    pub fn replace_state(&self, state: Value) -> Result<()> {
        let Value::Object(mut state) = state else {
            return Err(self.not_an_object(&state));
        };
        self.commit(|| {
            for key in self.keys() {
                let value = state.remove(&key).unwrap_or(Value::Null);
                self.write_field(&key, value);
            }
            for (key, value) in state {
                self.add_field(key, value);
            }
            MutationKind::Direct
        });
        Ok(())
    }

    /// Names of the state fields, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.fields.read().keys().cloned().collect()
    }

    /// The reactive cell bound to `key`. Writes to it are seen by the store
    /// as direct mutations.
    pub fn field(&self, key: &str) -> Option<Signal<Value>> {
        self.inner.fields.read().get(key).cloned()
    }

    /// Current value of a state field (tracked).
    pub fn get(&self, key: &str) -> Option<Value> {
        self.field(key).map(|cell| cell.get())
    }

    /// Assign a state field.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let cell = self.field(key).ok_or_else(|| StoreError::UnknownField {
            id: self.inner.id.clone(),
            key: key.to_string(),
        })?;
        cell.set(value);
        Ok(())
    }

    /// Value of a getter, recomputed only when the state it read changed.
    pub fn getter(&self, name: &str) -> Option<Value> {
        self.inner.getters.get(name).map(Memo::get)
    }

    pub fn getter_names(&self) -> Vec<String> {
        self.inner.getters.keys().cloned().collect()
    }

    /// Deep-merge `partial` into the state as a single mutation.
    ///
    /// Objects are merged recursively; every other value is replaced whole.
    pub fn patch(&self, partial: Value) -> Result<()> {
        let Value::Object(entries) = &partial else {
            return Err(self.not_an_object(&partial));
        };
        tracing::trace!(store = %self.inner.id, keys = entries.len(), "patching state");
        self.commit(|| {
            self.merge_entries(entries);
            MutationKind::PatchObject {
                payload: partial.clone(),
            }
        });
        Ok(())
    }

    /// Mutate the state freely inside `mutator`, observed as a single
    /// mutation. Removed keys are set to `null`.
    pub fn patch_with<F>(&self, mutator: F)
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        tracing::trace!(store = %self.inner.id, "patching state with a function");
        self.commit(|| {
            let before = self.snapshot();
            let mut draft = before.clone();
            mutator(&mut draft);

            for (key, old) in &before {
                match draft.remove(key) {
                    Some(new) if new == *old => {}
                    Some(new) => self.write_field(key, new),
                    None => self.write_field(key, Value::Null),
                }
            }
            for (key, value) in draft {
                self.add_field(key, value);
            }
            MutationKind::PatchFunction
        });
    }

    /// Restore the initial state from the definition's state factory.
    pub fn reset(&self) -> Result<()> {
        let factory = self
            .inner
            .state_factory
            .as_ref()
            .ok_or_else(|| StoreError::ResetUnsupported {
                id: self.inner.id.clone(),
            })?;
        self.replace_state(factory())
    }

    /// Run `apply` with notifications suspended, then notify subscribers
    /// once with the mutation it describes.
    fn commit(&self, apply: impl FnOnce() -> MutationKind) {
        self.inner.listening.store(false, Ordering::SeqCst);
        self.inner.events.lock().clear();

        let kind = apply();

        let events = std::mem::take(&mut *self.inner.events.lock());
        self.inner.listening.store(true, Ordering::SeqCst);
        self.trigger_subscriptions(&Mutation {
            store_id: self.inner.id.clone(),
            kind,
            events,
        });
    }

    pub(crate) fn merge_entries(&self, entries: &Map<String, Value>) {
        for (key, sub_patch) in entries {
            match self.field(key) {
                Some(cell) => cell.update(|current| patch::merge(current, sub_patch)),
                None => self.add_field(key.clone(), sub_patch.clone()),
            }
        }
    }

    fn write_field(&self, key: &str, value: Value) {
        match self.field(key) {
            Some(cell) => cell.set(value),
            None => self.add_field(key.to_string(), value),
        }
    }

    fn add_field(&self, key: String, value: Value) {
        let cell = Signal::in_runtime(self.inner.scope.runtime().clone(), value);
        self.inner.watcher.watch(cell.id());
        self.inner.sources.write().insert(cell.id(), key.clone());
        self.inner.fields.write().insert(key, cell);
    }

    fn not_an_object(&self, value: &Value) -> StoreError {
        StoreError::NotAnObject {
            id: self.inner.id.clone(),
            found: json_kind(value),
        }
    }

    /// Call `callback` after every committed mutation, in registration order.
    ///
    /// Unless `detached`, a subscription made while a component is current is
    /// removed when that component unmounts.
    pub fn subscribe<F>(&self, callback: F, detached: bool) -> Unsubscribe
    where
        F: Fn(&Mutation, &Value) + Send + Sync + 'static,
    {
        let id = self.inner.subscriptions.add(Arc::new(callback));
        let weak = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscriptions.remove(id);
            }
        })
        .bind_to_current_component(detached)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    fn trigger_subscriptions(&self, mutation: &Mutation) {
        let subscriptions = self.inner.subscriptions.snapshot();
        if subscriptions.is_empty() {
            return;
        }
        let state = Value::Object(self.snapshot());
        for callback in subscriptions {
            callback(mutation, &state);
        }
    }

    pub(crate) fn on_field_trigger(&self, event: &TriggerEvent) {
        let Some(key) = self.inner.sources.read().get(&event.source).cloned() else {
            tracing::warn!(store = %self.inner.id, source = event.source, "trigger from an unknown state cell");
            return;
        };
        let event = StateEvent {
            key,
            source: event.source,
        };

        if self.inner.listening.load(Ordering::SeqCst) {
            let events = if self.inner.dev_mode {
                vec![event]
            } else {
                Vec::new()
            };
            self.trigger_subscriptions(&Mutation {
                store_id: self.inner.id.clone(),
                kind: MutationKind::Direct,
                events,
            });
        } else if self.inner.dev_mode {
            // the running patch reports these together
            self.inner.events.lock().push(event);
        }
    }

    pub(crate) fn start_listening(&self) {
        self.inner.events.lock().clear();
        self.inner.listening.store(true, Ordering::SeqCst);
    }

    /// Call an action through the action listeners.
    ///
    /// An error from the action body is returned exactly as the body
    /// produced it, after every `on_error` hook has seen it.
    ///
    /// The store's registry is the active registry while the body runs and
    /// the previous one is restored afterwards. An [`ActionReturn::Pending`]
    /// result must be awaited; dropped, its future never runs.
    pub fn call(&self, name: &str, args: Vec<Value>) -> anyhow::Result<ActionReturn> {
        let action = self
            .inner
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAction {
                id: self.inner.id.clone(),
                name: name.to_string(),
            })?;
        match self.registry() {
            Some(registry) => registry::with_active_registry(&registry, || action.invoke(self, args)),
            None => action.invoke(self, args),
        }
    }

    pub fn action_names(&self) -> Vec<String> {
        self.inner.actions.keys().cloned().collect()
    }

    /// Observe every action call. See [`ActionContext`](super::ActionContext)
    /// for the hooks a listener can register.
    pub fn on_action<F>(&self, listener: F, detached: bool) -> Unsubscribe
    where
        F: Fn(&super::ActionContext<'_>) + Send + Sync + 'static,
    {
        let id = self.inner.action_listeners.add(Arc::new(listener));
        let weak = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.action_listeners.remove(id);
            }
        })
        .bind_to_current_component(detached)
    }

    pub(crate) fn action_listeners(&self) -> Vec<Arc<ActionListener>> {
        self.inner.action_listeners.snapshot()
    }

    pub(crate) fn extend(&self, extensions: Extensions) {
        let mut current = self.inner.extensions.write();
        for (name, extension) in extensions {
            if self.inner.actions.contains_key(&name)
                || self.inner.getters.contains_key(&name)
                || self.inner.fields.read().contains_key(&name)
            {
                tracing::warn!(store = %self.inner.id, %name, "plugin property shadows a store member");
            }
            current.insert(name, extension);
        }
    }

    /// A property contributed by a plugin.
    pub fn property(&self, name: &str) -> Option<Value> {
        match self.inner.extensions.read().get(name) {
            Some(Extension::Property(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Call a method contributed by a plugin.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = match self.inner.extensions.read().get(name) {
            Some(Extension::Method(method)) => Arc::clone(method),
            _ => {
                return Err(StoreError::UnknownMethod {
                    id: self.inner.id.clone(),
                    name: name.to_string(),
                })
            }
        };
        Ok(method(self, args))
    }

    /// Names of all plugin-contributed properties and methods.
    pub fn custom_properties(&self) -> Vec<String> {
        self.inner.extensions.read().keys().cloned().collect()
    }

    /// Stop the store's effects, drop its listeners and remove it from its
    /// registry. Retrieving the id again builds a fresh instance.
    pub fn dispose(&self) {
        tracing::debug!(store = %self.inner.id, "disposing store");
        self.inner.scope.stop();
        self.inner.subscriptions.clear();
        self.inner.action_listeners.clear();
        if let Some(registry) = self.registry() {
            registry.forget(self);
        }
    }

    pub fn is_disposed(&self) -> bool {
        !self.inner.scope.is_active()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("state", &Value::Object(self.snapshot()))
            .finish()
    }
}
