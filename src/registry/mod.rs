//! The table of live stores for one application context.
//!
//! Every store is built against an explicit [`Registry`]. For call sites
//! without one at hand, a thread-local active registry can be set with
//! [`set_active_registry`] (or by [`Registry::install`]) and is then used by
//! [`StoreDefinition::use_store`](crate::StoreDefinition::use_store).

mod config;
mod plugin;

pub use config::RegistryConfig;
pub use plugin::{Extension, Extensions, Method, Plugin, PluginContext};

use crate::error::{json_kind, Result, StoreError};
use crate::runtime::{EffectScope, ReactiveRuntime};
use crate::store::{self, Store, StoreDefinition};
use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

thread_local! {
    static ACTIVE_REGISTRY: RefCell<Option<Registry>> = const { RefCell::new(None) };
}

/// Make `registry` the one used by ambient retrieval on this thread.
pub fn set_active_registry(registry: &Registry) {
    ACTIVE_REGISTRY.with(|active| *active.borrow_mut() = Some(registry.clone()));
}

pub fn clear_active_registry() {
    ACTIVE_REGISTRY.with(|active| *active.borrow_mut() = None);
}

/// Run `f` with `registry` active, restoring the previously active registry
/// afterwards.
pub(crate) fn with_active_registry<F, R>(registry: &Registry, f: F) -> R
where
    F: FnOnce() -> R,
{
    struct Restore(Option<Registry>);
    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            ACTIVE_REGISTRY.with(|active| *active.borrow_mut() = previous);
        }
    }

    let previous = ACTIVE_REGISTRY.with(|active| active.borrow_mut().replace(registry.clone()));
    let _restore = Restore(previous);
    f()
}

/// The registry ambient retrieval uses on this thread.
pub fn active_registry() -> Result<Registry> {
    ACTIVE_REGISTRY
        .with(|active| active.borrow().clone())
        .ok_or(StoreError::NoActiveRegistry)
}

/// Handle of the host application a registry is installed into.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    name: String,
    globals: RwLock<Map<String, Value>>,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AppInner {
                name: name.into(),
                globals: RwLock::new(Map::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Application-wide value, e.g. configuration plugins read.
    pub fn global(&self, key: &str) -> Option<Value> {
        self.inner.globals.read().get(key).cloned()
    }

    pub fn set_global(&self, key: impl Into<String>, value: Value) {
        self.inner.globals.write().insert(key.into(), value);
    }

    pub fn ptr_eq(&self, other: &App) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App").field("name", &self.inner.name).finish()
    }
}

pub(crate) struct RegistryInner {
    runtime: Arc<ReactiveRuntime>,
    scope: EffectScope,
    config: RegistryConfig,
    stores: RwLock<IndexMap<String, Store>>,
    // held from lookup to insert so an id is only ever built once; reentrant
    // because a setup function may retrieve other stores
    creation: ReentrantMutex<()>,
    // serialized state waiting for its store to be created
    initial_state: Mutex<Map<String, Value>>,
    plugins: RwLock<Vec<Plugin>>,
    app: RwLock<Option<App>>,
    disposed: AtomicBool,
}

/// Live stores of one application context, keyed by id.
///
/// Each registry has its own reactive runtime and root effect scope;
/// disposing the registry stops every effect its stores created.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let runtime = ReactiveRuntime::new();
        Self {
            inner: Arc::new(RegistryInner {
                scope: EffectScope::in_runtime(Arc::clone(&runtime)),
                runtime,
                config,
                stores: RwLock::new(IndexMap::new()),
                creation: ReentrantMutex::new(()),
                initial_state: Mutex::new(Map::new()),
                plugins: RwLock::new(Vec::new()),
                app: RwLock::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn runtime(&self) -> &Arc<ReactiveRuntime> {
        &self.inner.runtime
    }

    pub(crate) fn scope(&self) -> &EffectScope {
        &self.inner.scope
    }

    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Attach the registry to `app` and make it the active registry.
    pub fn install(&self, app: App) {
        tracing::debug!(app = %app.name(), "installing registry");
        *self.inner.app.write() = Some(app);
        set_active_registry(self);
    }

    pub fn app(&self) -> Option<App> {
        self.inner.app.read().clone()
    }

    /// Register a plugin. It runs for every store created from now on and,
    /// right away, for the stores that already exist.
    pub fn use_plugin<F>(&self, plugin: F)
    where
        F: Fn(&PluginContext<'_>) -> Extensions + Send + Sync + 'static,
    {
        let plugin: Plugin = Arc::new(plugin);
        self.inner.plugins.write().push(Arc::clone(&plugin));

        let existing: Vec<Store> = self.inner.stores.read().values().cloned().collect();
        for store in existing {
            store.inner.scope.run(|| self.apply_plugin(&plugin, &store));
        }
    }

    pub(crate) fn plugins(&self) -> Vec<Plugin> {
        self.inner.plugins.read().clone()
    }

    pub(crate) fn apply_plugin(&self, plugin: &Plugin, store: &Store) {
        let app = self.app();
        let extensions = plugin(&PluginContext {
            store,
            app: app.as_ref(),
            registry: self,
            options: store.options(),
        });
        tracing::debug!(store = %store.id(), added = extensions.len(), "applied plugin");
        store.extend(extensions);
    }

    /// Queue serialized state for the store `id`; it is merged into the
    /// store when the store is created.
    pub fn set_initial_state(&self, id: impl Into<String>, state: Value) {
        self.inner.initial_state.lock().insert(id.into(), state);
    }

    /// Queue a whole snapshot as produced by [`Registry::state`].
    pub fn hydrate_from(&self, snapshot: Value) -> Result<()> {
        let Value::Object(states) = snapshot else {
            return Err(StoreError::NotAnObject {
                id: "*".to_string(),
                found: json_kind(&snapshot),
            });
        };
        self.inner.initial_state.lock().extend(states);
        Ok(())
    }

    pub(crate) fn take_initial_state(&self, id: &str) -> Option<Value> {
        self.inner.initial_state.lock().remove(id)
    }

    /// Serialize every store's state, plus queued initial states of stores
    /// not created yet, keyed by store id.
    pub fn state(&self) -> Value {
        let mut snapshot = self.inner.initial_state.lock().clone();
        let stores: Vec<Store> = self.inner.stores.read().values().cloned().collect();
        for store in stores {
            snapshot.insert(store.id().to_string(), store.state());
        }
        Value::Object(snapshot)
    }

    pub fn store(&self, id: &str) -> Option<Store> {
        self.inner.stores.read().get(id).cloned()
    }

    pub fn has_store(&self, id: &str) -> bool {
        self.inner.stores.read().contains_key(id)
    }

    pub fn store_ids(&self) -> Vec<String> {
        self.inner.stores.read().keys().cloned().collect()
    }

    pub(crate) fn get_or_create(&self, definition: &StoreDefinition) -> Result<Store> {
        if self.is_disposed() {
            return Err(StoreError::RegistryDisposed);
        }
        if let Some(store) = self.store(definition.id()) {
            return Ok(store);
        }

        let _creating = self.inner.creation.lock();
        if let Some(store) = self.store(definition.id()) {
            return Ok(store);
        }
        let built = store::build(self, &definition.blueprint)?;
        self.inner
            .stores
            .write()
            .insert(definition.id().to_string(), built.clone());
        Ok(built)
    }

    pub(crate) fn forget(&self, store: &Store) {
        let mut stores = self.inner.stores.write();
        if stores.get(store.id()).is_some_and(|s| s.ptr_eq(store)) {
            stores.shift_remove(store.id());
        }
    }

    /// Stop every store's effects and drop all stores.
    ///
    /// Retrieving a store afterwards fails with [`StoreError::RegistryDisposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.scope.stop();
        let stores = std::mem::take(&mut *self.inner.stores.write());
        tracing::debug!(stores = stores.len(), "disposing registry");
        for store in stores.values() {
            store.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("stores", &self.store_ids())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
