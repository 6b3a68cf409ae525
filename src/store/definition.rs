//! Store definitions: the declarative options form and the setup form.

use super::action::Action;
use super::store::{StateFactory, Store};
use crate::error::Result;
use crate::registry::{active_registry, Registry};
use crate::signal::{Memo, Signal};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub(crate) type GetterFn = Arc<dyn Fn(&Store) -> Value + Send + Sync>;
pub(crate) type HydrateFn = Arc<dyn Fn(&Store, &Value) + Send + Sync>;
pub(crate) type SetupFn = dyn Fn() -> SetupStore + Send + Sync;

/// Declarative store definition: state factory, getters and actions.
///
/// ```
/// use pantry::{define_store, Action, OptionsStore, Registry};
/// use serde_json::json;
///
/// let use_counter = define_store(
///     OptionsStore::new("counter")
///         .state(|| json!({ "count": 0 }))
///         .getter("double", |store| json!(store.get("count").unwrap().as_i64().unwrap() * 2))
///         .action("add", Action::sync(|store, args| {
///             let by = args.first().and_then(|v| v.as_i64()).unwrap_or(1);
///             store.patch_with(|state| {
///                 let count = state["count"].as_i64().unwrap_or(0);
///                 state["count"] = json!(count + by);
///             });
///             Ok(json!(null))
///         })),
/// );
///
/// let registry = Registry::new();
/// let counter = use_counter.use_store_in(&registry).unwrap();
/// let _ = counter.call("add", vec![json!(2)]).unwrap();
/// assert_eq!(counter.getter("double"), Some(json!(4)));
/// ```
pub struct OptionsStore {
    pub(crate) id: String,
    pub(crate) state: Option<StateFactory>,
    pub(crate) getters: IndexMap<String, GetterFn>,
    pub(crate) actions: IndexMap<String, Action>,
    pub(crate) hydrate: Option<HydrateFn>,
    pub(crate) extra: Map<String, Value>,
}

impl OptionsStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: None,
            getters: IndexMap::new(),
            actions: IndexMap::new(),
            hydrate: None,
            extra: Map::new(),
        }
    }

    /// Factory for the initial state. It must return an object; each
    /// top-level key becomes a state field.
    pub fn state<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.state = Some(Arc::new(factory));
        self
    }

    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Store) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(name.into(), Arc::new(getter));
        self
    }

    pub fn action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    /// Replace the default deep merge used to apply a pending initial state.
    pub fn hydrate<F>(mut self, hydrate: F) -> Self
    where
        F: Fn(&Store, &Value) + Send + Sync + 'static,
    {
        self.hydrate = Some(Arc::new(hydrate));
        self
    }

    /// Free-form option readable by plugins through [`StoreOptions::option`].
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Optional settings for a setup store.
#[derive(Default)]
pub struct SetupOptions {
    pub(crate) hydrate: Option<HydrateFn>,
    pub(crate) extra: Map<String, Value>,
}

impl SetupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hydrate<F>(mut self, hydrate: F) -> Self
    where
        F: Fn(&Store, &Value) + Send + Sync + 'static,
    {
        self.hydrate = Some(Arc::new(hydrate));
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// One member returned by a setup function, already classified.
#[derive(Clone, Debug)]
pub enum SetupEntry {
    /// A reactive cell that becomes a state field.
    State(Signal<Value>),
    /// An operation exposed through [`Store::call`].
    Action(Action),
    /// A derived value exposed through [`Store::getter`].
    Getter(Memo<Value>),
}

/// What a setup function returns: named, classified members.
#[derive(Clone, Debug, Default)]
pub struct SetupStore {
    entries: IndexMap<String, SetupEntry>,
}

impl SetupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(self, name: impl Into<String>, cell: Signal<Value>) -> Self {
        self.entry(name, SetupEntry::State(cell))
    }

    pub fn action(self, name: impl Into<String>, action: Action) -> Self {
        self.entry(name, SetupEntry::Action(action))
    }

    pub fn getter(self, name: impl Into<String>, memo: Memo<Value>) -> Self {
        self.entry(name, SetupEntry::Getter(memo))
    }

    /// Later entries replace earlier ones with the same name.
    pub fn entry(mut self, name: impl Into<String>, entry: SetupEntry) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    pub(crate) fn into_entries(self) -> IndexMap<String, SetupEntry> {
        self.entries
    }
}

/// Which syntax a store was defined with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Options,
    Setup,
}

/// Read-only view of a store's definition.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub(crate) id: String,
    pub(crate) kind: StoreKind,
    pub(crate) actions: Vec<String>,
    pub(crate) getters: Vec<String>,
    pub(crate) custom_hydrate: bool,
    pub(crate) extra: Map<String, Value>,
}

impl StoreOptions {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn getters(&self) -> &[String] {
        &self.getters
    }

    pub fn has_custom_hydrate(&self) -> bool {
        self.custom_hydrate
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

pub(crate) enum Blueprint {
    Options(OptionsStore),
    Setup {
        id: String,
        setup: Arc<SetupFn>,
        options: SetupOptions,
    },
}

impl Blueprint {
    pub(crate) fn id(&self) -> &str {
        match self {
            Blueprint::Options(options) => &options.id,
            Blueprint::Setup { id, .. } => id,
        }
    }
}

/// Retrieves the store defined under one id.
///
/// The store is built on first retrieval from a registry; later retrievals
/// from the same registry return the same instance.
#[derive(Clone)]
pub struct StoreDefinition {
    pub(crate) blueprint: Arc<Blueprint>,
}

impl StoreDefinition {
    pub fn id(&self) -> &str {
        self.blueprint.id()
    }

    /// Get or build the store in `registry`.
    pub fn use_store_in(&self, registry: &Registry) -> Result<Store> {
        registry.get_or_create(self)
    }

    /// Get or build the store in the active registry.
    pub fn use_store(&self) -> Result<Store> {
        self.use_store_in(&active_registry()?)
    }
}

impl fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("id", &self.id())
            .finish()
    }
}

/// Define a store from a declarative definition.
pub fn define_store(options: OptionsStore) -> StoreDefinition {
    StoreDefinition {
        blueprint: Arc::new(Blueprint::Options(options)),
    }
}

/// Define a store from a setup function.
///
/// `setup` runs once per registry, inside the store's effect scope and with
/// the registry's runtime current, so the signals and memos it creates
/// belong to the store.
pub fn define_setup_store<F>(id: impl Into<String>, setup: F) -> StoreDefinition
where
    F: Fn() -> SetupStore + Send + Sync + 'static,
{
    define_setup_store_with(id, setup, SetupOptions::default())
}

pub fn define_setup_store_with<F>(
    id: impl Into<String>,
    setup: F,
    options: SetupOptions,
) -> StoreDefinition
where
    F: Fn() -> SetupStore + Send + Sync + 'static,
{
    StoreDefinition {
        blueprint: Arc::new(Blueprint::Setup {
            id: id.into(),
            setup: Arc::new(setup),
            options,
        }),
    }
}
