//! Turns a store definition into a live [`Store`].

use super::action::{instrument, Action};
use super::definition::{Blueprint, GetterFn, HydrateFn, SetupEntry, StoreKind, StoreOptions};
use super::listeners::Listeners;
use super::store::{StateFactory, Store, StoreInner};
use crate::error::{json_kind, Result, StoreError};
use crate::registry::{self, Registry};
use crate::runtime::ReactiveRuntime;
use crate::signal::{Effect, Memo, Signal};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock, Weak};

type StoreSlot = Arc<OnceLock<Weak<StoreInner>>>;

/// Members gathered from a definition before the store exists.
struct Parts {
    fields: IndexMap<String, Signal<Value>>,
    actions: IndexMap<String, Action>,
    getters: IndexMap<String, Memo<Value>>,
    watcher: Effect,
}

pub(crate) fn build(registry: &Registry, blueprint: &Blueprint) -> Result<Store> {
    let id = blueprint.id().to_string();
    let scope = registry.scope().child();
    // filled in once the store exists; getters and the watcher reach it here
    let slot: StoreSlot = Arc::default();

    let parts = registry::with_active_registry(registry, || {
        scope.run(|| collect_parts(blueprint, &slot, scope.runtime()))
    })
    .ok_or(StoreError::RegistryDisposed)?
    .inspect_err(|_| scope.stop())?;

    let (state_factory, hydrate, options) = describe(blueprint, &parts);
    let sources = parts
        .fields
        .iter()
        .map(|(key, cell)| (cell.id(), key.clone()))
        .collect::<HashMap<_, _>>();
    let actions = parts
        .actions
        .into_iter()
        .map(|(name, action)| {
            let instrumented = instrument(&name, action);
            (name, instrumented)
        })
        .collect();

    let store = Store {
        inner: Arc::new(StoreInner {
            id: id.clone(),
            registry: registry.downgrade(),
            fields: RwLock::new(parts.fields),
            sources: RwLock::new(sources),
            actions,
            getters: parts.getters,
            state_factory,
            options,
            subscriptions: Listeners::new(),
            action_listeners: Listeners::new(),
            listening: AtomicBool::new(false),
            dev_mode: registry.config().dev_mode,
            events: Mutex::new(Vec::new()),
            extensions: RwLock::new(IndexMap::new()),
            scope: scope.clone(),
            watcher: parts.watcher,
        }),
    };
    let _ = slot.set(Arc::downgrade(&store.inner));

    scope.run(|| {
        for plugin in registry.plugins() {
            registry.apply_plugin(&plugin, &store);
        }
    });

    if let Some(initial) = registry.take_initial_state(&id) {
        hydrate_store(&store, hydrate.as_ref(), &initial);
    }

    store.start_listening();
    tracing::debug!(
        store = %id,
        fields = store.keys().len(),
        actions = store.action_names().len(),
        getters = store.getter_names().len(),
        "store created"
    );
    Ok(store)
}

fn collect_parts(
    blueprint: &Blueprint,
    slot: &StoreSlot,
    runtime: &Arc<ReactiveRuntime>,
) -> Result<Parts> {
    let mut fields = IndexMap::new();
    let mut actions = IndexMap::new();
    let mut getters = IndexMap::new();

    match blueprint {
        Blueprint::Options(definition) => {
            let state = definition
                .state
                .as_ref()
                .map(|factory| initial_state(&definition.id, factory))
                .unwrap_or_default();
            for (key, value) in state {
                fields.insert(key, Signal::new(value));
            }
            for (name, getter) in &definition.getters {
                getters.insert(name.clone(), getter_memo(slot, Arc::clone(getter)));
            }
            actions.extend(definition.actions.clone());
        }
        Blueprint::Setup { id, setup, .. } => {
            // cells from another runtime would notify observers the store never sees
            let foreign = |key: String| StoreError::ForeignCell {
                id: id.clone(),
                key,
            };
            for (name, entry) in setup().into_entries() {
                match entry {
                    SetupEntry::State(cell) if !Arc::ptr_eq(cell.runtime(), runtime) => {
                        return Err(foreign(name));
                    }
                    SetupEntry::Getter(memo) if !Arc::ptr_eq(memo.runtime(), runtime) => {
                        return Err(foreign(name));
                    }
                    SetupEntry::State(cell) => {
                        fields.insert(name, cell);
                    }
                    SetupEntry::Action(action) => {
                        actions.insert(name, action);
                    }
                    SetupEntry::Getter(memo) => {
                        getters.insert(name, memo);
                    }
                }
            }
        }
    }

    let watcher = {
        let slot = Arc::clone(slot);
        Effect::on_trigger(move |event| {
            if let Some(inner) = slot.get().and_then(Weak::upgrade) {
                Store { inner }.on_field_trigger(event);
            }
        })
    };
    for cell in fields.values() {
        watcher.watch(cell.id());
    }

    Ok(Parts {
        fields,
        actions,
        getters,
        watcher,
    })
}

/// Run the state factory, treating anything but an object as empty state.
fn initial_state(id: &str, factory: &StateFactory) -> Map<String, Value> {
    match factory() {
        Value::Object(state) => state,
        other => {
            tracing::warn!(store = %id, found = json_kind(&other), "state factory did not return an object");
            Map::new()
        }
    }
}

fn getter_memo(slot: &StoreSlot, getter: GetterFn) -> Memo<Value> {
    let slot = Arc::clone(slot);
    Memo::new(move || match slot.get().and_then(Weak::upgrade) {
        Some(inner) => getter(&Store { inner }),
        None => Value::Null,
    })
}

fn describe(
    blueprint: &Blueprint,
    parts: &Parts,
) -> (Option<StateFactory>, Option<HydrateFn>, StoreOptions) {
    let (kind, state_factory, hydrate, extra) = match blueprint {
        Blueprint::Options(definition) => {
            // an options store without a factory still resets to empty state
            let factory: StateFactory = match &definition.state {
                Some(factory) => Arc::clone(factory),
                None => Arc::new(|| Value::Object(Map::new())),
            };
            (
                StoreKind::Options,
                Some(factory),
                definition.hydrate.clone(),
                definition.extra.clone(),
            )
        }
        Blueprint::Setup { options, .. } => (
            StoreKind::Setup,
            None,
            options.hydrate.clone(),
            options.extra.clone(),
        ),
    };

    let options = StoreOptions {
        id: blueprint.id().to_string(),
        kind,
        actions: parts.actions.keys().cloned().collect(),
        getters: parts.getters.keys().cloned().collect(),
        custom_hydrate: hydrate.is_some(),
        extra,
    };
    (state_factory, hydrate, options)
}

fn hydrate_store(store: &Store, hydrate: Option<&HydrateFn>, initial: &Value) {
    tracing::debug!(store = %store.id(), custom = hydrate.is_some(), "hydrating store");
    match (hydrate, initial) {
        (Some(hydrate), _) => hydrate(store, initial),
        (None, Value::Object(entries)) => store.merge_entries(entries),
        (None, other) => {
            tracing::warn!(store = %store.id(), found = json_kind(other), "ignoring initial state that is not an object");
        }
    }
}
