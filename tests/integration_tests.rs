//! Integration tests for Pantry

use pantry::{
    create_memo, define_setup_store, define_setup_store_with, define_store, Action, Component,
    Extensions, MutationKind, OptionsStore, Registry, RegistryConfig, SetupOptions, SetupStore,
    Signal, StoreDefinition, StoreError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("boom: {0}")]
struct Boom(u32);

fn counter_store() -> StoreDefinition {
    define_store(
        OptionsStore::new("counter")
            .state(|| json!({ "count": 0, "a": { "b": 0 } }))
            .getter("double", |store| {
                json!(store.get("count").and_then(|c| c.as_i64()).unwrap_or(0) * 2)
            })
            .action(
                "increment",
                Action::sync(|store, _args| {
                    store.patch_with(|state| {
                        let count = state["count"].as_i64().unwrap_or(0);
                        state["count"] = json!(count + 1);
                    });
                    Ok(store.get("count").unwrap_or(Value::Null))
                }),
            )
            .action("fail", Action::sync(|_store, _args| Err(Boom(7).into())))
            .action(
                "fetch",
                Action::future(|store, args| {
                    let store = store.clone();
                    async move {
                        let by = args.first().and_then(|v| v.as_i64()).unwrap_or(1);
                        store.patch(json!({ "count": by }))?;
                        Ok::<_, anyhow::Error>(json!(by * 10))
                    }
                }),
            )
            .action(
                "fetch_fail",
                Action::future(|_store, _args| async move { Err(anyhow::Error::new(Boom(9))) }),
            ),
    )
}

fn counter_in(registry: &Registry) -> pantry::Store {
    counter_store().use_store_in(registry).unwrap()
}

fn count_calls() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    (calls, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn nested_patches_merge() {
    let store = counter_in(&Registry::new());

    store.patch(json!({ "a": { "b": 1 } })).unwrap();
    store.patch(json!({ "a": { "c": 2 } })).unwrap();

    assert_eq!(store.get("a"), Some(json!({ "b": 1, "c": 2 })));
}

#[test]
fn function_patch_emits_one_event() {
    let store = counter_in(&Registry::with_config(RegistryConfig::default().with_dev_mode(true)));
    let seen = Arc::new(Mutex::new(Vec::new()));
    store.subscribe(
        {
            let seen = seen.clone();
            move |mutation, state| seen.lock().push((mutation.clone(), state.clone()))
        },
        false,
    );

    store.patch_with(|state| {
        state["count"] = json!(1);
        state["a"] = json!({ "b": 5 });
    });

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let (mutation, state) = &seen[0];
    assert_eq!(mutation.kind, MutationKind::PatchFunction);
    assert_eq!(mutation.store_id, "counter");
    assert_eq!(mutation.events.len(), 2);
    assert_eq!(state["count"], json!(1));
}

#[test]
fn object_patch_carries_payload() {
    let store = counter_in(&Registry::new());
    let kinds = Arc::new(Mutex::new(Vec::new()));
    store.subscribe(
        {
            let kinds = kinds.clone();
            move |mutation, _| kinds.lock().push(mutation.kind.clone())
        },
        false,
    );

    store.patch(json!({ "count": 3 })).unwrap();

    assert_eq!(
        *kinds.lock(),
        vec![MutationKind::PatchObject {
            payload: json!({ "count": 3 })
        }]
    );
}

#[test]
fn events_are_empty_outside_dev_mode() {
    let store = counter_in(&Registry::with_config(RegistryConfig::default().with_dev_mode(false)));
    let events = Arc::new(AtomicUsize::new(usize::MAX));
    store.subscribe(
        {
            let events = events.clone();
            move |mutation, _| events.store(mutation.events.len(), Ordering::SeqCst)
        },
        false,
    );

    store.patch(json!({ "count": 1 })).unwrap();
    assert_eq!(events.load(Ordering::SeqCst), 0);
}

#[test]
fn unsubscribing_one_of_two() {
    let store = counter_in(&Registry::new());
    let (calls, bump) = count_calls();
    let bump = Arc::new(bump);

    let first = store.subscribe({ let bump = bump.clone(); move |_, _| bump() }, false);
    store.subscribe({ let bump = bump.clone(); move |_, _| bump() }, false);
    first.unsubscribe();
    first.unsubscribe();

    store.patch(json!({ "count": 1 })).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.subscription_count(), 1);
}

#[test]
fn subscribers_run_in_registration_order() {
    let store = counter_in(&Registry::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second", "third"] {
        let order = order.clone();
        store.subscribe(move |_, _| order.lock().push(tag), false);
    }

    store.set("count", json!(1)).unwrap();
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[test]
fn component_unmount_removes_attached_subscriptions() {
    let store = counter_in(&Registry::new());
    let component = Component::new("CounterView");
    let (attached, bump_attached) = count_calls();
    let (detached, bump_detached) = count_calls();

    component.run(|| {
        store.subscribe(move |_, _| bump_attached(), false);
        store.subscribe(move |_, _| bump_detached(), true);
    });

    store.patch(json!({ "count": 1 })).unwrap();
    component.unmount();
    store.patch(json!({ "count": 2 })).unwrap();

    assert_eq!(attached.load(Ordering::SeqCst), 1);
    assert_eq!(detached.load(Ordering::SeqCst), 2);
}

#[test]
fn sync_error_reaches_caller_and_hooks_once() {
    let store = counter_in(&Registry::new());
    let errors = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..2 {
        let errors = errors.clone();
        store.on_action(
            move |ctx| {
                let errors = errors.clone();
                ctx.on_error(move |error| errors.lock().push(error.downcast_ref::<Boom>().map(|b| b.0)));
            },
            false,
        );
    }

    let error = store.call("fail", vec![]).unwrap_err();

    assert_eq!(error.downcast_ref::<Boom>(), Some(&Boom(7)));
    assert_eq!(*errors.lock(), vec![Some(7), Some(7)]);
}

#[test]
fn listeners_see_pre_call_state_and_ready_values() {
    let store = counter_in(&Registry::new());
    let before = Arc::new(Mutex::new(Vec::new()));
    let after = Arc::new(Mutex::new(Vec::new()));
    store.on_action(
        {
            let before = before.clone();
            let after = after.clone();
            move |ctx| {
                before.lock().push((ctx.name().to_string(), ctx.store().get("count")));
                let after = after.clone();
                ctx.after(move |value| after.lock().push(value.clone()));
            }
        },
        false,
    );

    let returned = store.call("increment", vec![]).unwrap().into_ready();

    assert_eq!(returned, Some(json!(1)));
    assert_eq!(*before.lock(), vec![("increment".to_string(), Some(json!(0)))]);
    assert_eq!(*after.lock(), vec![json!(1)]);
}

#[test]
fn unknown_action_is_a_store_error() {
    let store = counter_in(&Registry::new());
    let error = store.call("nope", vec![]).unwrap_err();
    assert!(matches!(
        error.downcast_ref::<StoreError>(),
        Some(StoreError::UnknownAction { name, .. }) if name == "nope"
    ));
}

#[tokio::test]
async fn pending_action_settles_hooks_on_resolution() {
    let store = counter_in(&Registry::new());
    let after = Arc::new(Mutex::new(Vec::new()));
    store.on_action(
        {
            let after = after.clone();
            move |ctx| {
                let after = after.clone();
                ctx.after(move |value| after.lock().push(value.clone()));
            }
        },
        false,
    );

    let pending = store.call("fetch", vec![json!(4)]).unwrap();
    assert!(pending.is_pending());
    assert!(after.lock().is_empty());

    assert_eq!(pending.resolve().await.unwrap(), json!(40));
    assert_eq!(*after.lock(), vec![json!(40)]);
    assert_eq!(store.get("count"), Some(json!(4)));
}

#[tokio::test]
async fn pending_action_rejection_reaches_on_error() {
    let store = counter_in(&Registry::new());
    let (errors, bump) = count_calls();
    let bump = Arc::new(bump);
    store.on_action(
        move |ctx| {
            let bump = bump.clone();
            ctx.on_error(move |_| bump());
        },
        false,
    );

    let pending = store.call("fetch_fail", vec![]).unwrap();
    assert_eq!(errors.load(Ordering::SeqCst), 0);

    let error = pending.resolve().await.unwrap_err();
    assert_eq!(error.downcast_ref::<Boom>(), Some(&Boom(9)));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[test]
fn removed_action_listener_is_not_called() {
    let store = counter_in(&Registry::new());
    let (calls, bump) = count_calls();
    let listener = store.on_action(move |_| bump(), true);

    let _ = store.call("increment", vec![]).unwrap();
    listener.unsubscribe();
    let _ = store.call("increment", vec![]).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn hydration_applies_initial_state() {
    let registry = Registry::new();
    registry.set_initial_state("counter", json!({ "count": 5 }));
    let (calls, bump) = count_calls();

    let store = counter_in(&registry);
    store.subscribe(move |_, _| bump(), false);

    assert_eq!(store.get("count"), Some(json!(5)));
    assert_eq!(store.get("a"), Some(json!({ "b": 0 })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn custom_hydrate_replaces_default_merge() {
    let registry = Registry::new();
    registry
        .hydrate_from(json!({ "custom": { "count": 5 } }))
        .unwrap();
    let store = define_store(
        OptionsStore::new("custom")
            .state(|| json!({ "count": 0 }))
            .hydrate(|store, initial| {
                let count = initial["count"].as_i64().unwrap_or(0);
                store.set("count", json!(count * 100)).unwrap();
            }),
    )
    .use_store_in(&registry)
    .unwrap();

    assert_eq!(store.get("count"), Some(json!(500)));
    assert!(store.options().has_custom_hydrate());
}

#[test]
fn plugins_extend_every_store() {
    let registry = Registry::new();
    let early = define_store(OptionsStore::new("early").state(|| json!({ "count": 1 })))
        .use_store_in(&registry)
        .unwrap();

    registry.use_plugin(|ctx| {
        Extensions::new()
            .property("from", json!(ctx.options.id()))
            .method("double", |store, _args| {
                json!(store.get("count").and_then(|c| c.as_i64()).unwrap_or(0) * 2)
            })
    });
    registry.use_plugin(|_| Extensions::new().property("from", json!("second")));

    let store = counter_in(&registry);
    store.set("count", json!(21)).unwrap();

    assert_eq!(store.call_method("double", &[]).unwrap(), json!(42));
    assert_eq!(early.call_method("double", &[]).unwrap(), json!(2));
    assert_eq!(store.property("from"), Some(json!("second")));
    assert_eq!(store.custom_properties(), vec!["from", "double"]);
    assert!(matches!(
        store.call_method("triple", &[]),
        Err(StoreError::UnknownMethod { .. })
    ));
}

#[test]
fn plugins_run_before_hydration_and_see_options() {
    let registry = Registry::new();
    registry.set_initial_state("counter", json!({ "count": 8 }));
    let seen = Arc::new(Mutex::new(None));
    registry.use_plugin({
        let seen = seen.clone();
        move |ctx| {
            *seen.lock() = Some((ctx.store.get("count"), ctx.options.actions().to_vec()));
            Extensions::new()
        }
    });

    counter_in(&registry);

    let (count, actions) = seen.lock().clone().unwrap();
    assert_eq!(count, Some(json!(0)));
    assert_eq!(actions, vec!["increment", "fail", "fetch", "fetch_fail"]);
}

#[test]
fn setup_store_classifies_members() {
    let registry = Registry::new();
    let use_timer = define_setup_store("timer", || {
        let ticks = Signal::new(json!(0));
        let doubled = create_memo({
            let ticks = ticks.clone();
            move || json!(ticks.get().as_i64().unwrap_or(0) * 2)
        });
        let tick = Action::sync({
            let ticks = ticks.clone();
            move |_store, _args| {
                ticks.update(|n| *n = json!(n.as_i64().unwrap_or(0) + 1));
                Ok(ticks.get())
            }
        });
        SetupStore::new()
            .state("ticks", ticks)
            .getter("doubled", doubled)
            .action("tick", tick)
    });

    let store = use_timer.use_store_in(&registry).unwrap();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    store.subscribe(
        {
            let kinds = kinds.clone();
            move |mutation, _| kinds.lock().push(mutation.kind.clone())
        },
        false,
    );

    let _ = store.call("tick", vec![]).unwrap();
    let _ = store.call("tick", vec![]).unwrap();

    assert_eq!(store.get("ticks"), Some(json!(2)));
    assert_eq!(store.getter("doubled"), Some(json!(4)));
    assert_eq!(store.action_names(), vec!["tick"]);
    assert_eq!(*kinds.lock(), vec![MutationKind::Direct, MutationKind::Direct]);

    // the store's field is the cell the setup function returned
    store.patch(json!({ "ticks": 10 })).unwrap();
    assert_eq!(store.getter("doubled"), Some(json!(20)));
}

#[test]
fn setup_store_options_reach_plugins() {
    let registry = Registry::new();
    registry.use_plugin(|ctx| match ctx.options.option("persist") {
        Some(key) => Extensions::new().property("persist_key", key.clone()),
        None => Extensions::new(),
    });

    let store = define_setup_store_with(
        "prefs",
        || SetupStore::new().state("theme", Signal::new(json!("dark"))),
        SetupOptions::new().option("persist", json!("prefs-v1")),
    )
    .use_store_in(&registry)
    .unwrap();

    assert_eq!(store.property("persist_key"), Some(json!("prefs-v1")));
    assert!(matches!(store.reset(), Err(StoreError::ResetUnsupported { .. })));
}

#[test]
fn setup_runs_once_per_registry() {
    let (runs, bump) = count_calls();
    let def = define_setup_store("once", move || {
        bump();
        SetupStore::new().state("n", Signal::new(json!(0)))
    });

    let registry = Registry::new();
    def.use_store_in(&registry).unwrap();
    def.use_store_in(&registry).unwrap();
    def.use_store_in(&Registry::new()).unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn registry_dispose_stops_store_effects() {
    let registry = Registry::new();
    let store = counter_in(&registry);
    let field = store.field("count").unwrap();
    let (calls, bump) = count_calls();
    store.subscribe(move |_, _| bump(), true);

    registry.dispose();
    field.set(json!(3));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(registry.runtime().observer_count(), 0);
}

#[test]
fn concurrent_retrieval_builds_the_store_once() {
    let (setups, bump_setup) = count_calls();
    let def = define_setup_store("shared", move || {
        bump_setup();
        // keep the first builder busy while the other thread looks the id up
        std::thread::sleep(std::time::Duration::from_millis(20));
        SetupStore::new().state("n", Signal::new(json!(0)))
    });
    let registry = Registry::new();
    let (plugins, bump_plugin) = count_calls();
    registry.use_plugin(move |_| {
        bump_plugin();
        Extensions::new()
    });
    registry.set_initial_state("shared", json!({ "n": 5 }));

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let def = def.clone();
            let registry = registry.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                def.use_store_in(&registry).unwrap()
            })
        })
        .collect();
    let stores: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(stores[0].ptr_eq(&stores[1]));
    assert_eq!(setups.load(Ordering::SeqCst), 1);
    assert_eq!(plugins.load(Ordering::SeqCst), 1);
    assert_eq!(stores[0].get("n"), Some(json!(5)));
    // one watcher for the one store
    assert_eq!(registry.runtime().observer_count(), 1);
}

#[test]
fn setup_state_from_another_runtime_is_rejected() {
    let outside = Signal::new(json!(0));
    let def = define_setup_store("foreign", move || {
        SetupStore::new().state("n", outside.clone())
    });
    let registry = Registry::new();

    assert!(matches!(
        def.use_store_in(&registry),
        Err(StoreError::ForeignCell { key, .. }) if key == "n"
    ));
    assert!(!registry.has_store("foreign"));
    assert_eq!(registry.runtime().observer_count(), 0);
}

#[test]
fn dropped_pending_action_never_runs() {
    let store = counter_in(&Registry::new());
    let (afters, bump) = count_calls();
    let bump = Arc::new(bump);
    store.on_action(
        move |ctx| {
            let bump = bump.clone();
            ctx.after(move |_| bump());
        },
        true,
    );

    drop(store.call("fetch", vec![json!(99)]).unwrap());

    assert_eq!(store.get("count"), Some(json!(0)));
    assert_eq!(afters.load(Ordering::SeqCst), 0);
}

#[test]
fn action_call_restores_the_active_registry() {
    pantry::clear_active_registry();
    let registry = Registry::new();
    let def = define_store(OptionsStore::new("ambient").action(
        "which",
        Action::sync(|store, _| {
            let active = pantry::active_registry()?;
            Ok(json!(store.registry().is_some_and(|r| r.ptr_eq(&active))))
        }),
    ));
    let store = def.use_store_in(&registry).unwrap();

    let inside = store.call("which", vec![]).unwrap().into_ready();

    assert_eq!(inside, Some(json!(true)));
    assert!(matches!(pantry::active_registry(), Err(StoreError::NoActiveRegistry)));
}
