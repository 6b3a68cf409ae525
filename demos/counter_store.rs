//! Demonstration of a todo store with subscriptions, actions and a plugin

use pantry::{define_store, Action, Extensions, OptionsStore, Registry};
use serde_json::{json, Value};

fn main() -> anyhow::Result<()> {
    println!("=== Store Example: Todo App ===\n");

    let use_todos = define_store(
        OptionsStore::new("todos")
            .state(|| json!({ "todos": [], "filter": "all" }))
            .getter("stats", |store| {
                let todos = store.get("todos").unwrap_or(Value::Null);
                let todos = todos.as_array().cloned().unwrap_or_default();
                let completed = todos.iter().filter(|t| t["completed"] == json!(true)).count();
                json!({ "total": todos.len(), "active": todos.len() - completed, "completed": completed })
            })
            .action(
                "add_todo",
                Action::sync(|store, args| {
                    let title = args.into_iter().next().unwrap_or_default();
                    store.patch_with(|state| {
                        if let Some(todos) = state["todos"].as_array_mut() {
                            let id = todos.len();
                            todos.push(json!({ "id": id, "title": title, "completed": false }));
                        }
                    });
                    Ok(Value::Null)
                }),
            )
            .action(
                "toggle_todo",
                Action::sync(|store, args| {
                    let id = args.first().and_then(Value::as_u64);
                    store.patch_with(|state| {
                        let todos = state["todos"].as_array_mut().into_iter().flatten();
                        for todo in todos.filter(|t| t["id"].as_u64() == id) {
                            let done = todo["completed"].as_bool().unwrap_or(false);
                            todo["completed"] = json!(!done);
                        }
                    });
                    Ok(Value::Null)
                }),
            ),
    );

    let registry = Registry::new();
    registry.use_plugin(|ctx| {
        let id = ctx.store.id().to_string();
        Extensions::new().method("describe", move |store, _| {
            json!(format!("{} with {} fields", id, store.keys().len()))
        })
    });

    let store = use_todos.use_store_in(&registry)?;

    println!("1. Setting up subscriber");
    store.subscribe(
        |mutation, _state| println!("   [Store Update] {}", mutation.kind.as_str()),
        true,
    );
    store.on_action(|ctx| println!("   [Action] {}({:?})", ctx.name(), ctx.args()), true);

    println!("\n2. Adding todos");
    for title in ["Learn Rust", "Build reactive library", "Write documentation"] {
        let _ = store.call("add_todo", vec![json!(title)])?;
    }

    println!("\n3. Completing first todo");
    let _ = store.call("toggle_todo", vec![json!(0)])?;

    println!("\n4. Filtering to show only active todos");
    store.patch(json!({ "filter": "active" }))?;

    println!("\n5. Statistics: {}", store.getter("stats").unwrap_or(Value::Null));
    println!("   Plugin says: {}", store.call_method("describe", &[])?);
    println!("   Snapshot: {}", registry.state());

    println!("\n✓ Example complete!");
    Ok(())
}
