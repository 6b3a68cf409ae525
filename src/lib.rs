//! # Pantry
//!
//! Named reactive stores for Rust applications.
//!
//! Pantry is built in two layers:
//!
//! ## Signals (Low-level primitives)
//!
//! Fine-grained reactive primitives the stores are made of:
//! - `Signal<T>` - Reactive cells that notify dependents when changed
//! - `Memo<T>` - Computed values that automatically track dependencies
//! - `Effect` - Side effects that run when dependencies change
//! - `EffectScope` - Stops a group of effects at once
//!
//! ## Stores (High-level state management)
//!
//! - `Store` - Named state with getters and actions, built from a
//!   declarative definition or a setup function
//! - `patch` / `patch_with` - Atomic updates observed as one mutation
//! - `subscribe` / `on_action` - Hooks for devtools, persistence, logging
//! - `Registry` - One instance per store id, plugins, hydration
//!
//! ```
//! use pantry::{define_store, Action, OptionsStore, Registry};
//! use serde_json::json;
//!
//! let use_todos = define_store(
//!     OptionsStore::new("todos")
//!         .state(|| json!({ "items": [], "filter": { "done": false } }))
//!         .action("add", Action::sync(|store, args| {
//!             let title = args.into_iter().next().unwrap_or_default();
//!             store.patch_with(|state| {
//!                 if let Some(items) = state["items"].as_array_mut() {
//!                     items.push(title);
//!                 }
//!             });
//!             Ok(json!(null))
//!         })),
//! );
//!
//! let registry = Registry::new();
//! let todos = use_todos.use_store_in(&registry).unwrap();
//! let _ = todos.call("add", vec![json!("write docs")]).unwrap();
//! todos.patch(json!({ "filter": { "done": true } })).unwrap();
//!
//! assert_eq!(
//!     todos.state(),
//!     json!({ "items": ["write docs"], "filter": { "done": true } })
//! );
//! ```

pub mod error;
pub mod registry;
pub mod runtime;
pub mod signal;
pub mod store;

// Re-export main types for convenience
pub use error::{Result, StoreError};
pub use registry::{
    active_registry, clear_active_registry, set_active_registry, App, Extension, Extensions,
    PluginContext, Registry, RegistryConfig,
};
pub use runtime::{Component, EffectScope};
pub use signal::{create_effect, create_memo, Effect, Memo, Signal};
pub use store::{
    define_setup_store, define_setup_store_with, define_store, Action, ActionContext,
    ActionReturn, Mutation, MutationKind, OptionsStore, SetupOptions, SetupStore, Store,
    StoreDefinition, Unsubscribe,
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_works() {
        // Basic smoke test
        let registry = Registry::new();
        let store = define_store(OptionsStore::new("smoke").state(|| json!({ "n": 0 })))
            .use_store_in(&registry)
            .unwrap();
        store.set("n", json!(42)).unwrap();
        assert_eq!(store.get("n"), Some(json!(42)));
    }
}
