//! Named stores built on top of the signal layer.
//!
//! A store owns one reactive cell per state field, a set of memoized
//! getters and a set of actions. Every mutation is reported to subscribers
//! exactly once, patches included, and every action call goes through the
//! store's action listeners.

mod action;
mod builder;
mod definition;
mod listeners;
mod mutation;
pub mod patch;
#[allow(clippy::module_inception)]
mod store;

pub use action::{Action, ActionContext, ActionListener, ActionReturn};
pub(crate) use builder::build;
pub use definition::{
    define_setup_store, define_setup_store_with, define_store, OptionsStore, SetupEntry,
    SetupOptions, SetupStore, StoreDefinition, StoreKind, StoreOptions,
};
pub use listeners::Unsubscribe;
pub use mutation::{Mutation, MutationKind, StateEvent};
pub use store::{Store, SubscriptionCallback};
