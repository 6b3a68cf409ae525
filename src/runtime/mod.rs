//! Runtime support for reactive primitives.
//!
//! This module provides the infrastructure for dependency tracking,
//! effect scopes and the component lifecycle stores hook into.

mod component;
mod context;
mod scope;

pub use component::{on_unmounted, Component};
pub use context::{ReactiveRuntime, TriggerEvent};
pub use scope::EffectScope;
