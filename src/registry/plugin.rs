//! Plugins extend every store of a registry with extra properties and methods.

use super::{App, Registry};
use crate::store::{Store, StoreOptions};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Method contributed by a plugin. Receives the store it is called on.
pub type Method = Arc<dyn Fn(&Store, &[Value]) -> Value + Send + Sync>;

/// A plugin-contributed member.
#[derive(Clone)]
pub enum Extension {
    Property(Value),
    Method(Method),
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extension::Property(value) => f.debug_tuple("Property").field(value).finish(),
            Extension::Method(_) => f.write_str("Method(..)"),
        }
    }
}

/// Members a plugin returns for one store.
#[derive(Clone, Debug, Default)]
pub struct Extensions {
    entries: IndexMap<String, Extension>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.entries.insert(name.into(), Extension::Property(value));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Store, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.entries
            .insert(name.into(), Extension::Method(Arc::new(method)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl IntoIterator for Extensions {
    type Item = (String, Extension);
    type IntoIter = indexmap::map::IntoIter<String, Extension>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// What a plugin gets for each store.
pub struct PluginContext<'a> {
    pub store: &'a Store,
    pub app: Option<&'a App>,
    pub registry: &'a Registry,
    pub options: &'a StoreOptions,
}

pub type Plugin = Arc<dyn Fn(&PluginContext<'_>) -> Extensions + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_entries_replace_earlier_ones() {
        let extensions = Extensions::new()
            .property("flag", json!(1))
            .method("flag", |_, _| json!(2))
            .property("other", json!(3));

        let names: Vec<String> = extensions.clone().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["flag", "other"]);
        assert_eq!(extensions.len(), 2);
    }
}
