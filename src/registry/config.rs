use serde::{Deserialize, Serialize};

/// Registry settings.
///
/// Deserializable so it can be embedded in an application's own config
/// file; missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Collect field-level trigger events into mutation descriptors.
    /// Defaults to on in debug builds.
    pub dev_mode: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dev_mode: cfg!(debug_assertions),
        }
    }
}

impl RegistryConfig {
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }
}
