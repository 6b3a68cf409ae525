use serde::Serialize;
use serde_json::Value;

/// How a committed mutation was produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationKind {
    /// A state cell was written outside of a patch, or the whole state was
    /// replaced.
    Direct,
    /// `patch` with a partial state object.
    PatchObject { payload: Value },
    /// `patch_with` with a mutator function.
    PatchFunction,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Direct => "direct",
            MutationKind::PatchObject { .. } => "patch object",
            MutationKind::PatchFunction => "patch function",
        }
    }
}

/// A field-level change seen while a mutation was in flight.
///
/// Diagnostic only: how many events one mutation produces depends on how
/// the runtime propagates writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateEvent {
    pub key: String,
    pub source: usize,
}

/// Descriptor handed to subscribers together with the resulting state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Mutation {
    pub store_id: String,
    #[serde(flatten)]
    pub kind: MutationKind,
    /// Collected only when the registry runs in dev mode.
    pub events: Vec<StateEvent>,
}
