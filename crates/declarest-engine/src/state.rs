//! The persisted snapshot of a reconciled resource.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the host stores between reconciliations.
///
/// `id` is derived once at create time and is opaque afterwards: it is the
/// request path that addresses this resource. `body` is the normalized
/// body the caller declared; `output` is the last full body the remote
/// returned. `query` and `header` carry whatever extra addressing the
/// resource needs on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,

    /// The path the resource was created under; `$(path)` and `trim_path`
    /// resolve against it.
    pub path: String,

    #[serde(default)]
    pub body: Value,

    #[serde(default)]
    pub output: Value,

    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub header: BTreeMap<String, String>,
}

impl ResourceState {
    /// A fresh state with no body yet.
    #[must_use]
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            body: Value::Null,
            output: Value::Null,
            query: BTreeMap::new(),
            header: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
