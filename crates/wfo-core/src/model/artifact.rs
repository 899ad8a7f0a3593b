//! A byte-producing record of a step's work.
//!
//! `Artifact.path` is backend-relative (a relative path for the filesystem
//! store, an opaque URI for the relational store's companion object store);
//! the core never reads or writes the bytes it names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A blob produced by a step, referenced by URI rather than embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub step_id: Uuid,
    /// MIME-like type, e.g. `"text/x-diff"` or `"application/json"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    #[serde(default = "Value::default")]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Row shape returned by `Store::list_artifacts_by_run`, which joins against
/// `steps` so callers don't need a second lookup to label artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactWithStepName {
    #[serde(flatten)]
    pub artifact: Artifact,
    pub step_name: String,
}
