use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Materialized aggregate state at a known version.
///
/// At most one snapshot exists per `(id, aggregate_type)`; saving again
/// overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub aggregate_type: String,
    pub version: u64,
    pub global_version: u64,
    pub state: JsonValue,
}

impl Snapshot {
    pub fn new(
        id: impl Into<String>,
        aggregate_type: impl Into<String>,
        version: u64,
        global_version: u64,
        state: JsonValue,
    ) -> Self {
        Self {
            id: id.into(),
            aggregate_type: aggregate_type.into(),
            version,
            global_version,
            state,
        }
    }
}
