use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use esdoc_core::StoreResult;

/// An immutable fact in an aggregate's history.
///
/// Events are:
/// - **versioned per aggregate**: `version` starts at 1 and increases by exactly 1
/// - **globally ordered**: `global_version` is assigned by the store at append and
///   is strictly increasing across every aggregate and type
/// - **append-only**: never mutated or deleted once stored
///
/// `version` is the caller's intent; the store validates it against the stored
/// stream. `global_version` is ignored on input and overwritten on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub version: u64,
    pub global_version: u64,
    /// Event kind, e.g. `"OrderPlaced"`.
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub data: JsonValue,
    pub metadata: JsonValue,
}

impl Event {
    pub fn new(
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        version: u64,
        reason: impl Into<String>,
        data: JsonValue,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            version,
            global_version: 0,
            reason: reason.into(),
            timestamp: Utc::now(),
            data,
            metadata: JsonValue::Null,
        }
    }

    /// Serialize a typed payload into a new event.
    pub fn from_typed<E>(
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        version: u64,
        reason: impl Into<String>,
        payload: &E,
    ) -> StoreResult<Self>
    where
        E: Serialize,
    {
        let data = serde_json::to_value(payload)?;
        Ok(Self::new(aggregate_id, aggregate_type, version, reason, data))
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
