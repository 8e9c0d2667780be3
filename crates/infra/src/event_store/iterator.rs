use esdoc_core::{StoreError, StoreResult};
use esdoc_events::{Event, EventIterator};

use crate::collections::{
    FIELD_AGG_ID, FIELD_DATA, FIELD_GLOBAL_VERSION, FIELD_METADATA, FIELD_REASON, FIELD_TIMESTAMP,
    FIELD_VERSION,
};
use crate::document_store::Record;

/// Cursor over fetched event rows.
///
/// The whole result set is held in memory. Rows are decoded one at a time in
/// `current`, so a malformed row fails only the position it sits at.
#[derive(Debug)]
pub struct RecordIterator {
    aggregate_type: String,
    records: Vec<Record>,
    position: Option<usize>,
}

impl RecordIterator {
    pub fn new(aggregate_type: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            records,
            position: None,
        }
    }

    /// Rows not yet passed by `advance`, counting the current one.
    pub fn remaining(&self) -> usize {
        match self.position {
            None => self.records.len(),
            Some(p) => self.records.len().saturating_sub(p),
        }
    }
}

impl EventIterator for RecordIterator {
    fn advance(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.records.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.records.len());
            false
        }
    }

    fn current(&self) -> StoreResult<Event> {
        let record = self
            .position
            .and_then(|p| self.records.get(p))
            .ok_or_else(|| StoreError::not_found("iterator is not positioned on an event"))?;
        decode_event(record, &self.aggregate_type)
    }

    fn release(&mut self) {
        self.records = Vec::new();
        self.position = None;
    }
}

/// Event stored in `record`. The type is not stored per row; the collection implies it.
pub fn decode_event(record: &Record, aggregate_type: &str) -> StoreResult<Event> {
    Ok(Event {
        aggregate_id: record.get_str(FIELD_AGG_ID)?.to_string(),
        aggregate_type: aggregate_type.to_string(),
        version: record.get_u64(FIELD_VERSION)?,
        global_version: record.get_u64(FIELD_GLOBAL_VERSION)?,
        reason: record.get_str(FIELD_REASON)?.to_string(),
        timestamp: record.get_datetime(FIELD_TIMESTAMP)?,
        data: record.get_json(FIELD_DATA),
        metadata: record.get_json(FIELD_METADATA),
    })
}

/// New row for `event` in the collection `collection`.
pub fn encode_event(collection: &str, event: &Event) -> Record {
    let mut record = Record::new(collection);
    record
        .set(FIELD_AGG_ID, event.aggregate_id.as_str())
        .set(FIELD_VERSION, event.version)
        .set(FIELD_GLOBAL_VERSION, event.global_version)
        .set(FIELD_REASON, event.reason.as_str())
        .set_datetime(FIELD_TIMESTAMP, event.timestamp)
        .set(FIELD_DATA, event.data.clone())
        .set(FIELD_METADATA, event.metadata.clone());
    record
}
