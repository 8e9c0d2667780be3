//! Document-store backed event store.
//!
//! ## Append
//!
//! `append()` resolves the type's storage unit, then in one transaction:
//! 1. Reads the latest stored version for the aggregate (0 when none)
//! 2. Requires the batch to start at `stored + 1`
//! 3. Allocates one global version per event from the shared counter
//! 4. Writes every event row
//!
//! A conflict or any write failure aborts the transaction, so nothing from the
//! batch is visible afterwards, including the global versions it would have used.
//!
//! ## Isolation
//!
//! The version check is a read followed by writes. Two appenders for the same
//! aggregate are kept apart only by the store's transaction isolation; the
//! `agg_id` index is not unique and does not catch duplicate versions. Back this
//! with a store that serializes conflicting transactions.

use std::sync::Arc;

use tracing::{Span, field, instrument};

use esdoc_core::{ExpectedVersion, StoreConfig, StoreError, StoreResult};
use esdoc_events::{Event, EventIterator, EventStore};

use super::iterator::{RecordIterator, encode_event};
use crate::collections::{FIELD_AGG_ID, FIELD_VERSION};
use crate::document_store::{DocumentStore, Filter, Query, RecordStore, Sort};
use crate::router::AggregateTypeRouter;
use crate::sequence::{GLOBAL_VERSION_SEQUENCE, SequenceAllocator};

/// Event store over per-type document collections.
pub struct DocEventStore<S> {
    router: Arc<AggregateTypeRouter<S>>,
    sequence: Arc<SequenceAllocator<S>>,
}

impl<S> DocEventStore<S>
where
    S: DocumentStore,
{
    pub fn new(store: Arc<S>, config: &StoreConfig) -> Self {
        let router = Arc::new(AggregateTypeRouter::new(Arc::clone(&store), config));
        Self::with_router(router)
    }

    /// Share an existing router, e.g. with a `DocSnapshotStore`.
    ///
    /// The global version counter comes from the router, so every store on one
    /// router bootstraps it once.
    pub fn with_router(router: Arc<AggregateTypeRouter<S>>) -> Self {
        let sequence = Arc::clone(router.sequence());
        Self { router, sequence }
    }

    pub fn router(&self) -> &Arc<AggregateTypeRouter<S>> {
        &self.router
    }

    pub fn sequence(&self) -> &Arc<SequenceAllocator<S>> {
        &self.sequence
    }

    /// Append a batch for one aggregate and return it with global versions assigned.
    ///
    /// An empty batch succeeds without touching the store.
    #[instrument(
        skip(self, events),
        fields(
            operation = field::Empty,
            aggregate_id = field::Empty,
            aggregate_type = field::Empty,
            event_count = events.len(),
            committed_events = field::Empty,
            first_global_version = field::Empty
        ),
        err
    )]
    pub fn append(&self, mut events: Vec<Event>) -> StoreResult<Vec<Event>> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let span = Span::current();
        span.record("operation", "append");

        validate_batch(&events)?;
        let aggregate_id = events[0].aggregate_id.clone();
        let expected = ExpectedVersion::preceding(events[0].version);
        span.record("aggregate_id", aggregate_id.as_str());
        span.record("aggregate_type", events[0].aggregate_type.as_str());

        let unit = self.router.resolve(&events[0].aggregate_type)?;
        self.sequence.init()?;

        let committed = self.router.store().run_in_transaction(|tx| {
            let stored = latest_version(tx, &unit.events.id, &aggregate_id)?;
            expected.check(stored)?;

            let global_versions =
                self.sequence
                    .next_batch_in(tx, GLOBAL_VERSION_SEQUENCE, events.len())?;
            for (event, global_version) in events.iter_mut().zip(global_versions) {
                event.global_version = global_version;
                let mut record = encode_event(&unit.events.id, event);
                tx.save_record(&mut record)?;
            }
            Ok(events)
        })?;

        span.record("committed_events", committed.len());
        if let Some(first) = committed.first() {
            span.record("first_global_version", first.global_version);
        }
        Ok(committed)
    }

    /// Events of one aggregate with `version > after_version`, ascending.
    #[instrument(
        skip(self),
        fields(operation = field::Empty, event_count = field::Empty),
        err
    )]
    pub fn read(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        after_version: u64,
    ) -> StoreResult<RecordIterator> {
        let span = Span::current();
        span.record("operation", "read");

        let unit = self.router.resolve(aggregate_type)?;
        let query = Query::filter(
            Filter::eq(FIELD_AGG_ID, aggregate_id).and(Filter::gt(FIELD_VERSION, after_version)),
        )
        .sort(Sort::asc(FIELD_VERSION));
        let records = self.router.store().find_records(&unit.events.id, &query)?;

        span.record("event_count", records.len());
        Ok(RecordIterator::new(aggregate_type, records))
    }

    /// Latest stored version of the aggregate; 0 when it has no events.
    pub fn current_version(&self, aggregate_id: &str, aggregate_type: &str) -> StoreResult<u64> {
        let unit = self.router.resolve(aggregate_type)?;
        latest_version(&**self.router.store(), &unit.events.id, aggregate_id)
    }
}

impl<S> EventStore for DocEventStore<S>
where
    S: DocumentStore,
{
    fn append(&self, events: Vec<Event>) -> StoreResult<()> {
        DocEventStore::append(self, events).map(|_| ())
    }

    fn read(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        after_version: u64,
    ) -> StoreResult<Box<dyn EventIterator>> {
        let events = DocEventStore::read(self, aggregate_id, aggregate_type, after_version)?;
        Ok(Box::new(events))
    }
}

fn latest_version<R>(records: &R, collection: &str, aggregate_id: &str) -> StoreResult<u64>
where
    R: RecordStore + ?Sized,
{
    let query = Query::filter(Filter::eq(FIELD_AGG_ID, aggregate_id)).sort(Sort::desc(FIELD_VERSION));
    match records.find_first(collection, &query)? {
        Some(record) => record.get_u64(FIELD_VERSION),
        None => Ok(0),
    }
}

/// One aggregate per batch, with versions contiguous inside the batch.
fn validate_batch(events: &[Event]) -> StoreResult<()> {
    let Some(first) = events.first() else {
        return Ok(());
    };
    for (idx, event) in events.iter().enumerate() {
        if event.aggregate_id != first.aggregate_id {
            return Err(StoreError::configuration(format!(
                "batch contains multiple aggregate ids (index {idx})"
            )));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(StoreError::configuration(format!(
                "batch contains multiple aggregate types (index {idx})"
            )));
        }
        let expected = first.version.checked_add(idx as u64);
        if expected != Some(event.version) {
            return Err(StoreError::configuration(format!(
                "batch versions are not contiguous at index {idx}: {} follows {}",
                event.version, first.version
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;
    use esdoc_events::EventIterator;
    use serde_json::json;

    fn store() -> (Arc<InMemoryDocumentStore>, DocEventStore<InMemoryDocumentStore>) {
        let backing = Arc::new(InMemoryDocumentStore::new());
        let events = DocEventStore::new(Arc::clone(&backing), &StoreConfig::default());
        (backing, events)
    }

    fn event(id: &str, version: u64) -> Event {
        Event::new(id, "Order", version, "OrderTouched", json!({ "v": version }))
    }

    fn versions(mut it: RecordIterator) -> Vec<u64> {
        let mut out = Vec::new();
        while it.advance() {
            out.push(it.current().unwrap().version);
        }
        it.release();
        out
    }

    #[test]
    fn empty_batch_touches_nothing() {
        let (backing, events) = store();
        assert!(events.append(Vec::new()).unwrap().is_empty());
        assert_eq!(backing.schema_stats().created, 0);
    }

    #[test]
    fn append_assigns_contiguous_global_versions() {
        let (_, events) = store();
        let committed = events
            .append(vec![event("a-1", 1), event("a-1", 2), event("a-1", 3)])
            .unwrap();
        let globals: Vec<u64> = committed.iter().map(|e| e.global_version).collect();
        assert_eq!(globals, vec![1, 2, 3]);
        assert_eq!(events.current_version("a-1", "Order").unwrap(), 3);
    }

    #[test]
    fn read_filters_by_aggregate_and_after_version() {
        let (_, events) = store();
        events.append(vec![event("a-1", 1), event("a-1", 2)]).unwrap();
        events.append(vec![event("b-1", 1)]).unwrap();
        events.append(vec![event("a-1", 3)]).unwrap();

        assert_eq!(versions(events.read("a-1", "Order", 0).unwrap()), vec![1, 2, 3]);
        assert_eq!(versions(events.read("a-1", "Order", 2).unwrap()), vec![3]);
        assert!(versions(events.read("a-1", "Order", 3).unwrap()).is_empty());
        assert!(versions(events.read("zzz", "Order", 0).unwrap()).is_empty());
    }

    #[test]
    fn conflict_writes_nothing() {
        let (backing, events) = store();
        events.append(vec![event("a-1", 1)]).unwrap();

        let err = events.append(vec![event("a-1", 1), event("a-1", 2)]).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(backing.record_count("order").unwrap(), 1);

        // The aborted batch did not consume global versions.
        let next = events.append(vec![event("a-1", 2)]).unwrap();
        assert_eq!(next[0].global_version, 2);
    }

    #[test]
    fn version_zero_always_conflicts() {
        let (_, events) = store();
        let err = events.append(vec![event("a-1", 0)]).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[test]
    fn malformed_batches_are_configuration_errors() {
        let (backing, events) = store();

        let gap = events.append(vec![event("a-1", 1), event("a-1", 3)]);
        assert!(matches!(gap, Err(StoreError::Configuration(_))));

        let mixed_ids = events.append(vec![event("a-1", 1), event("b-1", 2)]);
        assert!(matches!(mixed_ids, Err(StoreError::Configuration(_))));

        let mut other_type = event("a-1", 2);
        other_type.aggregate_type = "Invoice".into();
        let mixed_types = events.append(vec![event("a-1", 1), other_type]);
        assert!(matches!(mixed_types, Err(StoreError::Configuration(_))));

        assert_eq!(backing.schema_stats().created, 0);
    }

    #[test]
    fn data_and_metadata_round_trip() {
        let (_, events) = store();
        let original = event("a-1", 1).with_metadata(json!({ "actor": "u-7" }));
        events.append(vec![original.clone()]).unwrap();

        let mut it = events.read("a-1", "Order", 0).unwrap();
        assert!(it.advance());
        let stored = it.current().unwrap();
        assert_eq!(stored.data, original.data);
        assert_eq!(stored.metadata, original.metadata);
        assert_eq!(stored.timestamp, original.timestamp);
        assert_eq!(stored.reason, "OrderTouched");
    }

    #[test]
    fn port_returns_boxed_cursor() {
        let (_, events) = store();
        let port: &dyn EventStore = &events;
        port.append(vec![event("a-1", 1), event("a-1", 2)]).unwrap();

        let read: Vec<u64> = port
            .read("a-1", "Order", 0)
            .unwrap()
            .into_events()
            .map(|e| e.unwrap().version)
            .collect();
        assert_eq!(read, vec![1, 2]);
    }
}
