//! Ports consumed by the event-sourcing runtime.

use std::sync::Arc;

use esdoc_core::StoreResult;

use crate::{Event, EventIterator, Snapshot};

/// Append-only event persistence, partitioned by aggregate type.
///
/// ## Append Semantics
///
/// `append()`:
/// - succeeds without touching storage on an empty batch
/// - expects every event to share one aggregate id and type
/// - requires the first event's version to be `stored_version + 1`,
///   otherwise fails with `StoreError::Concurrency` and writes nothing
/// - assigns a contiguous block of global versions in batch order
/// - persists the whole batch atomically
///
/// ## Read Semantics
///
/// `read()` returns every event of the aggregate with `version > after_version`,
/// ascending, fully buffered in the returned cursor.
pub trait EventStore: Send + Sync {
    fn append(&self, events: Vec<Event>) -> StoreResult<()>;

    fn read(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        after_version: u64,
    ) -> StoreResult<Box<dyn EventIterator>>;
}

/// Latest-state snapshot persistence.
///
/// `get()` returns `Ok(None)` when no snapshot exists yet. `put()` creates or
/// overwrites; it does not compare against the event stream's version.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, aggregate_id: &str, aggregate_type: &str) -> StoreResult<Option<Snapshot>>;

    fn put(&self, snapshot: &Snapshot) -> StoreResult<()>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(&self, events: Vec<Event>) -> StoreResult<()> {
        (**self).append(events)
    }

    fn read(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        after_version: u64,
    ) -> StoreResult<Box<dyn EventIterator>> {
        (**self).read(aggregate_id, aggregate_type, after_version)
    }
}

impl<S> SnapshotStore for Arc<S>
where
    S: SnapshotStore + ?Sized,
{
    fn get(&self, aggregate_id: &str, aggregate_type: &str) -> StoreResult<Option<Snapshot>> {
        (**self).get(aggregate_id, aggregate_type)
    }

    fn put(&self, snapshot: &Snapshot) -> StoreResult<()> {
        (**self).put(snapshot)
    }
}
