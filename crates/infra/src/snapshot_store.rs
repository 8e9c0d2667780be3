//! Latest-state snapshots, one row per aggregate.

use std::sync::Arc;

use tracing::{Span, field, instrument};

use esdoc_core::StoreResult;
use esdoc_events::{Snapshot, SnapshotStore};

use crate::collections::{FIELD_AGG_ID, FIELD_GLOBAL_VERSION, FIELD_STATE, FIELD_VERSION};
use crate::document_store::{DocumentStore, Filter, Query, Record};
use crate::router::AggregateTypeRouter;

/// Snapshot store over `<type>_snap` collections.
///
/// The snapshot collection belongs to the router's storage unit for the type,
/// so events and snapshots are guarded alike and recreated together. `put`
/// overwrites without comparing against the event stream.
pub struct DocSnapshotStore<S> {
    router: Arc<AggregateTypeRouter<S>>,
}

impl<S> DocSnapshotStore<S>
where
    S: DocumentStore,
{
    pub fn new(router: Arc<AggregateTypeRouter<S>>) -> Self {
        Self { router }
    }

    #[instrument(
        skip(self),
        fields(
            operation = field::Empty,
            snapshot_found = field::Empty,
            snapshot_version = field::Empty
        ),
        err
    )]
    pub fn get(&self, aggregate_id: &str, aggregate_type: &str) -> StoreResult<Option<Snapshot>> {
        let span = Span::current();
        span.record("operation", "load_snapshot");

        let unit = self.router.resolve(aggregate_type)?;
        let row = self
            .router
            .store()
            .find_first(&unit.snapshots.id, &by_aggregate(aggregate_id))?;

        let Some(row) = row else {
            span.record("snapshot_found", false);
            return Ok(None);
        };
        let snapshot = Snapshot {
            id: row.get_str(FIELD_AGG_ID)?.to_string(),
            aggregate_type: aggregate_type.to_string(),
            version: row.get_u64(FIELD_VERSION)?,
            global_version: row.get_u64(FIELD_GLOBAL_VERSION)?,
            state: row.get_json(FIELD_STATE),
        };
        span.record("snapshot_found", true);
        span.record("snapshot_version", snapshot.version);
        Ok(Some(snapshot))
    }

    /// Create or overwrite the aggregate's snapshot.
    #[instrument(
        skip(self, snapshot),
        fields(
            operation = field::Empty,
            aggregate_id = %snapshot.id,
            aggregate_type = %snapshot.aggregate_type,
            version = snapshot.version
        ),
        err
    )]
    pub fn put(&self, snapshot: &Snapshot) -> StoreResult<()> {
        Span::current().record("operation", "store_snapshot");

        let unit = self.router.resolve(&snapshot.aggregate_type)?;
        let collection = unit.snapshots.id.as_str();

        self.router.store().run_in_transaction(|tx| {
            let mut row = match tx.find_first(collection, &by_aggregate(&snapshot.id))? {
                Some(existing) => existing,
                None => {
                    let mut fresh = Record::new(collection);
                    fresh.set(FIELD_AGG_ID, snapshot.id.as_str());
                    fresh
                }
            };
            row.set(FIELD_VERSION, snapshot.version)
                .set(FIELD_GLOBAL_VERSION, snapshot.global_version)
                .set(FIELD_STATE, snapshot.state.clone());
            tx.save_record(&mut row)
        })
    }
}

impl<S> SnapshotStore for DocSnapshotStore<S>
where
    S: DocumentStore,
{
    fn get(&self, aggregate_id: &str, aggregate_type: &str) -> StoreResult<Option<Snapshot>> {
        DocSnapshotStore::get(self, aggregate_id, aggregate_type)
    }

    fn put(&self, snapshot: &Snapshot) -> StoreResult<()> {
        DocSnapshotStore::put(self, snapshot)
    }
}

fn by_aggregate(aggregate_id: &str) -> Query {
    Query::filter(Filter::eq(FIELD_AGG_ID, aggregate_id))
}
