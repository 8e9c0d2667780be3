//! Named monotonic counters.
//!
//! Backs the global version that totally orders events across aggregate types.
//! Every allocation reads and writes the counter row inside one transaction, so
//! concurrent allocators never hand out the same value.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{Span, debug, field, instrument};

use esdoc_core::{StoreConfig, StoreError, StoreResult};

use crate::collections::{CollectionRef, ensure_collection};
use crate::document_store::{
    CollectionSchema, DocumentStore, FieldSpec, Filter, IndexSpec, Query, Record, RecordStore,
};

pub const SEQUENCE_COLLECTION: &str = "sequence";
pub const FIELD_NAME: &str = "name";
pub const FIELD_CURRENT_VALUE: &str = "current_value";
pub const FIELD_LAST_UPDATED: &str = "last_updated";

/// Counter feeding `Event::global_version`.
pub const GLOBAL_VERSION_SEQUENCE: &str = "aggregates_global_version";

pub fn sequence_schema() -> CollectionSchema {
    CollectionSchema::new(SEQUENCE_COLLECTION)
        .field(FieldSpec::text(FIELD_NAME).required())
        .field(FieldSpec::number(FIELD_CURRENT_VALUE).required().min(0))
        .field(FieldSpec::date(FIELD_LAST_UPDATED))
        .index(IndexSpec::new("idx_sequence_name", FIELD_NAME).unique())
}

/// Allocator of contiguous integers per counter name.
///
/// A counter that does not exist yet is created already holding the requested
/// allocation: `next` on a new counter returns 1, `next_batch(n)` returns `1..=n`,
/// and no second write happens.
///
/// With `legacy_sequence_detection`, a counter counts as "just created" when its
/// stored value equals the initial value of the call (1, or `count`), whether or
/// not this call created it. An existing counter sitting at that value then
/// re-emits it instead of advancing. Keep it off unless stored data depends on it.
pub struct SequenceAllocator<S> {
    store: Arc<S>,
    recreate: bool,
    legacy_detection: bool,
    collection: Mutex<Option<CollectionRef>>,
}

impl<S> SequenceAllocator<S>
where
    S: DocumentStore,
{
    pub fn new(store: Arc<S>, config: &StoreConfig) -> Self {
        Self {
            store,
            recreate: config.recreate_db,
            legacy_detection: config.legacy_sequence_detection,
            collection: Mutex::new(None),
        }
    }

    /// Bootstrap the counter collection. Runs once per allocator; later calls are no-ops.
    ///
    /// A failed bootstrap is not remembered, so the next call tries again.
    pub fn init(&self) -> StoreResult<CollectionRef> {
        let mut slot = self
            .collection
            .lock()
            .map_err(|_| StoreError::storage("sequence bootstrap lock poisoned"))?;
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        let created = ensure_collection(&*self.store, sequence_schema(), self.recreate)?;
        *slot = Some(created.clone());
        Ok(created)
    }

    #[instrument(skip(self), fields(operation = field::Empty, value = field::Empty), err)]
    pub fn next(&self, name: &str) -> StoreResult<u64> {
        Span::current().record("operation", "sequence_next");
        self.init()?;
        let value = self.store.run_in_transaction(|tx| self.next_in(tx, name))?;
        Span::current().record("value", value);
        Ok(value)
    }

    #[instrument(skip(self), fields(operation = field::Empty, first = field::Empty), err)]
    pub fn next_batch(&self, name: &str, count: usize) -> StoreResult<Vec<u64>> {
        Span::current().record("operation", "sequence_next_batch");
        if count == 0 {
            return Err(StoreError::configuration(format!(
                "sequence '{name}': batch count must be positive"
            )));
        }
        self.init()?;
        let values = self
            .store
            .run_in_transaction(|tx| self.next_batch_in(tx, name, count))?;
        if let Some(first) = values.first() {
            Span::current().record("first", *first);
        }
        Ok(values)
    }

    /// `next` for a caller already inside a transaction. Requires `init`.
    pub fn next_in(&self, tx: &dyn RecordStore, name: &str) -> StoreResult<u64> {
        let values = self.next_batch_in(tx, name, 1)?;
        values
            .first()
            .copied()
            .ok_or_else(|| StoreError::storage(format!("sequence '{name}' allocated nothing")))
    }

    /// `next_batch` for a caller already inside a transaction. Requires `init`.
    pub fn next_batch_in(
        &self,
        tx: &dyn RecordStore,
        name: &str,
        count: usize,
    ) -> StoreResult<Vec<u64>> {
        if count == 0 {
            return Err(StoreError::configuration(format!(
                "sequence '{name}': batch count must be positive"
            )));
        }
        let count = count as u64;

        let (mut row, created) = find_or_create(tx, name, count)?;
        let current = row.get_u64(FIELD_CURRENT_VALUE)?;

        let fresh = if self.legacy_detection {
            current == count
        } else {
            created
        };
        if fresh {
            debug!(sequence = name, count, "counter starts with this allocation");
            return Ok((1..=count).collect());
        }

        let last = current.checked_add(count).ok_or_else(|| {
            StoreError::storage(format!("sequence '{name}' overflowed at {current}"))
        })?;
        row.set(FIELD_CURRENT_VALUE, last)
            .set_datetime(FIELD_LAST_UPDATED, Utc::now());
        tx.save_record(&mut row)?;

        Ok((current + 1..=last).collect())
    }

    /// Last value handed out, `None` when the counter has never been used.
    pub fn current(&self, name: &str) -> StoreResult<Option<u64>> {
        self.init()?;
        let row = self
            .store
            .find_first(SEQUENCE_COLLECTION, &Query::filter(Filter::eq(FIELD_NAME, name)))?;
        row.map(|r| r.get_u64(FIELD_CURRENT_VALUE)).transpose()
    }
}

/// Counter row for `name`, and whether this call inserted it holding `initial`.
fn find_or_create(tx: &dyn RecordStore, name: &str, initial: u64) -> StoreResult<(Record, bool)> {
    let query = Query::filter(Filter::eq(FIELD_NAME, name));
    if let Some(existing) = tx.find_first(SEQUENCE_COLLECTION, &query)? {
        return Ok((existing, false));
    }

    let mut row = Record::new(SEQUENCE_COLLECTION);
    row.set(FIELD_NAME, name)
        .set(FIELD_CURRENT_VALUE, initial)
        .set_datetime(FIELD_LAST_UPDATED, Utc::now());
    tx.save_record(&mut row)?;
    Ok((row, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;

    fn allocator(legacy: bool) -> SequenceAllocator<InMemoryDocumentStore> {
        let config = StoreConfig {
            legacy_sequence_detection: legacy,
            ..StoreConfig::default()
        };
        SequenceAllocator::new(Arc::new(InMemoryDocumentStore::new()), &config)
    }

    #[test]
    fn next_counts_from_one() {
        let seq = allocator(false);
        assert_eq!(seq.next("orders").unwrap(), 1);
        assert_eq!(seq.next("orders").unwrap(), 2);
        assert_eq!(seq.next("orders").unwrap(), 3);
        assert_eq!(seq.current("orders").unwrap(), Some(3));
    }

    #[test]
    fn batch_on_new_counter_then_next() {
        let seq = allocator(false);
        assert_eq!(seq.next_batch("g", 5).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(seq.next("g").unwrap(), 6);
        assert_eq!(seq.next_batch("g", 2).unwrap(), vec![7, 8]);
    }

    #[test]
    fn counters_are_independent() {
        let seq = allocator(false);
        seq.next_batch("a", 3).unwrap();
        assert_eq!(seq.next("b").unwrap(), 1);
        assert_eq!(seq.current("c").unwrap(), None);
    }

    #[test]
    fn zero_count_is_configuration_error() {
        let seq = allocator(false);
        assert!(matches!(
            seq.next_batch("g", 0),
            Err(StoreError::Configuration(_))
        ));
    }

    #[test]
    fn legacy_detection_re_emits_initial_value() {
        let seq = allocator(true);
        assert_eq!(seq.next("g").unwrap(), 1);
        // Existing counter at 1 looks freshly created under value comparison.
        assert_eq!(seq.next("g").unwrap(), 1);
        assert_eq!(seq.current("g").unwrap(), Some(1));
    }

    #[test]
    fn legacy_detection_matches_default_away_from_initial_value() {
        let seq = allocator(true);
        assert_eq!(seq.next_batch("g", 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(seq.next("g").unwrap(), 4);
        assert_eq!(seq.next_batch("g", 2).unwrap(), vec![5, 6]);
    }

    #[test]
    fn init_is_idempotent() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let seq = SequenceAllocator::new(store.clone(), &StoreConfig::default());
        let first = seq.init().unwrap();
        let second = seq.init().unwrap();
        assert_eq!(first, second);
        assert_eq!(store.schema_stats().created, 1);
    }

    #[test]
    fn allocation_rolls_back_with_its_transaction() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let seq = SequenceAllocator::new(store.clone(), &StoreConfig::default());
        seq.init().unwrap();
        seq.next("g").unwrap();

        let aborted: StoreResult<()> = store.run_in_transaction(|tx| {
            seq.next_in(tx, "g")?;
            Err(StoreError::storage("later write failed"))
        });
        assert!(aborted.is_err());
        assert_eq!(seq.next("g").unwrap(), 2);
    }
}
