use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, RwLock};

use serde_json::Value as JsonValue;
use uuid::Uuid;

use esdoc_core::{StoreError, StoreResult};

use super::{
    Collection, CollectionSchema, DocumentStore, FieldKind, Query, Record, RecordStore,
    compare_values,
};

/// Counts of schema operations issued against the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

#[derive(Debug, Default)]
struct SchemaCounters {
    created: AtomicUsize,
    updated: AtomicUsize,
    deleted: AtomicUsize,
}

#[derive(Debug)]
struct CollectionState {
    collection: Collection,
    records: Vec<Record>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, CollectionState>,
}

impl State {
    fn resolve(&self, name_or_id: &str) -> StoreResult<&CollectionState> {
        self.collections
            .get(name_or_id)
            .or_else(|| {
                self.collections
                    .values()
                    .find(|c| c.collection.id == name_or_id)
            })
            .ok_or_else(|| StoreError::storage(format!("unknown collection '{name_or_id}'")))
    }
}

/// In-memory document store.
///
/// Intended for tests/dev. Transactions are serialized by a store-wide lock and
/// staged until commit, which gives serializable isolation: a transaction never
/// observes another one half-applied, and two read-then-write sequences on the
/// same rows cannot interleave. Access rules are stored verbatim and never evaluated.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<State>,
    tx_lock: Mutex<()>,
    counters: SchemaCounters,
    schema_failure: Mutex<Option<String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema_stats(&self) -> SchemaStats {
        SchemaStats {
            created: self.counters.created.load(AtomicOrdering::SeqCst),
            updated: self.counters.updated.load(AtomicOrdering::SeqCst),
            deleted: self.counters.deleted.load(AtomicOrdering::SeqCst),
        }
    }

    /// Make every later schema create/update/delete fail with `message` (`None` clears).
    pub fn fail_schema_operations(&self, message: Option<&str>) {
        if let Ok(mut failure) = self.schema_failure.lock() {
            *failure = message.map(str::to_string);
        }
    }

    pub fn record_count(&self, collection: &str) -> StoreResult<usize> {
        let state = self.read_state()?;
        Ok(state.resolve(collection)?.records.len())
    }

    fn read_state(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::storage("document store lock poisoned"))
    }

    fn write_state(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::storage("document store lock poisoned"))
    }

    fn check_schema_failure(&self) -> StoreResult<()> {
        let failure = self
            .schema_failure
            .lock()
            .map_err(|_| StoreError::storage("document store lock poisoned"))?;
        match failure.as_ref() {
            Some(msg) => Err(StoreError::storage(msg.clone())),
            None => Ok(()),
        }
    }
}

impl RecordStore for InMemoryDocumentStore {
    fn find_records(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>> {
        let state = self.read_state()?;
        Ok(query.apply(state.resolve(collection)?.records.iter()))
    }

    fn save_record(&self, record: &mut Record) -> StoreResult<()> {
        self.run_in_transaction(|tx| tx.save_record(record))
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn find_collection(&self, name: &str) -> StoreResult<Option<Collection>> {
        let state = self.read_state()?;
        Ok(state.resolve(name).ok().map(|c| c.collection.clone()))
    }

    fn save_collection(&self, schema: CollectionSchema) -> StoreResult<Collection> {
        self.check_schema_failure()?;
        let mut state = self.write_state()?;

        if let Some(existing) = state.collections.get_mut(&schema.name) {
            existing.collection.schema = schema;
            self.counters.updated.fetch_add(1, AtomicOrdering::SeqCst);
            return Ok(existing.collection.clone());
        }

        let collection = Collection {
            id: Uuid::now_v7().simple().to_string(),
            schema,
        };
        state.collections.insert(
            collection.schema.name.clone(),
            CollectionState {
                collection: collection.clone(),
                records: Vec::new(),
            },
        );
        self.counters.created.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(collection)
    }

    fn delete_collection(&self, name: &str) -> StoreResult<()> {
        self.check_schema_failure()?;
        let mut state = self.write_state()?;
        let key = state.resolve(name)?.collection.schema.name.clone();
        state.collections.remove(&key);
        self.counters.deleted.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    fn run_in_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn RecordStore) -> StoreResult<T>,
    {
        let _serial = self
            .tx_lock
            .lock()
            .map_err(|_| StoreError::storage("transaction lock poisoned"))?;

        let tx = Transaction {
            store: self,
            staged: RefCell::new(HashMap::new()),
        };
        let out = f(&tx)?;

        let staged = tx.staged.into_inner();
        let mut state = self.write_state()?;
        for name in staged.keys() {
            if !state.collections.contains_key(name) {
                return Err(StoreError::storage(format!(
                    "collection '{name}' was deleted during the transaction"
                )));
            }
        }
        for (name, records) in staged {
            if let Some(target) = state.collections.get_mut(&name) {
                for record in records {
                    match target.records.iter_mut().find(|r| r.id == record.id) {
                        Some(slot) => *slot = record,
                        None => target.records.push(record),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Staged view of the store inside `run_in_transaction`.
struct Transaction<'a> {
    store: &'a InMemoryDocumentStore,
    /// Pending writes keyed by collection name, in write order.
    staged: RefCell<HashMap<String, Vec<Record>>>,
}

impl Transaction<'_> {
    /// Committed records with this transaction's writes laid over them.
    fn merged(&self, state: &State, collection: &str) -> StoreResult<(Collection, Vec<Record>)> {
        let target = state.resolve(collection)?;
        let mut records = target.records.clone();
        if let Some(pending) = self.staged.borrow().get(target.collection.name()) {
            for record in pending {
                match records.iter_mut().find(|r| r.id == record.id) {
                    Some(slot) => *slot = record.clone(),
                    None => records.push(record.clone()),
                }
            }
        }
        Ok((target.collection.clone(), records))
    }
}

impl RecordStore for Transaction<'_> {
    fn find_records(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>> {
        let state = self.store.read_state()?;
        let (_, records) = self.merged(&state, collection)?;
        Ok(query.apply(records.iter()))
    }

    fn save_record(&self, record: &mut Record) -> StoreResult<()> {
        let state = self.store.read_state()?;
        let (collection, existing) = self.merged(&state, &record.collection)?;

        if !record.is_new() && !existing.iter().any(|r| r.id == record.id) {
            return Err(StoreError::not_found(format!(
                "record '{}' in '{}'",
                record.id,
                collection.name()
            )));
        }
        validate(&collection, record, &existing)?;

        if record.is_new() {
            record.id = Uuid::now_v7().simple().to_string();
        }
        record.collection = collection.name().to_string();

        self.staged
            .borrow_mut()
            .entry(collection.name().to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}

/// Field and unique-index constraints for a record about to be written.
fn validate(collection: &Collection, record: &Record, existing: &[Record]) -> StoreResult<()> {
    let name = collection.name();

    for field in &collection.schema.fields {
        let value = record.get(&field.name).filter(|v| !v.is_null());
        let Some(value) = value else {
            if field.required {
                return Err(StoreError::storage(format!(
                    "'{name}.{}' is required",
                    field.name
                )));
            }
            continue;
        };

        let kind_ok = match &field.kind {
            FieldKind::Text | FieldKind::Date | FieldKind::Relation { .. } => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Json => true,
        };
        if !kind_ok {
            return Err(StoreError::storage(format!(
                "'{name}.{}' has the wrong type",
                field.name
            )));
        }

        if let Some(min) = field.min {
            let below = match value {
                JsonValue::String(s) => (s.chars().count() as i64) < min,
                JsonValue::Number(n) => n.as_f64().is_some_and(|n| n < min as f64),
                _ => false,
            };
            if below {
                return Err(StoreError::storage(format!(
                    "'{name}.{}' is below its minimum of {min}",
                    field.name
                )));
            }
        }

        if let Some(max) = field.max_size {
            if value.to_string().len() > max {
                return Err(StoreError::storage(format!(
                    "'{name}.{}' exceeds {max} bytes",
                    field.name
                )));
            }
        }
    }

    for index in collection.schema.indexes.iter().filter(|i| i.unique) {
        let clash = existing.iter().filter(|r| r.id != record.id).any(|other| {
            index.columns.iter().all(|col| match (record.get(col), other.get(col)) {
                (Some(a), Some(b)) => compare_values(a, b) == Some(std::cmp::Ordering::Equal),
                _ => false,
            })
        });
        if clash {
            return Err(StoreError::storage(format!(
                "constraint violation: unique index '{}' on '{name}'",
                index.name
            )));
        }
    }

    Ok(())
}
