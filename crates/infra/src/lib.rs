//! Infrastructure layer: document-store adapters, routing, event and snapshot stores.
//!
//! Wiring for one process:
//!
//! ```ignore
//! let store = Arc::new(InMemoryDocumentStore::new());
//! let config = StoreConfig::from_env()?;
//! let router = Arc::new(AggregateTypeRouter::new(store, &config));
//! let events = DocEventStore::with_router(Arc::clone(&router));
//! let snapshots = DocSnapshotStore::new(router);
//! ```

pub mod collections;
pub mod document_store;
pub mod event_store;
pub mod principals;
pub mod router;
pub mod sequence;
pub mod snapshot_store;
pub mod unit_cache;


pub use document_store::{DocumentStore, InMemoryDocumentStore, RecordStore};
pub use event_store::{DocEventStore, RecordIterator};
pub use router::{AggregateTypeRouter, StorageUnit};
pub use sequence::{GLOBAL_VERSION_SEQUENCE, SequenceAllocator};
pub use snapshot_store::DocSnapshotStore;
