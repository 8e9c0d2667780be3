//! Event and snapshot records plus the store ports.

pub mod event;
pub mod iterator;
pub mod snapshot;
pub mod store;

pub use event::Event;
pub use iterator::{BufferedEvents, EventIterator, Events};
pub use snapshot::Snapshot;
pub use store::{EventStore, SnapshotStore};
