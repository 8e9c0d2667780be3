//! Event persistence on top of the document store.
//!
//! One collection per aggregate type holds that type's events; a shared
//! sequence counter stamps every appended event with a store-wide global version.

pub mod document;
pub mod iterator;

pub use document::DocEventStore;
pub use iterator::RecordIterator;
