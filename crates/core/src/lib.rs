//! Shared building blocks for the event and snapshot persistence core.
//!
//! This crate contains no storage code: errors, type keys, versioning and configuration.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod id;

pub use aggregate::ExpectedVersion;
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use id::{TypeKey, to_snake_case};
