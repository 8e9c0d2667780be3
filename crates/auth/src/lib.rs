//! Access-rule compilation for document-store collections.
//!
//! Pure string building: no IO, no evaluation of the emitted expressions.

pub mod policy;
pub mod roles;
pub mod rules;

pub use policy::{AuthPolicy, Verb};
pub use roles::Role;
pub use rules::{AuthConfigError, AuthorizationBuilder, FIELD_ADMIN, USERS_COLLECTION};
