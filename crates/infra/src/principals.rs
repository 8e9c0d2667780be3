//! Principal collection bootstrap.
//!
//! Access rules test `@request.auth.admin`, and role relation fields point at the
//! principals' collection id. Both need the `users` collection to exist with a
//! boolean `admin` field before any authorization collection is created.

use std::sync::{Arc, Mutex};

use tracing::info;

use esdoc_auth::{FIELD_ADMIN, USERS_COLLECTION};
use esdoc_core::{StoreError, StoreResult};

use crate::collections::CollectionRef;
use crate::document_store::{CollectionSchema, DocumentStore, FieldSpec};

/// Minimal principal layout used when the store has no `users` collection.
pub fn users_schema() -> CollectionSchema {
    CollectionSchema::new(USERS_COLLECTION)
        .field(FieldSpec::text("username").required().min(3))
        .field(FieldSpec::text("name"))
        .field(FieldSpec::text("email"))
        .field(FieldSpec::bool(FIELD_ADMIN))
}

/// Lazily verified handle to the principals' collection.
pub struct UserDirectory<S> {
    store: Arc<S>,
    resolved: Mutex<Option<CollectionRef>>,
}

impl<S> UserDirectory<S>
where
    S: DocumentStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            resolved: Mutex::new(None),
        }
    }

    /// Find or create `users` and make sure it carries the `admin` flag.
    ///
    /// Existing fields and records are left alone. The result is cached.
    pub fn ensure(&self) -> StoreResult<CollectionRef> {
        let mut resolved = self
            .resolved
            .lock()
            .map_err(|_| StoreError::storage("user directory lock poisoned"))?;
        if let Some(users) = resolved.as_ref() {
            return Ok(users.clone());
        }

        let users = match self.store.find_collection(USERS_COLLECTION)? {
            Some(existing) if existing.schema.has_field(FIELD_ADMIN) => existing,
            Some(existing) => {
                info!(collection = USERS_COLLECTION, "adding admin flag to principals");
                let schema = existing.schema.field(FieldSpec::bool(FIELD_ADMIN));
                self.store.save_collection(schema)?
            }
            None => {
                info!(collection = USERS_COLLECTION, "creating principals collection");
                self.store.save_collection(users_schema())?
            }
        };

        let users = CollectionRef::from(&users);
        *resolved = Some(users.clone());
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::InMemoryDocumentStore;

    #[test]
    fn creates_users_when_missing() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let users = UserDirectory::new(store.clone()).ensure().unwrap();

        let stored = store.find_collection(USERS_COLLECTION).unwrap().unwrap();
        assert_eq!(users.id, stored.id);
        assert!(stored.schema.has_field(FIELD_ADMIN));
    }

    #[test]
    fn adds_admin_flag_to_existing_users() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let original = store
            .save_collection(CollectionSchema::new(USERS_COLLECTION).field(FieldSpec::text("email")))
            .unwrap();

        let users = UserDirectory::new(store.clone()).ensure().unwrap();
        let stored = store.find_collection(USERS_COLLECTION).unwrap().unwrap();

        assert_eq!(users.id, original.id);
        assert!(stored.schema.has_field("email"));
        assert!(stored.schema.has_field(FIELD_ADMIN));
        assert_eq!(store.schema_stats().updated, 1);
    }

    #[test]
    fn ensure_is_cached() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let directory = UserDirectory::new(store.clone());
        directory.ensure().unwrap();
        directory.ensure().unwrap();
        assert_eq!(store.schema_stats().created, 1);
    }
}
