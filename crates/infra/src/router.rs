//! Aggregate-type routing.
//!
//! Maps an aggregate-type name to its storage unit: the event and snapshot
//! collections, the optional authorization relation collection and the compiled
//! access policy. Units are built on first use and cached for the life of the
//! router. The router also owns the global version counter, so every store
//! sharing a router bootstraps it once.

use std::sync::Arc;

use tracing::{Span, debug, field, info, instrument};

use esdoc_auth::{AuthPolicy, AuthorizationBuilder, Role};
use esdoc_core::{StoreConfig, StoreResult, TypeKey};

use crate::collections::{
    CollectionRef, FIELD_AGG_ID, auth_relation_schema, ensure_collection, event_schema,
    snapshot_schema,
};
use crate::document_store::DocumentStore;
use crate::principals::UserDirectory;
use crate::sequence::SequenceAllocator;
use crate::unit_cache::UnitCache;

/// Per-type binding of collections and access rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUnit {
    /// Type name as given by the caller that triggered the build.
    pub aggregate_type: String,
    pub key: TypeKey,
    pub events: CollectionRef,
    pub snapshots: CollectionRef,
    /// `None` when authorization is disabled.
    pub auth_collection: Option<CollectionRef>,
    pub policy: AuthPolicy,
}

/// Lazily built, cached storage units keyed by normalized type name.
///
/// `recreate_db` is honored when a unit is built, which happens once per type
/// per router unless the unit is invalidated. Cache hits never touch the store.
///
/// Whenever a unit's collections are rebuilt, the authorization collection is
/// rebuilt with them only if `recreate_db_auth` is also set.
pub struct AggregateTypeRouter<S> {
    store: Arc<S>,
    config: StoreConfig,
    users: UserDirectory<S>,
    sequence: Arc<SequenceAllocator<S>>,
    units: UnitCache<StorageUnit>,
}

impl<S> AggregateTypeRouter<S>
where
    S: DocumentStore,
{
    pub fn new(store: Arc<S>, config: &StoreConfig) -> Self {
        Self {
            users: UserDirectory::new(Arc::clone(&store)),
            sequence: Arc::new(SequenceAllocator::new(Arc::clone(&store), config)),
            store,
            config: config.clone(),
            units: UnitCache::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Global version allocator shared by every event store on this router.
    pub fn sequence(&self) -> &Arc<SequenceAllocator<S>> {
        &self.sequence
    }

    #[instrument(skip(self), fields(operation = field::Empty, type_key = field::Empty), err)]
    pub fn resolve(&self, aggregate_type: &str) -> StoreResult<Arc<StorageUnit>> {
        let span = Span::current();
        span.record("operation", "resolve");

        let key = TypeKey::parse(aggregate_type)?;
        span.record("type_key", key.as_str());

        self.units.get_or_try_init(&key, || {
            self.build(aggregate_type, &key, self.config.recreate_db)
        })
    }

    /// Drop and rebuild the unit's collections now, whatever `recreate_db` says.
    ///
    /// Event history and snapshots for the type are lost. The authorization
    /// collection is only rebuilt when `recreate_db_auth` is set.
    #[instrument(skip(self), err)]
    pub fn recreate(&self, aggregate_type: &str) -> StoreResult<Arc<StorageUnit>> {
        let key = TypeKey::parse(aggregate_type)?;
        self.units.invalidate(&key)?;
        info!(type_key = %key, "recreating storage unit");
        self.units
            .get_or_try_init(&key, || self.build(aggregate_type, &key, true))
    }

    /// Forget the cached unit; the next `resolve` builds it again.
    pub fn invalidate(&self, aggregate_type: &str) -> StoreResult<bool> {
        let key = TypeKey::parse(aggregate_type)?;
        self.units.invalidate(&key)
    }

    /// Type keys with a cached unit, sorted.
    pub fn cached_types(&self) -> StoreResult<Vec<TypeKey>> {
        self.units.keys()
    }

    /// Access builder for a type, over the configured roles.
    pub fn authorization_builder(&self, key: &TypeKey) -> AuthorizationBuilder {
        AuthorizationBuilder::new(
            key.auth_collection(),
            FIELD_AGG_ID,
            self.config.auth_roles.iter().cloned().map(Role::from),
        )
    }

    fn build(&self, aggregate_type: &str, key: &TypeKey, recreate: bool) -> StoreResult<StorageUnit> {
        debug!(type_key = %key, recreate, "building storage unit");

        let (policy, auth_collection) = if self.config.auth_disabled {
            (AuthPolicy::permit_all(), None)
        } else {
            let builder = self.authorization_builder(key);
            let policy = AuthPolicy::compile(&builder)?;
            let users = self.users.ensure()?;
            let auth = ensure_collection(
                &*self.store,
                auth_relation_schema(&builder, &users.id),
                recreate && self.config.recreate_db_auth,
            )?;
            (policy, Some(auth))
        };

        let events = ensure_collection(
            &*self.store,
            event_schema(&key.events_collection(), policy.clone()),
            recreate,
        )?;
        let snapshots = ensure_collection(
            &*self.store,
            snapshot_schema(&key.snapshots_collection(), policy.clone()),
            recreate,
        )?;

        Ok(StorageUnit {
            aggregate_type: aggregate_type.to_string(),
            key: key.clone(),
            events,
            snapshots,
            auth_collection,
            policy,
        })
    }
}
