//! Collection layouts and the one routine that bootstraps them.
//!
//! Event, snapshot, sequence and authorization collections differ only in their
//! schema; finding, dropping and (re)creating them is the same sequence every time.

use tracing::{debug, info, warn};

use esdoc_auth::{AuthPolicy, AuthorizationBuilder};
use esdoc_core::StoreResult;

use crate::document_store::{Collection, CollectionSchema, DocumentStore, FieldSpec, IndexSpec};

pub const FIELD_AGG_ID: &str = "agg_id";
pub const FIELD_VERSION: &str = "version";
pub const FIELD_GLOBAL_VERSION: &str = "global_version";
pub const FIELD_REASON: &str = "reason";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_DATA: &str = "data";
pub const FIELD_METADATA: &str = "metadata";
pub const FIELD_STATE: &str = "state";

/// Upper bound for serialized payload fields.
pub const JSON_MAX_SIZE: usize = 102_400;

/// Lightweight handle to a bootstrapped collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub id: String,
    pub name: String,
}

impl From<&Collection> for CollectionRef {
    fn from(collection: &Collection) -> Self {
        Self {
            id: collection.id.clone(),
            name: collection.name().to_string(),
        }
    }
}

/// Return the named collection, creating it from `schema` when missing.
///
/// With `recreate`, an existing collection is dropped first, records included.
/// Store failures are returned as-is; nothing is retried.
pub fn ensure_collection<S>(
    store: &S,
    schema: CollectionSchema,
    recreate: bool,
) -> StoreResult<CollectionRef>
where
    S: DocumentStore + ?Sized,
{
    match store.find_collection(&schema.name)? {
        Some(existing) if !recreate => {
            debug!(collection = %existing.name(), "collection exists");
            Ok(CollectionRef::from(&existing))
        }
        existing => {
            if let Some(existing) = existing {
                warn!(collection = %existing.name(), "dropping collection for recreation");
                store.delete_collection(existing.name())?;
            }
            let created = store.save_collection(schema)?;
            info!(collection = %created.name(), id = %created.id, "collection created");
            Ok(CollectionRef::from(&created))
        }
    }
}

fn agg_id_index(collection: &str) -> IndexSpec {
    IndexSpec::new(format!("idx_{collection}_{FIELD_AGG_ID}"), FIELD_AGG_ID)
}

/// Per-type event log. The `agg_id` index is for lookups only; it is not unique.
pub fn event_schema(name: &str, rules: AuthPolicy) -> CollectionSchema {
    CollectionSchema::new(name)
        .field(FieldSpec::text(FIELD_AGG_ID).required())
        .field(FieldSpec::number(FIELD_VERSION).required())
        .field(FieldSpec::number(FIELD_GLOBAL_VERSION).required())
        .field(FieldSpec::text(FIELD_REASON).required())
        .field(FieldSpec::date(FIELD_TIMESTAMP).required())
        .field(FieldSpec::json(FIELD_DATA).max_size(JSON_MAX_SIZE))
        .field(FieldSpec::json(FIELD_METADATA).max_size(JSON_MAX_SIZE))
        .index(agg_id_index(name))
        .rules(rules)
}

/// Per-type latest snapshot.
pub fn snapshot_schema(name: &str, rules: AuthPolicy) -> CollectionSchema {
    CollectionSchema::new(name)
        .field(FieldSpec::text(FIELD_AGG_ID).required())
        .field(FieldSpec::number(FIELD_VERSION).required())
        .field(FieldSpec::number(FIELD_GLOBAL_VERSION).required())
        .field(FieldSpec::json(FIELD_STATE).max_size(JSON_MAX_SIZE))
        .index(agg_id_index(name))
        .rules(rules)
}

/// Per-type authorization relations: one row per guarded key, one relation
/// field per role pointing at the principals holding it.
///
/// Event and snapshot rules trust these rows, so only global admins may touch them.
pub fn auth_relation_schema(builder: &AuthorizationBuilder, users_collection_id: &str) -> CollectionSchema {
    let name = builder.collection_name();
    let key = builder.key_field();
    let mut schema = CollectionSchema::new(name)
        .field(FieldSpec::text(key).required().min(2))
        .index(IndexSpec::new(format!("idx_{name}_{key}"), key).unique())
        .rules(AuthPolicy::uniform(builder.global_admin()));

    for role in builder.roles() {
        schema = schema.field(FieldSpec::relation(
            builder.relation_field(role),
            users_collection_id,
        ));
    }
    schema
}
