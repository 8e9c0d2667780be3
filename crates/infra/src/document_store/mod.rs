//! Document-store collaborator boundary.
//!
//! The persistence core does not own a database. It talks to a generic document
//! store that can define collections, save and query records, and run a callback
//! atomically. This module defines that contract; `InMemoryDocumentStore` is the
//! reference implementation used by tests and local development.
//!
//! Access rules travel with the collection schema as opaque strings. The store
//! evaluates them at request time; nothing here interprets them.

pub mod in_memory;

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use esdoc_auth::AuthPolicy;
use esdoc_core::{StoreError, StoreResult};

pub use in_memory::{InMemoryDocumentStore, SchemaStats};

/// Field type in a collection schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Json,
    Bool,
    Relation { collection_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    /// Minimum text length or minimum numeric value.
    pub min: Option<i64>,
    /// Maximum serialized size of a JSON field, in bytes.
    pub max_size: Option<usize>,
}

impl FieldSpec {
    fn of(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            min: None,
            max_size: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::of(name, FieldKind::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::of(name, FieldKind::Number)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::of(name, FieldKind::Date)
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::of(name, FieldKind::Json)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::of(name, FieldKind::Bool)
    }

    pub fn relation(name: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self::of(
            name,
            FieldKind::Relation {
                collection_id: collection_id.into(),
            },
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: vec![column.into()],
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Desired shape of a collection: fields, indexes and access rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub indexes: Vec<IndexSpec>,
    pub rules: AuthPolicy,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            rules: AuthPolicy::permit_all(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn rules(mut self, rules: AuthPolicy) -> Self {
        self.rules = rules;
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

/// A collection as stored: schema plus store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub schema: CollectionSchema,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

/// A record in a collection. An empty `id` means "not yet inserted".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub collection: String,
    pub fields: Map<String, JsonValue>,
}

impl Record {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            collection: collection.into(),
            fields: Map::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_empty()
    }

    pub fn set(&mut self, field: &str, value: impl Into<JsonValue>) -> &mut Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn set_datetime(&mut self, field: &str, value: DateTime<Utc>) -> &mut Self {
        self.set(field, value.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> StoreResult<&str> {
        self.get(field)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| self.bad_field(field, "text"))
    }

    pub fn get_u64(&self, field: &str) -> StoreResult<u64> {
        self.get(field)
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| self.bad_field(field, "unsigned number"))
    }

    pub fn get_datetime(&self, field: &str) -> StoreResult<DateTime<Utc>> {
        let raw = self.get_str(field)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::storage(format!("field '{field}' is not a date: {e}")))
    }

    /// JSON field value; absent fields read as `null`.
    pub fn get_json(&self, field: &str) -> JsonValue {
        self.get(field).cloned().unwrap_or(JsonValue::Null)
    }

    fn bad_field(&self, field: &str, expected: &str) -> StoreError {
        StoreError::storage(format!(
            "record '{}' in '{}': field '{field}' missing or not {expected}",
            self.id, self.collection
        ))
    }
}

/// Record filter: equality, greater-than and conjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, JsonValue),
    Gt(String, JsonValue),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<JsonValue>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn gt(field: &str, value: impl Into<JsonValue>) -> Self {
        Self::Gt(field.to_string(), value.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut all) => {
                all.push(other);
                Self::And(all)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Eq(field, expected) => record
                .get(field)
                .is_some_and(|v| compare_values(v, expected) == Some(Ordering::Equal)),
            Self::Gt(field, bound) => record
                .get(field)
                .is_some_and(|v| compare_values(v, bound) == Some(Ordering::Greater)),
            Self::And(all) => all.iter().all(|f| f.matches(record)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }
}

/// Filter, ordering and optional paging for a record lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Apply this query to an in-memory record set.
    pub fn apply<'a>(&self, records: impl Iterator<Item = &'a Record>) -> Vec<Record> {
        let mut matched: Vec<&Record> = records
            .filter(|r| self.filter.as_ref().is_none_or(|f| f.matches(r)))
            .collect();

        if let Some(sort) = &self.sort {
            matched.sort_by(|a, b| {
                let ord = match (a.get(&sort.field), b.get(&sort.field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                if sort.descending { ord.reverse() } else { ord }
            });
        }

        matched
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Order two JSON scalars of the same kind; `None` when they are not comparable.
pub fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_u64(), y.as_u64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Record operations available both outside and inside a transaction.
pub trait RecordStore {
    /// `collection` is a collection name or id.
    fn find_records(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>>;

    fn find_first(&self, collection: &str, query: &Query) -> StoreResult<Option<Record>> {
        let query = query.clone().limit(1);
        Ok(self.find_records(collection, &query)?.into_iter().next())
    }

    /// Insert when `record.id` is empty (the id is assigned in place), update otherwise.
    fn save_record(&self, record: &mut Record) -> StoreResult<()>;
}

/// Schema management and transactions on top of record operations.
pub trait DocumentStore: RecordStore + Send + Sync {
    fn find_collection(&self, name: &str) -> StoreResult<Option<Collection>>;

    /// Create the collection, or replace the schema of an existing one in place.
    fn save_collection(&self, schema: CollectionSchema) -> StoreResult<Collection>;

    fn delete_collection(&self, name: &str) -> StoreResult<()>;

    /// Run `f` atomically: every write inside commits together when it returns
    /// `Ok`, and none of them do when it returns `Err`.
    fn run_in_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn RecordStore) -> StoreResult<T>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(version: u64, agg: &str) -> Record {
        let mut r = Record::new("orders");
        r.set("agg_id", agg).set("version", version);
        r
    }

    #[test]
    fn filter_combines_eq_and_gt() {
        let filter = Filter::eq("agg_id", "a").and(Filter::gt("version", 2u64));
        assert!(filter.matches(&record(3, "a")));
        assert!(!filter.matches(&record(2, "a")));
        assert!(!filter.matches(&record(3, "b")));
    }

    #[test]
    fn query_sorts_pages_and_limits() {
        let records = vec![record(3, "a"), record(1, "a"), record(2, "a"), record(4, "b")];
        let query = Query::filter(Filter::eq("agg_id", "a"))
            .sort(Sort::desc("version"))
            .offset(1)
            .limit(1);

        let out = query.apply(records.iter());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_u64("version").unwrap(), 2);
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(compare_values(&json!(2), &json!(2.0)), Some(Ordering::Equal));
        assert_eq!(compare_values(&json!(3), &json!(2)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("3"), &json!(2)), None);
    }

    #[test]
    fn datetime_round_trips_with_nanos() {
        let ts = Utc::now();
        let mut r = Record::new("orders");
        r.set_datetime("timestamp", ts);
        assert_eq!(r.get_datetime("timestamp").unwrap(), ts);
    }

    #[test]
    fn missing_field_is_storage_error() {
        let r = Record::new("orders");
        assert!(matches!(r.get_str("reason"), Err(StoreError::Storage(_))));
        assert_eq!(r.get_json("data"), JsonValue::Null);
    }
}
