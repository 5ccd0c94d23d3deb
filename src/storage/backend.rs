use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageResult;

/// A stored JSON document. Every document carries a string `_id`.
pub type Document = Value;

pub const ID_FIELD: &str = "_id";

/// Black-box document store the repository runs on. Every call is a
/// suspension point; implementations provide their own internal locking.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Create an index. Re-creating an identical definition is a no-op; the
    /// same name with different options fails with `IndexConflict`.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StorageResult<()>;
    async fn drop_index(&self, collection: &str, name: &str) -> StorageResult<()>;
    async fn list_indexes(&self, collection: &str) -> StorageResult<Vec<IndexSpec>>;

    async fn insert_one(&self, collection: &str, document: Document) -> StorageResult<()>;
    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>>;
    async fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StorageResult<Vec<Document>>;

    /// Atomically set `changes` (dotted path to value) on the first matching
    /// document and return it as it is after the update.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: Map<String, Value>,
    ) -> StorageResult<Option<Document>>;

    /// Replace the first matching document, or insert `document` if none matches.
    async fn upsert_one(&self, collection: &str, filter: &Filter, document: Document) -> StorageResult<()>;
    async fn delete_one(&self, collection: &str, filter: &Filter) -> StorageResult<u64>;
    async fn delete_many(&self, collection: &str, filter: &Filter) -> StorageResult<u64>;

    /// Relevance-ranked full-text query. Requires a text index on the collection.
    async fn text_search(
        &self,
        collection: &str,
        filter: &Filter,
        query: &str,
        limit: usize,
    ) -> StorageResult<Vec<ScoredDocument>>;

    /// Count matching documents and sum a numeric field over them.
    async fn aggregate_sum(&self, collection: &str, filter: &Filter, field: &str) -> StorageResult<SumAggregate>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SumAggregate {
    pub count: u64,
    pub sum: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Equality on a dotted path. Array fields match if any element is equal.
    Eq(String, Value),
    /// Membership on a dotted path. Array fields match if any element is in the set.
    In(String, Vec<Value>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(path.to_string(), value.into())
    }

    pub fn any_of(path: &str, values: Vec<Value>) -> Self {
        Filter::In(path.to_string(), values)
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, expected) => match lookup(document, path) {
                Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
                Some(actual) => actual == expected,
                None => expected.is_null(),
            },
            Filter::In(path, set) => match lookup(document, path) {
                Some(Value::Array(items)) => items.iter().any(|item| set.contains(item)),
                Some(actual) => set.contains(actual),
                None => false,
            },
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted_desc(field: &str) -> Self {
        Self {
            sort: vec![SortKey { field: field.to_string(), descending: true }],
            limit: None,
        }
    }

    pub fn sorted_asc(field: &str) -> Self {
        Self {
            sort: vec![SortKey { field: field.to_string(), descending: false }],
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.sort {
            let ordering = compare_values(lookup(a, &key.field), lookup(b, &key.field));
            let ordering = if key.descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDirection {
    Ascending,
    Descending,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub direction: IndexDirection,
}

/// Named index definition. Two specs with the same name conflict unless
/// they are equal in every option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub weights: BTreeMap<String, u32>,
}

impl IndexSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            keys: Vec::new(),
            unique: false,
            weights: BTreeMap::new(),
        }
    }

    pub fn asc(mut self, field: &str) -> Self {
        self.keys.push(IndexKey { field: field.to_string(), direction: IndexDirection::Ascending });
        self
    }

    pub fn desc(mut self, field: &str) -> Self {
        self.keys.push(IndexKey { field: field.to_string(), direction: IndexDirection::Descending });
        self
    }

    pub fn text(mut self, field: &str, weight: u32) -> Self {
        self.keys.push(IndexKey { field: field.to_string(), direction: IndexDirection::Text });
        self.weights.insert(field.to_string(), weight);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_text(&self) -> bool {
        self.keys.iter().any(|k| k.direction == IndexDirection::Text)
    }
}

/// Resolve a dotted path such as `metadata.tags` inside a document.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |value, segment| value.get(segment))
}

/// Set a dotted path, creating intermediate objects as needed.
pub fn set_path(document: &mut Document, path: &str, value: Value) {
    if !document.is_object() {
        *document = Value::Object(Map::new());
    }
    let Value::Object(fields) = document else { return };
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = fields.entry(head.to_string()).or_insert_with(|| Value::Object(Map::new()));
            set_path(child, rest, value);
        }
    }
}

/// Total order over optional JSON values: missing < null < bool < number < string.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
