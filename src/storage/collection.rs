use std::collections::HashMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

use super::backend::{
    lookup, set_path, Document, Filter, FindOptions, IndexSpec, ScoredDocument, SumAggregate, ID_FIELD,
};

/// One named collection: documents in insertion order plus index definitions.
#[derive(Debug, Default, Clone)]
pub struct Collection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl Collection {
    pub fn from_parts(documents: Vec<Document>, indexes: Vec<IndexSpec>) -> Self {
        Self { documents, indexes }
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn create_index(&mut self, index: &IndexSpec) -> StorageResult<()> {
        if let Some(existing) = self.indexes.iter().find(|i| i.name == index.name) {
            if existing == index {
                return Ok(());
            }
            return Err(StorageError::IndexConflict { name: index.name.clone() });
        }
        if index.is_text() && self.indexes.iter().any(IndexSpec::is_text) {
            return Err(StorageError::IndexConflict { name: index.name.clone() });
        }
        if index.unique {
            for (position, document) in self.documents.iter().enumerate() {
                self.check_unique_against(index, document, Some(position))?;
            }
        }
        self.indexes.push(index.clone());
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> StorageResult<()> {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.name != name);
        if self.indexes.len() == before {
            return Err(StorageError::IndexNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Insert a document, assigning an `_id` when it has none. Returns the stored form.
    pub fn insert(&mut self, mut document: Document) -> StorageResult<Document> {
        if !document.is_object() {
            return Err(StorageError::Query("documents must be JSON objects".to_string()));
        }
        let id = match document.get(ID_FIELD).cloned() {
            Some(Value::String(id)) => id,
            Some(_) => return Err(StorageError::Query("_id must be a string".to_string())),
            None => {
                let id = Uuid::new_v4().to_string();
                set_path(&mut document, ID_FIELD, Value::String(id.clone()));
                id
            }
        };
        if self.position_of_id(&id).is_some() {
            return Err(StorageError::DuplicateKey { index: "_id_".to_string(), key: id });
        }
        self.check_unique(&document, None)?;
        self.documents.push(document.clone());
        Ok(document)
    }

    pub fn find_one(&self, filter: &Filter) -> Option<Document> {
        self.documents.iter().find(|d| filter.matches(d)).cloned()
    }

    pub fn find(&self, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let mut matches: Vec<Document> = self.documents.iter().filter(|d| filter.matches(d)).cloned().collect();
        matches.sort_by(|a, b| options.compare(a, b));
        if let Some(limit) = options.limit {
            matches.truncate(limit);
        }
        matches
    }

    pub fn find_one_and_update(&mut self, filter: &Filter, changes: Map<String, Value>) -> StorageResult<Option<Document>> {
        let Some(position) = self.documents.iter().position(|d| filter.matches(d)) else {
            return Ok(None);
        };
        let mut updated = self.documents[position].clone();
        for (path, value) in changes {
            if path == ID_FIELD {
                return Err(StorageError::Query("_id is immutable".to_string()));
            }
            set_path(&mut updated, &path, value);
        }
        self.check_unique(&updated, Some(position))?;
        self.documents[position] = updated.clone();
        Ok(Some(updated))
    }

    pub fn upsert(&mut self, filter: &Filter, mut document: Document) -> StorageResult<Document> {
        match self.documents.iter().position(|d| filter.matches(d)) {
            Some(position) => {
                let id = self.documents[position].get(ID_FIELD).cloned().unwrap_or(Value::Null);
                set_path(&mut document, ID_FIELD, id);
                self.check_unique(&document, Some(position))?;
                self.documents[position] = document.clone();
                Ok(document)
            }
            None => self.insert(document),
        }
    }

    /// Remove up to `limit` matching documents and return them.
    pub fn delete(&mut self, filter: &Filter, limit: Option<usize>) -> Vec<Document> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.documents.len());
        for document in self.documents.drain(..) {
            if limit.map_or(true, |limit| removed.len() < limit) && filter.matches(&document) {
                removed.push(document);
            } else {
                kept.push(document);
            }
        }
        self.documents = kept;
        removed
    }

    pub fn text_search(&self, filter: &Filter, query: &str, limit: usize) -> StorageResult<Vec<ScoredDocument>> {
        let index = self
            .indexes
            .iter()
            .find(|i| i.is_text())
            .ok_or(StorageError::TextIndexRequired)?;

        let terms: Vec<String> = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredDocument> = self
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .filter_map(|document| {
                let score = text_score(index, document, &terms);
                (score > 0.0).then(|| ScoredDocument { document: document.clone(), score })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    pub fn aggregate_sum(&self, filter: &Filter, field: &str) -> SumAggregate {
        self.documents
            .iter()
            .filter(|d| filter.matches(d))
            .fold(SumAggregate::default(), |mut acc, document| {
                acc.count += 1;
                acc.sum += lookup(document, field).and_then(Value::as_u64).unwrap_or(0);
                acc
            })
    }

    fn position_of_id(&self, id: &str) -> Option<usize> {
        self.documents
            .iter()
            .position(|d| d.get(ID_FIELD).and_then(Value::as_str) == Some(id))
    }

    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> StorageResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            self.check_unique_against(index, candidate, skip)?;
        }
        Ok(())
    }

    fn check_unique_against(&self, index: &IndexSpec, candidate: &Document, skip: Option<usize>) -> StorageResult<()> {
        let key = index_key(index, candidate);
        let clash = self
            .documents
            .iter()
            .enumerate()
            .any(|(position, document)| Some(position) != skip && index_key(index, document) == key);
        if clash {
            return Err(StorageError::DuplicateKey {
                index: index.name.clone(),
                key: Value::Array(key).to_string(),
            });
        }
        Ok(())
    }
}

fn index_key(index: &IndexSpec, document: &Document) -> Vec<Value> {
    index
        .keys
        .iter()
        .map(|k| lookup(document, &k.field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn field_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push(' ');
            out.push_str(s);
        }
        Value::Array(items) => items.iter().for_each(|item| field_text(item, out)),
        _ => {}
    }
}

/// Sum of `weight * occurrences` for every query term in every indexed field.
fn text_score(index: &IndexSpec, document: &Document, terms: &[String]) -> f64 {
    let mut score = 0.0;
    for (field, weight) in &index.weights {
        let Some(value) = lookup(document, field) else { continue };
        let mut text = String::new();
        field_text(value, &mut text);

        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in tokenize(&text) {
            *counts.entry(token).or_default() += 1;
        }
        for term in terms {
            score += f64::from(*weight) * f64::from(counts.get(term).copied().unwrap_or(0));
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn files_collection() -> Collection {
        let mut collection = Collection::default();
        collection
            .create_index(&IndexSpec::new("natural_key").asc("projectName").asc("name").unique())
            .unwrap();
        collection
    }

    #[test]
    fn insert_assigns_ids_and_enforces_unique_indexes() {
        let mut collection = files_collection();
        let stored = collection.insert(json!({ "projectName": "P", "name": "a" })).unwrap();
        assert!(stored.get(ID_FIELD).and_then(Value::as_str).is_some());

        let err = collection.insert(json!({ "projectName": "P", "name": "a" })).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { ref index, .. } if index == "natural_key"));

        collection.insert(json!({ "projectName": "Q", "name": "a" })).unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn create_index_conflicts_on_different_definition() {
        let mut collection = files_collection();
        let same = IndexSpec::new("natural_key").asc("projectName").asc("name").unique();
        assert!(collection.create_index(&same).is_ok());

        let different = IndexSpec::new("natural_key").asc("name");
        assert!(matches!(
            collection.create_index(&different),
            Err(StorageError::IndexConflict { .. })
        ));

        collection.drop_index("natural_key").unwrap();
        collection.create_index(&different).unwrap();
        assert!(matches!(collection.drop_index("nope"), Err(StorageError::IndexNotFound(_))));
    }

    #[test]
    fn update_returns_post_state_and_respects_uniqueness() {
        let mut collection = files_collection();
        collection.insert(json!({ "projectName": "P", "name": "a", "size": 1 })).unwrap();
        collection.insert(json!({ "projectName": "P", "name": "b", "size": 2 })).unwrap();

        let mut changes = Map::new();
        changes.insert("size".to_string(), json!(5));
        let updated = collection
            .find_one_and_update(&Filter::eq("name", "a"), changes)
            .unwrap()
            .unwrap();
        assert_eq!(updated["size"], json!(5));

        let mut rename = Map::new();
        rename.insert("name".to_string(), json!("b"));
        assert!(collection.find_one_and_update(&Filter::eq("name", "a"), rename).is_err());
        assert_eq!(collection.find_one(&Filter::eq("name", "a")).unwrap()["size"], json!(5));

        assert!(collection
            .find_one_and_update(&Filter::eq("name", "zzz"), Map::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_honours_limit() {
        let mut collection = Collection::default();
        for i in 0..3 {
            collection.insert(json!({ "kind": "x", "i": i })).unwrap();
        }
        assert_eq!(collection.delete(&Filter::eq("kind", "x"), Some(1)).len(), 1);
        assert_eq!(collection.delete(&Filter::eq("kind", "x"), None).len(), 2);
        assert!(collection.is_empty());
    }

    #[test]
    fn text_search_needs_an_index_and_ranks_by_weight() {
        let mut collection = Collection::default();
        collection.insert(json!({ "name": "other.md", "content": "world world" })).unwrap();
        collection.insert(json!({ "name": "world.md", "content": "nothing here" })).unwrap();
        collection.insert(json!({ "name": "none.md", "content": "nothing" })).unwrap();

        assert!(matches!(
            collection.text_search(&Filter::All, "world", 10),
            Err(StorageError::TextIndexRequired)
        ));

        collection
            .create_index(&IndexSpec::new("text").text("content", 1).text("name", 10))
            .unwrap();
        let results = collection.text_search(&Filter::All, "World", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document["name"], json!("world.md"));
        assert_eq!(results[0].score, 10.0);
        assert_eq!(results[1].score, 2.0);

        assert_eq!(collection.text_search(&Filter::All, "world", 1).unwrap().len(), 1);
    }

    #[test]
    fn aggregate_counts_and_sums() {
        let mut collection = Collection::default();
        collection.insert(json!({ "p": "P", "size": 3 })).unwrap();
        collection.insert(json!({ "p": "P", "size": 4 })).unwrap();
        collection.insert(json!({ "p": "Q", "size": 100 })).unwrap();

        assert_eq!(
            collection.aggregate_sum(&Filter::eq("p", "P"), "size"),
            SumAggregate { count: 2, sum: 7 }
        );
        assert_eq!(collection.aggregate_sum(&Filter::eq("p", "Z"), "size"), SumAggregate::default());
    }
}
