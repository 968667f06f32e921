use std::{
    collections::{BTreeMap, HashSet},
    sync::atomic::{AtomicI64, Ordering},
};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Collection, Filters, RecordStore};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Create,
    Replace,
    Patch,
    Delete,
}

/// One call received by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub operation: Operation,
    pub collection: Collection,
    pub id: Option<i64>,
}

/// In-process record store with json-server semantics.
///
/// Every call is journaled, and failures can be injected per collection and
/// operation to exercise aborted workflows.
#[derive(Debug)]
pub struct MemoryStore {
    collections: DashMap<Collection, BTreeMap<i64, Value>>,
    next_id: AtomicI64,
    journal: Mutex<Vec<StoreCall>>,
    failures: Mutex<HashSet<(Collection, Operation)>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            collections: DashMap::new(),
            next_id: AtomicI64::new(1),
            journal: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record without journaling it, keeping its id when it has one.
    pub fn seed(&self, collection: Collection, record: Value) -> i64 {
        self.insert(collection, record)
    }

    /// Snapshot of a collection ordered by id.
    pub fn records(&self, collection: Collection) -> Vec<Value> {
        self.collections
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.journal.lock().clone()
    }

    /// Calls that changed data, reads excluded.
    pub fn writes(&self) -> Vec<StoreCall> {
        self.journal
            .lock()
            .iter()
            .filter(|call| !matches!(call.operation, Operation::List | Operation::Get))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.journal.lock().clear();
    }

    /// Make every following `operation` on `collection` fail with a 500.
    pub fn fail_on(&self, collection: Collection, operation: Operation) {
        self.failures.lock().insert((collection, operation));
    }

    pub fn recover(&self) {
        self.failures.lock().clear();
    }

    fn enter(
        &self,
        operation: Operation,
        collection: Collection,
        id: Option<i64>,
    ) -> Result<(), StoreError> {
        self.journal.lock().push(StoreCall {
            operation,
            collection,
            id,
        });
        if self.failures.lock().contains(&(collection, operation)) {
            return Err(StoreError::Server {
                status: 500,
                message: format!("injected {operation:?} failure on {collection}"),
            });
        }
        Ok(())
    }

    fn insert(&self, collection: Collection, mut record: Value) -> i64 {
        let mut records = self.collections.entry(collection).or_default();
        let id = match record.get("id").and_then(Value::as_i64) {
            Some(id) if !records.contains_key(&id) => {
                self.next_id.fetch_max(id + 1, Ordering::Relaxed);
                id
            }
            _ => self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        if let Value::Object(fields) = &mut record {
            fields.insert("id".to_string(), Value::from(id));
        }
        records.insert(id, record);
        id
    }

    fn existing(&self, collection: Collection, id: i64) -> Result<Value, StoreError> {
        self.collections
            .get(&collection)
            .and_then(|records| records.get(&id).cloned())
            .ok_or(StoreError::NotFound { collection, id })
    }
}

fn field_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        _ => false,
    }
}

fn as_object(record: Value) -> Result<serde_json::Map<String, Value>, StoreError> {
    match record {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::InvalidResponse(format!(
            "record must be a JSON object, got {other}"
        ))),
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn list(
        &self,
        collection: Collection,
        filters: Filters<'_>,
    ) -> Result<Vec<Value>, StoreError> {
        self.enter(Operation::List, collection, None)?;
        Ok(self
            .records(collection)
            .into_iter()
            .filter(|record| {
                filters.iter().all(|(field, expected)| {
                    record
                        .get(*field)
                        .is_some_and(|value| field_matches(value, expected))
                })
            })
            .collect())
    }

    async fn get(&self, collection: Collection, id: i64) -> Result<Value, StoreError> {
        self.enter(Operation::Get, collection, Some(id))?;
        self.existing(collection, id)
    }

    async fn create(&self, collection: Collection, record: Value) -> Result<Value, StoreError> {
        self.enter(Operation::Create, collection, None)?;
        let mut fields = as_object(record)?;
        // the store owns ids, a null or missing id is assigned
        if fields.get("id").is_some_and(Value::is_null) {
            fields.remove("id");
        }
        let id = self.insert(collection, Value::Object(fields));
        self.existing(collection, id)
    }

    async fn replace(
        &self,
        collection: Collection,
        id: i64,
        record: Value,
    ) -> Result<Value, StoreError> {
        self.enter(Operation::Replace, collection, Some(id))?;
        self.existing(collection, id)?;
        let mut fields = as_object(record)?;
        fields.insert("id".to_string(), Value::from(id));
        let record = Value::Object(fields);
        self.collections
            .entry(collection)
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    async fn patch(
        &self,
        collection: Collection,
        id: i64,
        fields: Value,
    ) -> Result<Value, StoreError> {
        self.enter(Operation::Patch, collection, Some(id))?;
        let mut current = as_object(self.existing(collection, id)?)?;
        for (key, value) in as_object(fields)? {
            if key != "id" {
                current.insert(key, value);
            }
        }
        let record = Value::Object(current);
        self.collections
            .entry(collection)
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    async fn delete(&self, collection: Collection, id: i64) -> Result<(), StoreError> {
        self.enter(Operation::Delete, collection, Some(id))?;
        self.collections
            .get_mut(&collection)
            .and_then(|mut records| records.remove(&id))
            .map(|_| ())
            .ok_or(StoreError::NotFound { collection, id })
    }
}
