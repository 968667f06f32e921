//! Record store seam.
//!
//! Every entity lives in a schema-less JSON collection with integer ids assigned
//! by the store. [`RecordStore`] is the untyped interface, the typed helpers on
//! `dyn RecordStore` (de)serialize entities on top of it.

pub mod memory;
pub mod rest;

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use rest::RestStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Courses,
    Lessons,
    Quizzes,
    QuizResults,
    Progress,
}

impl Collection {
    pub fn path(self) -> &'static str {
        match self {
            Collection::Courses => "courses",
            Collection::Lessons => "lessons",
            Collection::Quizzes => "quizzes",
            Collection::QuizResults => "quizResults",
            Collection::Progress => "progress",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Equality filters on top-level fields, e.g. `[("userId", "1")]`.
pub type Filters<'a> = &'a [(&'a str, String)];

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// List records, keeping those whose top-level fields equal every filter.
    async fn list(&self, collection: Collection, filters: Filters<'_>)
    -> Result<Vec<Value>, StoreError>;

    async fn get(&self, collection: Collection, id: i64) -> Result<Value, StoreError>;

    /// Create a record, the store assigns the id.
    async fn create(&self, collection: Collection, record: Value) -> Result<Value, StoreError>;

    /// Replace the whole record.
    async fn replace(
        &self,
        collection: Collection,
        id: i64,
        record: Value,
    ) -> Result<Value, StoreError>;

    /// Merge the given top-level fields into the record.
    async fn patch(
        &self,
        collection: Collection,
        id: i64,
        fields: Value,
    ) -> Result<Value, StoreError>;

    async fn delete(&self, collection: Collection, id: i64) -> Result<(), StoreError>;
}

impl dyn RecordStore {
    pub async fn list_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filters: Filters<'_>,
    ) -> Result<Vec<T>, StoreError> {
        self.list(collection, filters)
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(StoreError::from))
            .collect()
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: i64,
    ) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.get(collection, id).await?)?)
    }

    pub async fn create_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
        record: &impl Serialize,
    ) -> Result<T, StoreError> {
        let record = serde_json::to_value(record)?;
        Ok(serde_json::from_value(self.create(collection, record).await?)?)
    }

    pub async fn replace_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: i64,
        record: &impl Serialize,
    ) -> Result<T, StoreError> {
        let record = serde_json::to_value(record)?;
        Ok(serde_json::from_value(
            self.replace(collection, id, record).await?,
        )?)
    }

    pub async fn patch_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: i64,
        fields: Value,
    ) -> Result<T, StoreError> {
        Ok(serde_json::from_value(
            self.patch(collection, id, fields).await?,
        )?)
    }
}
