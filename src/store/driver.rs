//! The datastore boundary: one narrow async surface every driver implements.
//!
//! Repositories talk to `dyn Datastore` and never to a concrete driver, so
//! the same CRUD code runs against the remote HTTP server and the embedded
//! in-memory engine. Driver return values are raw and shape-heterogeneous;
//! callers flatten them through [`crate::store::response`].

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::StoreError;

/// A `table:key` reference to a single stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId {
    table: String,
    key: String,
}

impl RecordId {
    /// Build a record id from a table name and key.
    pub fn new(table: impl Into<String>, key: impl ToString) -> Self {
        Self {
            table: table.into(),
            key: key.to_string(),
        }
    }

    /// Parse a `table:key` string strictly.
    ///
    /// Both parts must be non-empty; anything else is a
    /// [`StoreError::MalformedRecordId`]. The key may itself contain
    /// colons (`report:2024:x` keys under table `report`).
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        match raw.split_once(':') {
            Some((table, key)) if !table.is_empty() && !key.is_empty() => Ok(Self {
                table: table.to_string(),
                key: key.to_string(),
            }),
            _ => Err(StoreError::MalformedRecordId(raw.to_string())),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.key)
    }
}

/// What a `select` call addresses: a whole table or one record.
#[derive(Debug, Clone)]
pub enum SelectTarget {
    Table(String),
    Record(RecordId),
}

impl SelectTarget {
    pub fn table(name: impl Into<String>) -> Self {
        SelectTarget::Table(name.into())
    }
}

impl From<RecordId> for SelectTarget {
    fn from(id: RecordId) -> Self {
        SelectTarget::Record(id)
    }
}

/// Async handle to the document store.
///
/// `query` takes named bind variables as a JSON object (`Value::Null` for
/// none). Each method returns the driver's raw response shape.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Execute one or more statements with named bind variables.
    async fn query(&self, statement: &str, params: Value) -> Result<Value, StoreError>;

    /// Insert a new record with a generated key.
    async fn create(&self, table: &str, data: Value) -> Result<Value, StoreError>;

    /// Insert-or-fully-replace the record at `id`.
    async fn upsert(&self, id: &RecordId, data: Value) -> Result<Value, StoreError>;

    /// Fetch a whole table or a single record.
    async fn select(&self, target: SelectTarget) -> Result<Value, StoreError>;
}
