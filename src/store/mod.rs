//! Storage collaborators consumed by the onboarding flow.
//!
//! The session and dashboard only see these traits. [`SqliteStore`] is the
//! bundled implementation; tests substitute recording doubles.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::StoreError, payload::TableCreationPayload, profile::RegistrationRecord};

pub type Row = serde_json::Map<String, serde_json::Value>;

/// Columns and rows of one stored table, in storage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl TableSnapshot {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait UserRegistry: Send + Sync {
    async fn register(&self, record: &RegistrationRecord) -> Result<(), StoreError>;

    /// Looks up a registered user by identifier (lower-cased first name).
    async fn find_user(&self, user: &str) -> Result<Option<RegistrationRecord>, StoreError>;
}

#[async_trait]
pub trait TableCreator: Send + Sync {
    /// Creates the table and inserts every row as one unit; on error nothing
    /// is left behind.
    async fn create_table(&self, payload: &TableCreationPayload) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TableReader: Send + Sync {
    /// Names of the tables owned by `user`, sorted.
    async fn list_tables(&self, user: &str) -> Result<Vec<String>, StoreError>;

    /// Reads the named tables in request order. Any syntactically invalid or
    /// missing name fails the whole call.
    async fn read_tables(&self, names: &[String]) -> Result<Vec<TableSnapshot>, StoreError>;
}
