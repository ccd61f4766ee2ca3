use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use itertools::Itertools;
use log::{debug, info};
use rusqlite::{
    Connection, OptionalExtension, params, params_from_iter,
    types::{Value as SqlValue, ValueRef},
};
use serde_json::Value;

use super::{Row, TableCreator, TableReader, TableSnapshot, UserRegistry};
use crate::{
    data::parse_boolean,
    error::StoreError,
    infer::StorageType,
    naming::is_valid_table_name,
    payload::{CellValue, TableCreationPayload},
    profile::RegistrationRecord,
};

const USER_TABLE: &str = "user_details";

/// SQLite-backed implementation of every storage collaborator.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_details (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("connection lock poisoned: {e}")))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite resolves table names without regard to ASCII case.
fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Booleans are stored as 0/1 so they read back as booleans; tokens outside
/// the boolean vocabulary are kept as text.
fn sql_value(value: &CellValue, storage_type: StorageType) -> SqlValue {
    match value {
        CellValue::Null => SqlValue::Null,
        CellValue::Number(number) => SqlValue::Real(*number),
        CellValue::Text(text) if storage_type == StorageType::Boolean => {
            match parse_boolean(text) {
                Some(flag) => SqlValue::Integer(i64::from(flag)),
                None => SqlValue::Text(text.clone()),
            }
        }
        CellValue::Text(text) => SqlValue::Text(text.clone()),
    }
}

fn json_value(value: ValueRef<'_>, boolean_column: bool) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(flag) if boolean_column && (flag == 0 || flag == 1) => {
            Value::Bool(flag == 1)
        }
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn declared_boolean_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            Ok((name, declared))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns
        .into_iter()
        .filter(|(_, declared)| declared.eq_ignore_ascii_case(StorageType::Boolean.as_sql()))
        .map(|(name, _)| name)
        .collect())
}

fn read_table(conn: &Connection, name: &str) -> Result<TableSnapshot, StoreError> {
    let booleans = declared_boolean_columns(conn, name)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} ORDER BY rowid",
        quote_identifier(name)
    ))?;
    let columns = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let flags = columns
        .iter()
        .map(|column| booleans.contains(column))
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut record = Row::new();
        for (idx, column) in columns.iter().enumerate() {
            record.insert(column.clone(), json_value(row.get_ref(idx)?, flags[idx]));
        }
        rows.push(record);
    }
    Ok(TableSnapshot {
        name: name.to_string(),
        columns,
        rows,
    })
}

#[async_trait]
impl UserRegistry for SqliteStore {
    async fn register(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_details (first_name, last_name, email, phone) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.first_name,
                record.last_name,
                record.email,
                record.phone
            ],
        )?;
        info!("Registered user '{}'", record.first_name);
        Ok(())
    }

    async fn find_user(&self, user: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT first_name, last_name, email, phone FROM user_details
                 WHERE first_name = ?1 ORDER BY id DESC LIMIT 1",
                params![user],
                |row| {
                    Ok(RegistrationRecord {
                        first_name: row.get(0)?,
                        last_name: row.get(1)?,
                        email: row.get(2)?,
                        phone: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

#[async_trait]
impl TableCreator for SqliteStore {
    async fn create_table(&self, payload: &TableCreationPayload) -> Result<(), StoreError> {
        let name = payload.table_name.as_str();
        if !is_valid_table_name(name) || name == USER_TABLE {
            return Err(StoreError::InvalidTableName {
                name: name.to_string(),
            });
        }
        let mut conn = self.lock()?;
        if table_exists(&conn, name)? {
            return Err(StoreError::TableExists {
                name: name.to_string(),
            });
        }

        let definitions = payload
            .columns
            .iter()
            .map(|column| {
                format!(
                    "{} {}",
                    quote_identifier(&column.name),
                    column.storage_type.as_sql()
                )
            })
            .join(", ");
        let placeholders = (1..=payload.columns.len())
            .map(|idx| format!("?{idx}"))
            .join(", ");
        let insert = format!(
            "INSERT INTO {} VALUES ({placeholders})",
            quote_identifier(name)
        );

        let tx = conn.transaction()?;
        tx.execute(
            &format!("CREATE TABLE {} ({definitions})", quote_identifier(name)),
            [],
        )?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in &payload.rows {
                let values = row
                    .iter()
                    .zip(&payload.columns)
                    .map(|(value, column)| sql_value(value, column.storage_type));
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        info!(
            "Created table '{name}' with {} column(s) and {} row(s)",
            payload.columns.len(),
            payload.rows.len()
        );
        Ok(())
    }
}

#[async_trait]
impl TableReader for SqliteStore {
    async fn list_tables(&self, user: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let pattern = format!(
            "{}\\_%",
            user.replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name LIKE ?1 ESCAPE '\\' AND name <> ?2
             ORDER BY name",
        )?;
        let names = stmt
            .query_map(params![pattern, USER_TABLE], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Found {} table(s) for user '{user}'", names.len());
        Ok(names)
    }

    async fn read_tables(&self, names: &[String]) -> Result<Vec<TableSnapshot>, StoreError> {
        if let Some(invalid) = names.iter().find(|name| !is_valid_table_name(name)) {
            return Err(StoreError::InvalidTableName {
                name: invalid.clone(),
            });
        }
        let conn = self.lock()?;
        names
            .iter()
            .map(|name| {
                if !table_exists(&conn, name)? {
                    return Err(StoreError::TableNotFound { name: name.clone() });
                }
                read_table(&conn, name)
            })
            .collect()
    }
}
