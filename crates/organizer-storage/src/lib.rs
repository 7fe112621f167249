pub mod entities;

use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use entities::{
    ChildRecord, Entity, Record, StoredEvent, StoredEventDuration, StoredEventRegistration,
    StoredEventTag, StoredFacility, StoredMembership, StoredOrganization, StoredQuestion, StoredQuestionGroup,
};

pub const ORGANIZER_SCHEMA_VERSION: i64 = 2;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("duplicate key in {table}")]
    Conflict { table: &'static str },
}

/// One connection to the organizer database.
///
/// Connections are cheap and never shared between calls; concurrent writers
/// are serialized by SQLite itself.
pub struct OrganizerStore {
    conn: Connection,
}

impl OrganizerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&self) -> Result<(), StorageError> {
        self.conn.pragma_update(None, "foreign_keys", true)?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > ORGANIZER_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: ORGANIZER_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_organizer_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        if current < 2 {
            let sql = include_str!("../migrations/0002_event_tags.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 2", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Read access outside of any transaction scope.
    pub fn repo(&self) -> Repo<'_> {
        Repo { conn: &self.conn }
    }

    /// Opens a write scope. The scope rolls back when dropped without
    /// `commit`.
    pub fn begin(&mut self) -> Result<StoreScope<'_>, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreScope { tx })
    }
}

pub struct StoreScope<'c> {
    tx: Transaction<'c>,
}

impl StoreScope<'_> {
    pub fn repo(&self) -> Repo<'_> {
        Repo { conn: &self.tx }
    }

    pub fn commit(self) -> Result<(), StorageError> {
        self.tx.commit()?;
        Ok(())
    }
}

/// Table operations shared by plain connections and open scopes.
#[derive(Clone, Copy)]
pub struct Repo<'c> {
    conn: &'c Connection,
}

impl<'c> Repo<'c> {
    pub fn find_by_id<R: Record>(&self, key: &R::Key) -> Result<Option<R>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            R::COLUMNS.join(", "),
            R::TABLE,
            key_clause(R::KEY_COLUMNS)
        );
        let mut statement = self.conn.prepare_cached(&sql)?;
        let record = statement
            .query_row(params_from_iter(R::key_values(key)), |row| R::from_row(row))
            .optional()?;
        Ok(record)
    }

    pub fn exists<R: Record>(&self, key: &R::Key) -> Result<bool, StorageError> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} LIMIT 1",
            R::TABLE,
            key_clause(R::KEY_COLUMNS)
        );
        let mut statement = self.conn.prepare_cached(&sql)?;
        let found = statement
            .query_row(params_from_iter(R::key_values(key)), |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn find_all<R: Record>(&self) -> Result<Vec<R>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            R::COLUMNS.join(", "),
            R::TABLE,
            R::KEY_COLUMNS.join(", ")
        );
        let mut statement = self.conn.prepare_cached(&sql)?;
        let rows = statement.query_map([], |row| R::from_row(row))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn find_all_by_parent_id<R: ChildRecord>(
        &self,
        parent_id: i64,
    ) -> Result<Vec<R>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}",
            R::COLUMNS.join(", "),
            R::TABLE,
            R::PARENT_COLUMN,
            R::KEY_COLUMNS.join(", ")
        );
        let mut statement = self.conn.prepare_cached(&sql)?;
        let rows = statement.query_map([parent_id], |row| R::from_row(row))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count<R: Record>(&self) -> Result<i64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Inserts a new row; an existing key yields `StorageError::Conflict`.
    pub fn insert<R: Record>(&self, record: &R) -> Result<R, StorageError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders(R::COLUMNS.len())
        );
        let mut statement = self.conn.prepare_cached(&sql)?;
        match statement.execute(params_from_iter(record.values())) {
            Ok(_) => {}
            Err(err) if is_duplicate_key(&err) => {
                return Err(StorageError::Conflict { table: R::TABLE })
            }
            Err(err) => return Err(err.into()),
        }

        Ok(self.with_assigned_key(record))
    }

    /// Inserts or overwrites the row with the record's key.
    pub fn save<R: Record>(&self, record: &R) -> Result<R, StorageError> {
        let assignments = R::COLUMNS
            .iter()
            .filter(|column| !R::KEY_COLUMNS.contains(column))
            .map(|column| format!("{column}=excluded.{column}"))
            .collect::<Vec<_>>();
        // key-only tables have nothing to overwrite
        let on_conflict = if assignments.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", assignments.join(", "))
        };
        let sql = format!(
            "
            INSERT INTO {} ({}) VALUES ({})
            ON CONFLICT({}) {}
            ",
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders(R::COLUMNS.len()),
            R::KEY_COLUMNS.join(", "),
            on_conflict
        );
        let mut statement = self.conn.prepare_cached(&sql)?;
        statement.execute(params_from_iter(record.values()))?;

        Ok(self.with_assigned_key(record))
    }

    pub fn save_all<R: Record>(&self, records: &[R]) -> Result<Vec<R>, StorageError> {
        records.iter().map(|record| self.save(record)).collect()
    }

    pub fn delete_by_id<R: Record>(&self, key: &R::Key) -> Result<usize, StorageError> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            R::TABLE,
            key_clause(R::KEY_COLUMNS)
        );
        let mut statement = self.conn.prepare_cached(&sql)?;
        Ok(statement.execute(params_from_iter(R::key_values(key)))?)
    }

    pub fn delete<R: Record>(&self, record: &R) -> Result<usize, StorageError> {
        match record.key() {
            Some(key) => self.delete_by_id::<R>(&key),
            None => Ok(0),
        }
    }

    pub fn delete_all<R: Record>(&self, records: &[R]) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for record in records {
            deleted += self.delete(record)?;
        }
        Ok(deleted)
    }

    pub fn delete_by_parent_id<R: ChildRecord>(&self, parent_id: i64) -> Result<usize, StorageError> {
        let sql = format!("DELETE FROM {} WHERE {} = ?1", R::TABLE, R::PARENT_COLUMN);
        let mut statement = self.conn.prepare_cached(&sql)?;
        Ok(statement.execute([parent_id])?)
    }

    fn with_assigned_key<R: Record>(&self, record: &R) -> R {
        let mut saved = record.clone();
        if record.key().is_none() {
            saved.assign_rowid(self.conn.last_insert_rowid());
        }
        saved
    }
}

fn key_clause(columns: &[&str]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        ),
        _ => false,
    }
}

pub(crate) fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}
