//! SQLite database module for field and crop records
//!
//! ## Tables
//!
//! - `fields` - Land parcels with approval status and verification flag
//! - `crop_records` - Season/year crop entries per field
//! - `disease_predictions` - Append-only classification results
//! - `mandals`, `villages`, `crop_types` - Read-only catalogs
//!
//! ## Transitions
//!
//! Every lifecycle transition runs through [`RecordsDb::with_tx`], which opens
//! an `IMMEDIATE` transaction. SQLite takes the database write lock up front,
//! so two processes sharing the same file cannot interleave a read-check-write
//! on the same row. Repository functions additionally guard each `UPDATE` and
//! `DELETE` with the expected state in the `WHERE` clause and report the number
//! of affected rows.

pub mod catalog;
pub mod crops;
pub mod fields;
pub mod models;
pub mod predictions;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::error::RecordsError;

/// Default time a writer waits for another writer before giving up
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database for field, crop and prediction records
pub struct RecordsDb {
    conn: Mutex<Connection>,
}

impl RecordsDb {
    /// Open or create the records database in `storage_dir`
    pub fn open(storage_dir: &Path) -> Result<Self, RecordsError> {
        Self::open_file(&storage_dir.join("records.db"), DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create the database at an explicit path
    pub fn open_file(db_path: &Path, busy_timeout: Duration) -> Result<Self, RecordsError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| RecordsError::Database(format!("Failed to open SQLite: {}", e)))?;

        // WAL gives readers a consistent snapshot while a transition commits
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| RecordsError::Database(format!("Failed to set PRAGMA: {}", e)))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| RecordsError::Database(format!("Failed to set busy timeout: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, RecordsError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            RecordsError::Database(format!("Failed to open in-memory SQLite: {}", e))
        })?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| RecordsError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), RecordsError> {
        self.with_conn(schema::init_schema)
    }

    /// Run a read against the shared connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, RecordsError>
    where
        F: FnOnce(&Connection) -> Result<T, RecordsError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| RecordsError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, RecordsError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RecordsError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| RecordsError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Run `f` inside an `IMMEDIATE` transaction.
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which
    /// rolls every statement in it back.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, RecordsError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, RecordsError>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    /// Run several reads against one snapshot
    pub fn with_read_tx<F, T>(&self, f: F) -> Result<T, RecordsError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, RecordsError>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let out = f(&tx)?;
            tx.finish()?;
            Ok(out)
        })
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, RecordsError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, RecordsError> {
                let sql = format!("SELECT COUNT(*) FROM {}", table);
                let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                field_count: count("fields")?,
                crop_record_count: count("crop_records")?,
                prediction_count: count("disease_predictions")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub field_count: u64,
    pub crop_record_count: u64,
    pub prediction_count: u64,
}

// Re-exports
pub use models::{
    CropRecord, CropUpdate, DiseasePrediction, Field, FieldStatus, FieldUpdate, NewCropRecord,
    NewField, Season, Severity,
};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_file_and_stats() {
        let temp = TempDir::new().unwrap();
        let db = RecordsDb::open(temp.path()).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.field_count, 0);
        assert_eq!(stats.crop_record_count, 0);
        assert_eq!(stats.prediction_count, 0);
    }

    #[test]
    fn test_failed_tx_rolls_back() {
        let db = RecordsDb::open_in_memory().unwrap();

        let result: Result<(), RecordsError> = db.with_tx(|tx| {
            tx.execute("INSERT INTO crop_types (id, name) VALUES ('rice', 'Rice')", [])?;
            Err(RecordsError::Internal("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM crop_types", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
