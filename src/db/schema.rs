//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::RecordsError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), RecordsError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, RecordsError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| RecordsError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), RecordsError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| RecordsError::Database(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| RecordsError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), RecordsError> {
    conn.execute_batch(CATALOG_SCHEMA)
        .map_err(|e| RecordsError::Database(format!("Failed to create catalog tables: {}", e)))?;

    conn.execute_batch(RECORDS_SCHEMA)
        .map_err(|e| RecordsError::Database(format!("Failed to create record tables: {}", e)))?;

    conn.execute_batch(LOCK_TRIGGERS)
        .map_err(|e| RecordsError::Database(format!("Failed to create triggers: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| RecordsError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Read-only location and crop catalogs
const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mandals (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS villages (
    id TEXT PRIMARY KEY NOT NULL,
    mandal_id TEXT NOT NULL,
    name TEXT NOT NULL,
    FOREIGN KEY (mandal_id) REFERENCES mandals(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS crop_types (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL
);
"#;

/// Fields, crop records and predictions
const RECORDS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS fields (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    area_hectares REAL NOT NULL CHECK (area_hectares > 0),
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    mandal_id TEXT NOT NULL,
    village_id TEXT NOT NULL,
    owner_id TEXT NOT NULL,

    -- Lifecycle
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'approved', 'rejected')),
    verified INTEGER NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    approved_at TEXT,
    verified_at TEXT,
    reviewed_by TEXT,

    CHECK (verified = 0 OR status = 'approved')
);

-- Field deletion never cascades here; the service decides per policy
CREATE TABLE IF NOT EXISTS crop_records (
    id TEXT PRIMARY KEY NOT NULL,
    field_id TEXT NOT NULL,
    crop_type_id TEXT NOT NULL,
    crop_year INTEGER NOT NULL,
    season TEXT NOT NULL CHECK (season IN ('Kharif', 'Rabi', 'WholeYear')),
    area_hectares REAL NOT NULL CHECK (area_hectares > 0),
    production REAL NOT NULL CHECK (production >= 0),

    verified INTEGER NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    verified_at TEXT,
    verified_by TEXT,

    FOREIGN KEY (field_id) REFERENCES fields(id) ON DELETE RESTRICT
);

-- Append-only; field and crop ids are kept as plain references
CREATE TABLE IF NOT EXISTS disease_predictions (
    id TEXT PRIMARY KEY NOT NULL,
    field_id TEXT NOT NULL,
    crop_record_id TEXT,
    owner_id TEXT NOT NULL,
    image_key TEXT NOT NULL,
    predicted_label TEXT NOT NULL,
    confidence REAL NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
    detected_at TEXT NOT NULL,
    severity TEXT CHECK (severity IS NULL OR severity IN ('high', 'moderate', 'low'))
);
"#;

/// Verified rows are immutable even if a caller bypasses the services
const LOCK_TRIGGERS: &str = r#"
CREATE TRIGGER IF NOT EXISTS fields_verified_no_update
BEFORE UPDATE ON fields
WHEN OLD.verified = 1
BEGIN
    SELECT RAISE(ABORT, 'field is verified');
END;

CREATE TRIGGER IF NOT EXISTS fields_verified_no_delete
BEFORE DELETE ON fields
WHEN OLD.verified = 1
BEGIN
    SELECT RAISE(ABORT, 'field is verified');
END;

CREATE TRIGGER IF NOT EXISTS crops_verified_no_update
BEFORE UPDATE ON crop_records
WHEN OLD.verified = 1
BEGIN
    SELECT RAISE(ABORT, 'crop record is verified');
END;

CREATE TRIGGER IF NOT EXISTS crops_verified_no_delete
BEFORE DELETE ON crop_records
WHEN OLD.verified = 1
BEGIN
    SELECT RAISE(ABORT, 'crop record is verified');
END;

CREATE TRIGGER IF NOT EXISTS predictions_no_update
BEFORE UPDATE ON disease_predictions
BEGIN
    SELECT RAISE(ABORT, 'predictions are immutable');
END;
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_fields_owner ON fields(owner_id);
CREATE INDEX IF NOT EXISTS idx_fields_status ON fields(status);
CREATE INDEX IF NOT EXISTS idx_crops_field ON crop_records(field_id);
CREATE INDEX IF NOT EXISTS idx_crops_verified ON crop_records(verified);
CREATE INDEX IF NOT EXISTS idx_predictions_owner ON disease_predictions(owner_id);
CREATE INDEX IF NOT EXISTS idx_villages_mandal ON villages(mandal_id);
"#;
