//! Location and crop catalogs
//!
//! The catalogs are reference data owned elsewhere. This service only reads
//! them; the seed functions exist so a deployment can load a snapshot at
//! startup.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RecordsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
}

/// Catalog snapshot file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub mandals: Vec<MandalSeed>,
    #[serde(default)]
    pub crop_types: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandalSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub villages: Vec<CatalogEntry>,
}

impl CatalogSeed {
    pub fn load(path: &Path) -> Result<Self, RecordsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

pub fn mandal_exists(conn: &Connection, mandal_id: &str) -> Result<bool, RecordsError> {
    Ok(conn
        .query_row("SELECT 1 FROM mandals WHERE id = ?", params![mandal_id], |_| Ok(()))
        .optional()?
        .is_some())
}

pub fn village_in_mandal(
    conn: &Connection,
    mandal_id: &str,
    village_id: &str,
) -> Result<bool, RecordsError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM villages WHERE id = ? AND mandal_id = ?",
            params![village_id, mandal_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn crop_type_name(
    conn: &Connection,
    crop_type_id: &str,
) -> Result<Option<String>, RecordsError> {
    Ok(conn
        .query_row(
            "SELECT name FROM crop_types WHERE id = ?",
            params![crop_type_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn list_crop_types(conn: &Connection) -> Result<Vec<CatalogEntry>, RecordsError> {
    let mut stmt = conn.prepare("SELECT id, name FROM crop_types ORDER BY name, id")?;
    let rows = stmt.query_map([], |row| Ok(CatalogEntry { id: row.get(0)?, name: row.get(1)? }))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_villages(
    conn: &Connection,
    mandal_id: &str,
) -> Result<Vec<CatalogEntry>, RecordsError> {
    let mut stmt =
        conn.prepare("SELECT id, name FROM villages WHERE mandal_id = ? ORDER BY name, id")?;
    let rows = stmt.query_map(params![mandal_id], |row| {
        Ok(CatalogEntry {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Load a catalog snapshot, renaming entries that already exist
pub fn apply_seed(conn: &mut Connection, seed: &CatalogSeed) -> Result<(), RecordsError> {
    let tx = conn.transaction()?;

    for mandal in &seed.mandals {
        tx.execute(
            "INSERT INTO mandals (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![mandal.id, mandal.name],
        )?;
        for village in &mandal.villages {
            tx.execute(
                "INSERT INTO villages (id, mandal_id, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE
                 SET mandal_id = excluded.mandal_id, name = excluded.name",
                params![village.id, mandal.id, village.name],
            )?;
        }
    }

    for crop_type in &seed.crop_types {
        tx.execute(
            "INSERT INTO crop_types (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![crop_type.id, crop_type.name],
        )?;
    }

    tx.commit()?;

    info!(
        mandals = seed.mandals.len(),
        crop_types = seed.crop_types.len(),
        "Applied catalog seed"
    );
    Ok(())
}
