//! Crop record repository

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::CropRecord;
use crate::error::RecordsError;

/// Counts of crop records attached to one field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependentCrops {
    pub total: u64,
    pub verified: u64,
}

impl DependentCrops {
    pub fn unverified(&self) -> u64 {
        self.total - self.verified
    }
}

pub fn insert_crop(conn: &Connection, crop: &CropRecord) -> Result<(), RecordsError> {
    conn.execute(
        r#"
        INSERT INTO crop_records (
            id, field_id, crop_type_id, crop_year, season, area_hectares, production,
            verified, created_at, updated_at, verified_at, verified_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            crop.id,
            crop.field_id,
            crop.crop_type_id,
            crop.crop_year,
            crop.season,
            crop.area_hectares,
            crop.production,
            crop.verified,
            crop.created_at,
            crop.updated_at,
            crop.verified_at,
            crop.verified_by,
        ],
    )?;
    Ok(())
}

/// Get a crop record by ID
pub fn get_crop(conn: &Connection, id: &str) -> Result<Option<CropRecord>, RecordsError> {
    Ok(conn
        .query_row("SELECT * FROM crop_records WHERE id = ?", params![id], |row| {
            CropRecord::from_row(row)
        })
        .optional()?)
}

/// Get a crop record together with the owner of its field
pub fn get_crop_with_owner(
    conn: &Connection,
    id: &str,
) -> Result<Option<(CropRecord, String)>, RecordsError> {
    Ok(conn
        .query_row(
            r#"
            SELECT c.*, f.owner_id AS owner_id
            FROM crop_records c
            INNER JOIN fields f ON f.id = c.field_id
            WHERE c.id = ?
            "#,
            params![id],
            |row| Ok((CropRecord::from_row(row)?, row.get::<_, String>("owner_id")?)),
        )
        .optional()?)
}

/// Crop records on one field, ordered by id
pub fn list_crops_for_field(
    conn: &Connection,
    field_id: &str,
) -> Result<Vec<CropRecord>, RecordsError> {
    let mut stmt = conn.prepare("SELECT * FROM crop_records WHERE field_id = ? ORDER BY id")?;
    let rows = stmt.query_map(params![field_id], |row| CropRecord::from_row(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Crop records across every field a farmer owns, latest year first
pub fn list_crops_by_owner(
    conn: &Connection,
    owner_id: &str,
) -> Result<Vec<CropRecord>, RecordsError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT c.* FROM crop_records c
        INNER JOIN fields f ON f.id = c.field_id
        WHERE f.owner_id = ?
        ORDER BY c.crop_year DESC, c.id
        "#,
    )?;
    let rows = stmt.query_map(params![owner_id], |row| CropRecord::from_row(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Unverified crop records, oldest first (staff review queue)
pub fn list_unverified_crops(conn: &Connection) -> Result<Vec<CropRecord>, RecordsError> {
    let mut stmt =
        conn.prepare("SELECT * FROM crop_records WHERE verified = 0 ORDER BY created_at ASC, id")?;
    let rows = stmt.query_map([], |row| CropRecord::from_row(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn count_for_field(conn: &Connection, field_id: &str) -> Result<DependentCrops, RecordsError> {
    let (total, verified): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(verified), 0) FROM crop_records WHERE field_id = ?",
        params![field_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(DependentCrops {
        total: total as u64,
        verified: verified as u64,
    })
}

/// Largest crop area recorded on a field, if any
pub fn max_area_for_field(conn: &Connection, field_id: &str) -> Result<Option<f64>, RecordsError> {
    Ok(conn.query_row(
        "SELECT MAX(area_hectares) FROM crop_records WHERE field_id = ?",
        params![field_id],
        |row| row.get(0),
    )?)
}

pub fn update_attributes(conn: &Connection, crop: &CropRecord) -> Result<usize, RecordsError> {
    let changed = conn.execute(
        r#"
        UPDATE crop_records
        SET crop_type_id = ?1, crop_year = ?2, season = ?3, area_hectares = ?4,
            production = ?5, updated_at = ?6
        WHERE id = ?7 AND verified = 0
        "#,
        params![
            crop.crop_type_id,
            crop.crop_year,
            crop.season,
            crop.area_hectares,
            crop.production,
            crop.updated_at,
            crop.id,
        ],
    )?;
    Ok(changed)
}

pub fn mark_verified(
    conn: &Connection,
    id: &str,
    reviewer: &str,
    now: DateTime<Utc>,
) -> Result<usize, RecordsError> {
    let changed = conn.execute(
        r#"
        UPDATE crop_records
        SET verified = 1, verified_at = ?1, verified_by = ?2, updated_at = ?1
        WHERE id = ?3 AND verified = 0
        "#,
        params![now, reviewer, id],
    )?;
    Ok(changed)
}

pub fn delete_crop(conn: &Connection, id: &str) -> Result<usize, RecordsError> {
    Ok(conn.execute("DELETE FROM crop_records WHERE id = ? AND verified = 0", params![id])?)
}

/// Delete every unverified crop record on a field
pub fn delete_unverified_for_field(
    conn: &Connection,
    field_id: &str,
) -> Result<usize, RecordsError> {
    Ok(conn.execute(
        "DELETE FROM crop_records WHERE field_id = ? AND verified = 0",
        params![field_id],
    )?)
}
