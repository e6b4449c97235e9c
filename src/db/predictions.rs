//! Disease prediction repository (append-only)

use rusqlite::{params, Connection, OptionalExtension};

use super::models::DiseasePrediction;
use crate::error::RecordsError;

pub fn insert_prediction(
    conn: &Connection,
    prediction: &DiseasePrediction,
) -> Result<(), RecordsError> {
    conn.execute(
        r#"
        INSERT INTO disease_predictions (
            id, field_id, crop_record_id, owner_id, image_key,
            predicted_label, confidence, detected_at, severity
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            prediction.id,
            prediction.field_id,
            prediction.crop_record_id,
            prediction.owner_id,
            prediction.image_key,
            prediction.predicted_label,
            prediction.confidence,
            prediction.detected_at,
            prediction.severity,
        ],
    )?;
    Ok(())
}

pub fn get_prediction(
    conn: &Connection,
    id: &str,
) -> Result<Option<DiseasePrediction>, RecordsError> {
    Ok(conn
        .query_row(
            "SELECT * FROM disease_predictions WHERE id = ?",
            params![id],
            |row| DiseasePrediction::from_row(row),
        )
        .optional()?)
}

/// A farmer's predictions, newest first
pub fn list_predictions_by_owner(
    conn: &Connection,
    owner_id: &str,
) -> Result<Vec<DiseasePrediction>, RecordsError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM disease_predictions WHERE owner_id = ? ORDER BY detected_at DESC, id",
    )?;
    let rows = stmt.query_map(params![owner_id], |row| DiseasePrediction::from_row(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Predicted labels for a farmer, for severity rollups
pub fn labels_for_owner(conn: &Connection, owner_id: &str) -> Result<Vec<String>, RecordsError> {
    let mut stmt = conn.prepare(
        "SELECT predicted_label FROM disease_predictions WHERE owner_id = ? ORDER BY id",
    )?;
    let rows = stmt.query_map(params![owner_id], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<String>, _>>()?)
}
