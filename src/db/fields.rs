//! Field repository
//!
//! Write functions return the number of affected rows. Each guarded statement
//! carries the state the caller observed, so a zero count means the row moved
//! underneath the caller.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::models::{Field, FieldStatus};
use crate::error::RecordsError;

/// Insert a new field
pub fn insert_field(conn: &Connection, field: &Field) -> Result<(), RecordsError> {
    conn.execute(
        r#"
        INSERT INTO fields (
            id, name, area_hectares, latitude, longitude, mandal_id, village_id,
            owner_id, status, verified, created_at, updated_at, approved_at, verified_at,
            reviewed_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            field.id,
            field.name,
            field.area_hectares,
            field.latitude,
            field.longitude,
            field.mandal_id,
            field.village_id,
            field.owner_id,
            field.status,
            field.verified,
            field.created_at,
            field.updated_at,
            field.approved_at,
            field.verified_at,
            field.reviewed_by,
        ],
    )?;
    Ok(())
}

/// Get a field by ID
pub fn get_field(conn: &Connection, id: &str) -> Result<Option<Field>, RecordsError> {
    Ok(conn
        .query_row("SELECT * FROM fields WHERE id = ?", params![id], |row| Field::from_row(row))
        .optional()?)
}

/// Fields owned by a farmer, newest first
pub fn list_fields_by_owner(conn: &Connection, owner_id: &str) -> Result<Vec<Field>, RecordsError> {
    let mut stmt =
        conn.prepare("SELECT * FROM fields WHERE owner_id = ? ORDER BY created_at DESC, id")?;
    let rows = stmt.query_map(params![owner_id], |row| Field::from_row(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Fields in a given status, oldest first (review queue order)
pub fn list_fields_by_status(
    conn: &Connection,
    status: FieldStatus,
) -> Result<Vec<Field>, RecordsError> {
    debug!(status = %status, "Listing fields by status");
    let mut stmt =
        conn.prepare("SELECT * FROM fields WHERE status = ? ORDER BY created_at ASC, id")?;
    let rows = stmt.query_map(params![status], |row| Field::from_row(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Move an unverified field from `from` to `to`
pub fn transition_status(
    conn: &Connection,
    id: &str,
    from: FieldStatus,
    to: FieldStatus,
    reviewer: &str,
    now: DateTime<Utc>,
) -> Result<usize, RecordsError> {
    let approved_at = (to == FieldStatus::Approved).then_some(now);
    let changed = conn.execute(
        r#"
        UPDATE fields
        SET status = ?1,
            approved_at = COALESCE(?2, approved_at),
            reviewed_by = ?3,
            updated_at = ?4
        WHERE id = ?5 AND status = ?6 AND verified = 0
        "#,
        params![to, approved_at, reviewer, now, id, from],
    )?;
    Ok(changed)
}

/// Mark an approved, unverified field as verified
pub fn mark_verified(
    conn: &Connection,
    id: &str,
    reviewer: &str,
    now: DateTime<Utc>,
) -> Result<usize, RecordsError> {
    let changed = conn.execute(
        r#"
        UPDATE fields
        SET verified = 1, verified_at = ?1, reviewed_by = ?2, updated_at = ?1
        WHERE id = ?3 AND status = 'approved' AND verified = 0
        "#,
        params![now, reviewer, id],
    )?;
    Ok(changed)
}

/// Overwrite the owner-editable attributes of an unverified field
pub fn update_attributes(conn: &Connection, field: &Field) -> Result<usize, RecordsError> {
    let changed = conn.execute(
        r#"
        UPDATE fields
        SET name = ?1, area_hectares = ?2, latitude = ?3, longitude = ?4,
            mandal_id = ?5, village_id = ?6, updated_at = ?7
        WHERE id = ?8 AND verified = 0
        "#,
        params![
            field.name,
            field.area_hectares,
            field.latitude,
            field.longitude,
            field.mandal_id,
            field.village_id,
            field.updated_at,
            field.id,
        ],
    )?;
    Ok(changed)
}

/// Delete an unverified field
pub fn delete_field(conn: &Connection, id: &str) -> Result<usize, RecordsError> {
    Ok(conn.execute("DELETE FROM fields WHERE id = ? AND verified = 0", params![id])?)
}

/// Every field owned by a farmer, for analytics
pub fn all_fields_for_owner(conn: &Connection, owner_id: &str) -> Result<Vec<Field>, RecordsError> {
    let mut stmt = conn.prepare("SELECT * FROM fields WHERE owner_id = ? ORDER BY id")?;
    let rows = stmt.query_map(params![owner_id], |row| Field::from_row(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        init_schema(&conn).expect("Failed to init schema");
        conn
    }

    fn sample_field(id: &str, owner: &str) -> Field {
        let now = Utc::now();
        Field {
            id: id.to_string(),
            name: "North plot".to_string(),
            area_hectares: 2.5,
            latitude: 17.4,
            longitude: 78.5,
            mandal_id: "m1".to_string(),
            village_id: "v1".to_string(),
            owner_id: owner.to_string(),
            status: FieldStatus::Pending,
            verified: false,
            created_at: now,
            updated_at: now,
            approved_at: None,
            verified_at: None,
            reviewed_by: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = setup_test_db();
        let field = sample_field("f1", "u1");
        insert_field(&conn, &field).unwrap();

        let loaded = get_field(&conn, "f1").unwrap().unwrap();
        assert_eq!(loaded.name, "North plot");
        assert_eq!(loaded.status, FieldStatus::Pending);
        assert!(!loaded.verified);
        assert!(get_field(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_guarded_transition_uses_observed_state() {
        let conn = setup_test_db();
        insert_field(&conn, &sample_field("f1", "u1")).unwrap();

        let now = Utc::now();
        let transition = |to| transition_status(&conn, "f1", FieldStatus::Pending, to, "e1", now);
        assert_eq!(transition(FieldStatus::Approved).unwrap(), 1);
        // Stale observation: the field is no longer pending
        assert_eq!(transition(FieldStatus::Rejected).unwrap(), 0);

        let loaded = get_field(&conn, "f1").unwrap().unwrap();
        assert_eq!(loaded.status, FieldStatus::Approved);
        assert!(loaded.approved_at.is_some());
    }

    #[test]
    fn test_verified_rows_are_frozen_by_trigger() {
        let conn = setup_test_db();
        insert_field(&conn, &sample_field("f1", "u1")).unwrap();
        let now = Utc::now();
        transition_status(&conn, "f1", FieldStatus::Pending, FieldStatus::Approved, "e1", now)
            .unwrap();
        assert_eq!(mark_verified(&conn, "f1", "e1", now).unwrap(), 1);

        // Guarded statements skip the row, raw statements hit the trigger
        assert_eq!(delete_field(&conn, "f1").unwrap(), 0);
        assert!(conn.execute("UPDATE fields SET name = 'x' WHERE id = 'f1'", []).is_err());
        assert!(conn.execute("DELETE FROM fields WHERE id = 'f1'", []).is_err());
    }

    #[test]
    fn test_list_by_owner_and_status() {
        let conn = setup_test_db();
        insert_field(&conn, &sample_field("f1", "u1")).unwrap();
        insert_field(&conn, &sample_field("f2", "u1")).unwrap();
        insert_field(&conn, &sample_field("f3", "u2")).unwrap();

        assert_eq!(list_fields_by_owner(&conn, "u1").unwrap().len(), 2);
        assert_eq!(list_fields_by_status(&conn, FieldStatus::Pending).unwrap().len(), 3);
        assert!(list_fields_by_status(&conn, FieldStatus::Approved).unwrap().is_empty());
    }
}
