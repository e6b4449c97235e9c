//! Field lifecycle service
//!
//! State machine over `(status, verified)`:
//!
//! ```text
//!   create ─► (pending, false) ─approve─► (approved, false) ─verify─► (approved, true)
//!                │                            ▲
//!                └─reject─► (rejected, false) ┘ approve
//! ```
//!
//! Staff drive every status change. Owners may edit or delete a field until it
//! is verified. Each operation runs in one `IMMEDIATE` transaction and checks,
//! in order: existence, the verified lock (edits and deletes), role and
//! ownership, then the current state.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{FieldDeletePolicy, LifecyclePolicy};
use crate::db::models::{CropRecord, Field, FieldStatus, FieldUpdate, NewField};
use crate::db::{catalog, crops, fields, RecordsDb};
use crate::eligibility;
use crate::error::RecordsError;
use crate::identity::Actor;
use crate::policy::{authorize, authorize_read, Transition};

use super::events::{EventBus, RecordEvent};

/// Outcome of a field deletion
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldDeletion {
    pub id: String,
    /// Unverified crop records removed with the field
    pub cascaded_crops: usize,
}

/// Field lifecycle manager
pub struct FieldService {
    db: Arc<RecordsDb>,
    events: Arc<EventBus>,
    policy: LifecyclePolicy,
}

impl FieldService {
    pub fn new(db: Arc<RecordsDb>, events: Arc<EventBus>, policy: LifecyclePolicy) -> Self {
        Self { db, events, policy }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get a field the actor may read
    pub fn get(&self, actor: &Actor, id: &str) -> Result<Field, RecordsError> {
        let field = self.db.with_conn(|conn| load_field(conn, id))?;
        authorize_read(actor, &field.owner_id)?;
        Ok(field)
    }

    /// The actor's own fields, newest first
    pub fn list_own(&self, actor: &Actor) -> Result<Vec<Field>, RecordsError> {
        self.db.with_conn(|conn| fields::list_fields_by_owner(conn, &actor.id))
    }

    /// Staff review queue; defaults to pending fields
    pub fn list_for_review(
        &self,
        actor: &Actor,
        status: Option<FieldStatus>,
    ) -> Result<Vec<Field>, RecordsError> {
        if !actor.is_staff() {
            return Err(RecordsError::Forbidden(format!("{} may not view the review queue", actor)));
        }
        let status = status.unwrap_or(FieldStatus::Pending);
        self.db.with_conn(|conn| fields::list_fields_by_status(conn, status))
    }

    /// Crop records of a field usable for disease detection as of `as_of`
    pub fn eligible_crops(
        &self,
        actor: &Actor,
        field_id: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<CropRecord>, RecordsError> {
        let (field, field_crops) = self.db.with_read_tx(|tx| {
            let field = load_field(tx, field_id)?;
            let field_crops = crops::list_crops_for_field(tx, field_id)?;
            Ok((field, field_crops))
        })?;
        authorize_read(actor, &field.owner_id)?;

        Ok(eligibility::eligible_crops(&field, &field_crops, as_of))
    }

    // =========================================================================
    // Owner Operations
    // =========================================================================

    /// Register a new field as `(pending, false)`
    pub fn create(&self, actor: &Actor, input: NewField) -> Result<Field, RecordsError> {
        authorize(actor, Transition::CreateField, None)?;

        let now = Utc::now();
        let field = Field {
            id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            area_hectares: input.area_hectares,
            latitude: input.latitude,
            longitude: input.longitude,
            mandal_id: input.mandal_id,
            village_id: input.village_id,
            owner_id: actor.id.clone(),
            status: FieldStatus::Pending,
            verified: false,
            created_at: now,
            updated_at: now,
            approved_at: None,
            verified_at: None,
            reviewed_by: None,
        };

        self.db.with_tx(|tx| {
            validate_field(tx, &field)?;
            fields::insert_field(tx, &field)
        })?;

        info!(
            field_id = %field.id,
            owner = %field.owner_id,
            area = field.area_hectares,
            "Field registered"
        );
        self.events.emit(RecordEvent::FieldCreated {
            id: field.id.clone(),
            owner_id: field.owner_id.clone(),
        });

        Ok(field)
    }

    /// Edit owner attributes of an unverified field. Status is left untouched.
    pub fn update(
        &self,
        actor: &Actor,
        id: &str,
        update: FieldUpdate,
    ) -> Result<Field, RecordsError> {
        if update.is_empty() {
            return Err(RecordsError::Validation("no attributes to update".into()));
        }

        let enforce_area = self.policy.enforce_crop_area;
        let field = self.db.with_tx(|tx| {
            let mut field = load_field(tx, id)?;
            ensure_unlocked(&field)?;
            authorize(actor, Transition::UpdateField, Some(&field.owner_id))?;

            update.apply_to(&mut field);
            field.name = field.name.trim().to_string();
            field.updated_at = Utc::now();
            validate_field(tx, &field)?;

            if enforce_area {
                if let Some(largest) = crops::max_area_for_field(tx, id)? {
                    if largest > field.area_hectares {
                        return Err(RecordsError::Validation(format!(
                            "area {} ha is smaller than an existing crop record ({} ha)",
                            field.area_hectares, largest
                        )));
                    }
                }
            }

            guard(fields::update_attributes(tx, &field)?, "field", id)?;
            load_field(tx, id)
        })?;

        debug!(field_id = %id, "Field updated");
        self.events.emit(RecordEvent::FieldUpdated { id: id.to_string() });
        Ok(field)
    }

    /// Delete an unverified field.
    ///
    /// Verified crop records always block deletion. Unverified ones are
    /// removed or block deletion according to [`FieldDeletePolicy`].
    pub fn delete(&self, actor: &Actor, id: &str) -> Result<FieldDeletion, RecordsError> {
        let delete_policy = self.policy.field_delete;
        let deletion = self.db.with_tx(|tx| {
            let field = load_field(tx, id)?;
            ensure_unlocked(&field)?;
            authorize(actor, Transition::DeleteField, Some(&field.owner_id))?;

            let dependents = crops::count_for_field(tx, id)?;
            if dependents.verified > 0 {
                return Err(RecordsError::Locked(format!(
                    "field {} has {} verified crop record(s)",
                    id, dependents.verified
                )));
            }

            let cascaded_crops = match (delete_policy, dependents.unverified()) {
                (_, 0) => 0,
                (FieldDeletePolicy::Refuse, n) => {
                    return Err(RecordsError::InvalidTransition(format!(
                        "field {} still has {} crop record(s)",
                        id, n
                    )));
                }
                (FieldDeletePolicy::Cascade, _) => crops::delete_unverified_for_field(tx, id)?,
            };

            guard(fields::delete_field(tx, id)?, "field", id)?;
            Ok(FieldDeletion {
                id: id.to_string(),
                cascaded_crops,
            })
        })?;

        info!(field_id = %id, cascaded_crops = deletion.cascaded_crops, "Field deleted");
        self.events.emit(RecordEvent::FieldDeleted {
            id: id.to_string(),
            cascaded_crops: deletion.cascaded_crops,
        });
        Ok(deletion)
    }

    // =========================================================================
    // Staff Transitions
    // =========================================================================

    /// `(pending | rejected, false)` → `(approved, false)`
    pub fn approve(&self, actor: &Actor, id: &str) -> Result<Field, RecordsError> {
        self.change_status(actor, id, Transition::ApproveField, FieldStatus::Approved)
    }

    /// `(pending, false)` → `(rejected, false)`
    pub fn reject(&self, actor: &Actor, id: &str) -> Result<Field, RecordsError> {
        self.change_status(actor, id, Transition::RejectField, FieldStatus::Rejected)
    }

    /// `(approved, false)` → `(approved, true)`; terminal
    pub fn verify(&self, actor: &Actor, id: &str) -> Result<Field, RecordsError> {
        let field = self.db.with_tx(|tx| {
            let field = load_field(tx, id)?;
            authorize(actor, Transition::VerifyField, Some(&field.owner_id))?;

            if field.status != FieldStatus::Approved || field.verified {
                return Err(RecordsError::InvalidTransition(format!(
                    "field {} is ({}, verified={}); only (approved, verified=false) can be \
                     verified",
                    id, field.status, field.verified
                )));
            }

            guard(fields::mark_verified(tx, id, &actor.id, Utc::now())?, "field", id)?;
            load_field(tx, id)
        })?;

        info!(field_id = %id, reviewer = %actor.id, "Field verified");
        self.events.emit(RecordEvent::FieldVerified {
            id: id.to_string(),
            reviewer: actor.id.clone(),
        });
        Ok(field)
    }

    fn change_status(
        &self,
        actor: &Actor,
        id: &str,
        transition: Transition,
        to: FieldStatus,
    ) -> Result<Field, RecordsError> {
        let field = self.db.with_tx(|tx| {
            let field = load_field(tx, id)?;
            authorize(actor, transition, Some(&field.owner_id))?;

            let allowed_from: &[FieldStatus] = match to {
                FieldStatus::Approved => &[FieldStatus::Pending, FieldStatus::Rejected],
                FieldStatus::Rejected => &[FieldStatus::Pending],
                FieldStatus::Pending => &[],
            };
            if field.verified || !allowed_from.contains(&field.status) {
                return Err(RecordsError::InvalidTransition(format!(
                    "cannot {} field {} in state ({}, verified={})",
                    transition, id, field.status, field.verified
                )));
            }

            guard(
                fields::transition_status(tx, id, field.status, to, &actor.id, Utc::now())?,
                "field",
                id,
            )?;
            load_field(tx, id)
        })?;

        info!(field_id = %id, status = %to, reviewer = %actor.id, "Field status changed");
        self.events.emit(RecordEvent::FieldStatusChanged {
            id: id.to_string(),
            status: to,
            reviewer: actor.id.clone(),
        });
        Ok(field)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn load_field(conn: &Connection, id: &str) -> Result<Field, RecordsError> {
    fields::get_field(conn, id)?.ok_or_else(|| RecordsError::NotFound(format!("field {}", id)))
}

fn ensure_unlocked(field: &Field) -> Result<(), RecordsError> {
    if field.verified {
        return Err(RecordsError::Locked(format!("field {}", field.id)));
    }
    Ok(())
}

/// Turn a zero-row guarded write into a conflict
pub(crate) fn guard(changed: usize, kind: &str, id: &str) -> Result<(), RecordsError> {
    if changed == 0 {
        return Err(RecordsError::Conflict(format!("{} {} changed concurrently", kind, id)));
    }
    Ok(())
}

fn validate_field(conn: &Connection, field: &Field) -> Result<(), RecordsError> {
    if field.name.is_empty() {
        return Err(RecordsError::Validation("name is required".into()));
    }
    if field.name.len() > 200 {
        return Err(RecordsError::Validation("name must be <= 200 characters".into()));
    }
    if !field.area_hectares.is_finite() || field.area_hectares <= 0.0 {
        return Err(RecordsError::Validation("areaHectares must be positive".into()));
    }
    if !(-90.0..=90.0).contains(&field.latitude) {
        return Err(RecordsError::Validation("latitude must be within [-90, 90]".into()));
    }
    if !(-180.0..=180.0).contains(&field.longitude) {
        return Err(RecordsError::Validation("longitude must be within [-180, 180]".into()));
    }
    if !catalog::mandal_exists(conn, &field.mandal_id)? {
        return Err(RecordsError::Validation(format!("unknown mandal '{}'", field.mandal_id)));
    }
    if !catalog::village_in_mandal(conn, &field.mandal_id, &field.village_id)? {
        return Err(RecordsError::Validation(format!(
            "village '{}' is not in mandal '{}'",
            field.village_id, field.mandal_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{apply_seed, CatalogSeed};

    fn setup(policy: LifecyclePolicy) -> FieldService {
        let db = Arc::new(RecordsDb::open_in_memory().unwrap());
        let seed: CatalogSeed = serde_json::from_str(
            r#"{"mandals": [{
                "id": "m1",
                "name": "Kondapur",
                "villages": [{"id": "v1", "name": "Gachibowli"}]
            }]}"#,
        )
        .unwrap();
        db.with_conn_mut(|conn| apply_seed(conn, &seed)).unwrap();
        FieldService::new(db, Arc::new(EventBus::new()), policy)
    }

    fn new_field() -> NewField {
        NewField {
            name: "East plot".into(),
            area_hectares: 3.0,
            latitude: 17.45,
            longitude: 78.36,
            mandal_id: "m1".into(),
            village_id: "v1".into(),
        }
    }

    #[test]
    fn test_full_lifecycle() {
        let svc = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        let employee = Actor::employee("e1");

        let field = svc.create(&farmer, new_field()).unwrap();
        assert_eq!((field.status, field.verified), (FieldStatus::Pending, false));

        let field = svc.reject(&employee, &field.id).unwrap();
        assert_eq!(field.status, FieldStatus::Rejected);

        let field = svc.approve(&employee, &field.id).unwrap();
        assert_eq!(field.status, FieldStatus::Approved);
        assert!(field.approved_at.is_some());
        assert_eq!(field.reviewed_by.as_deref(), Some("e1"));

        let field = svc.verify(&Actor::admin("a1"), &field.id).unwrap();
        assert!(field.verified);
        assert_eq!(field.status, FieldStatus::Approved);
    }

    #[test]
    fn test_invalid_transitions() {
        let svc = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        let employee = Actor::employee("e1");
        let field = svc.create(&farmer, new_field()).unwrap();

        // verify requires exactly (approved, false)
        assert!(matches!(
            svc.verify(&employee, &field.id),
            Err(RecordsError::InvalidTransition(_))
        ));

        svc.approve(&employee, &field.id).unwrap();
        assert!(matches!(
            svc.reject(&employee, &field.id),
            Err(RecordsError::InvalidTransition(_))
        ));
        assert!(matches!(
            svc.approve(&employee, &field.id),
            Err(RecordsError::InvalidTransition(_))
        ));

        svc.verify(&employee, &field.id).unwrap();
        assert!(matches!(
            svc.verify(&employee, &field.id),
            Err(RecordsError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_role_and_ownership() {
        let svc = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        let field = svc.create(&farmer, new_field()).unwrap();

        assert!(matches!(svc.approve(&farmer, &field.id), Err(RecordsError::Forbidden(_))));
        assert!(matches!(
            svc.create(&Actor::employee("e1"), new_field()),
            Err(RecordsError::Forbidden(_))
        ));
        let rename = FieldUpdate {
            name: Some("Mine".into()),
            ..Default::default()
        };
        assert!(matches!(
            svc.update(&Actor::farmer("u2"), &field.id, rename),
            Err(RecordsError::Forbidden(_))
        ));
        assert!(matches!(
            svc.get(&Actor::farmer("u2"), &field.id),
            Err(RecordsError::Forbidden(_))
        ));
        assert!(svc.get(&Actor::employee("e1"), &field.id).is_ok());
        assert!(matches!(
            svc.approve(&Actor::admin("a1"), "missing"),
            Err(RecordsError::NotFound(_))
        ));
    }

    #[test]
    fn test_validation_against_catalog() {
        let svc = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");

        let mut input = new_field();
        input.village_id = "v9".into();
        assert!(matches!(svc.create(&farmer, input), Err(RecordsError::Validation(_))));

        let mut input = new_field();
        input.area_hectares = 0.0;
        assert!(matches!(svc.create(&farmer, input), Err(RecordsError::Validation(_))));

        let mut input = new_field();
        input.latitude = 123.0;
        assert!(matches!(svc.create(&farmer, input), Err(RecordsError::Validation(_))));
        assert!(svc.list_own(&farmer).unwrap().is_empty());
    }

    #[test]
    fn test_update_keeps_status() {
        let svc = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        let field = svc.create(&farmer, new_field()).unwrap();
        svc.approve(&Actor::employee("e1"), &field.id).unwrap();

        let resize = FieldUpdate {
            area_hectares: Some(4.5),
            ..Default::default()
        };
        let updated = svc.update(&farmer, &field.id, resize).unwrap();
        assert_eq!(updated.area_hectares, 4.5);
        assert_eq!(updated.status, FieldStatus::Approved);

        assert!(matches!(
            svc.update(&farmer, &field.id, FieldUpdate::default()),
            Err(RecordsError::Validation(_))
        ));
    }

    #[test]
    fn test_review_queue_is_staff_only() {
        let svc = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        svc.create(&farmer, new_field()).unwrap();
        svc.create(&farmer, new_field()).unwrap();

        assert_eq!(svc.list_for_review(&Actor::employee("e1"), None).unwrap().len(), 2);
        assert!(svc
            .list_for_review(&Actor::employee("e1"), Some(FieldStatus::Approved))
            .unwrap()
            .is_empty());
        assert!(matches!(svc.list_for_review(&farmer, None), Err(RecordsError::Forbidden(_))));
    }
}
