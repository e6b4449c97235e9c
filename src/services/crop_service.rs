//! Crop record lifecycle service
//!
//! A crop record starts unverified. Staff verify it once; after that it can
//! neither be edited nor deleted, and there is no way back.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::LifecyclePolicy;
use crate::db::models::{CropRecord, CropUpdate, Field, NewCropRecord};
use crate::db::{catalog, crops, fields, RecordsDb};
use crate::error::RecordsError;
use crate::identity::Actor;
use crate::policy::{authorize, authorize_read, Transition};

use super::events::{EventBus, RecordEvent};
use super::field_service::guard;

/// Accepted crop years
const CROP_YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=2200;

/// Crop record lifecycle manager
pub struct CropService {
    db: Arc<RecordsDb>,
    events: Arc<EventBus>,
    policy: LifecyclePolicy,
}

impl CropService {
    pub fn new(db: Arc<RecordsDb>, events: Arc<EventBus>, policy: LifecyclePolicy) -> Self {
        Self { db, events, policy }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, actor: &Actor, id: &str) -> Result<CropRecord, RecordsError> {
        let (crop, owner_id) = self.db.with_conn(|conn| load_crop(conn, id))?;
        authorize_read(actor, &owner_id)?;
        Ok(crop)
    }

    /// The actor's crop records, latest crop year first
    pub fn list_own(&self, actor: &Actor) -> Result<Vec<CropRecord>, RecordsError> {
        self.db.with_conn(|conn| crops::list_crops_by_owner(conn, &actor.id))
    }

    /// Crop records of one field the actor may read
    pub fn list_for_field(
        &self,
        actor: &Actor,
        field_id: &str,
    ) -> Result<Vec<CropRecord>, RecordsError> {
        let (field, field_crops) = self.db.with_read_tx(|tx| {
            let field = load_parent(tx, field_id)?
                .ok_or_else(|| RecordsError::NotFound(format!("field {}", field_id)))?;
            Ok((field, crops::list_crops_for_field(tx, field_id)?))
        })?;
        authorize_read(actor, &field.owner_id)?;
        Ok(field_crops)
    }

    /// Staff queue of crop records awaiting verification
    pub fn list_unverified(&self, actor: &Actor) -> Result<Vec<CropRecord>, RecordsError> {
        if !actor.is_staff() {
            return Err(RecordsError::Forbidden(format!("{} may not view the review queue", actor)));
        }
        self.db.with_conn(crops::list_unverified_crops)
    }

    // =========================================================================
    // Owner Operations
    // =========================================================================

    /// Log a crop record against one of the actor's fields.
    ///
    /// The field may be in any approval state. An unknown field is a
    /// validation error and nothing is written.
    pub fn create(&self, actor: &Actor, input: NewCropRecord) -> Result<CropRecord, RecordsError> {
        let now = Utc::now();
        let crop = CropRecord {
            id: Uuid::new_v4().to_string(),
            field_id: input.field_id,
            crop_type_id: input.crop_type_id,
            crop_year: input.crop_year,
            season: input.season,
            area_hectares: input.area_hectares,
            production: input.production,
            verified: false,
            created_at: now,
            updated_at: now,
            verified_at: None,
            verified_by: None,
        };

        let enforce_area = self.policy.enforce_crop_area;
        self.db.with_tx(|tx| {
            let field = load_parent(tx, &crop.field_id)?.ok_or_else(|| {
                RecordsError::Validation(format!("unknown field '{}'", crop.field_id))
            })?;
            authorize(actor, Transition::CreateCrop, Some(&field.owner_id))?;
            validate_crop(tx, &crop, &field, enforce_area)?;
            crops::insert_crop(tx, &crop)
        })?;

        info!(
            crop_id = %crop.id,
            field_id = %crop.field_id,
            year = crop.crop_year,
            season = %crop.season,
            "Crop record created"
        );
        self.events.emit(RecordEvent::CropCreated {
            id: crop.id.clone(),
            field_id: crop.field_id.clone(),
        });
        Ok(crop)
    }

    /// Edit an unverified crop record. The parent field cannot be changed.
    pub fn update(
        &self,
        actor: &Actor,
        id: &str,
        update: CropUpdate,
    ) -> Result<CropRecord, RecordsError> {
        if update.is_empty() {
            return Err(RecordsError::Validation("no attributes to update".into()));
        }

        let enforce_area = self.policy.enforce_crop_area;
        let crop = self.db.with_tx(|tx| {
            let (mut crop, owner_id) = load_crop(tx, id)?;
            ensure_unlocked(&crop)?;
            authorize(actor, Transition::UpdateCrop, Some(&owner_id))?;

            update.apply_to(&mut crop);
            crop.updated_at = Utc::now();

            let field = load_parent(tx, &crop.field_id)?
                .ok_or_else(|| RecordsError::Internal(format!("crop {} has no field", id)))?;
            validate_crop(tx, &crop, &field, enforce_area)?;

            guard(crops::update_attributes(tx, &crop)?, "crop record", id)?;
            Ok(load_crop(tx, id)?.0)
        })?;

        debug!(crop_id = %id, "Crop record updated");
        self.events.emit(RecordEvent::CropUpdated { id: id.to_string() });
        Ok(crop)
    }

    pub fn delete(&self, actor: &Actor, id: &str) -> Result<(), RecordsError> {
        self.db.with_tx(|tx| {
            let (crop, owner_id) = load_crop(tx, id)?;
            ensure_unlocked(&crop)?;
            authorize(actor, Transition::DeleteCrop, Some(&owner_id))?;
            guard(crops::delete_crop(tx, id)?, "crop record", id)
        })?;

        info!(crop_id = %id, "Crop record deleted");
        self.events.emit(RecordEvent::CropDeleted { id: id.to_string() });
        Ok(())
    }

    // =========================================================================
    // Staff Transitions
    // =========================================================================

    /// `verified: false` → `true`; terminal
    pub fn verify(&self, actor: &Actor, id: &str) -> Result<CropRecord, RecordsError> {
        let crop = self.db.with_tx(|tx| {
            let (crop, owner_id) = load_crop(tx, id)?;
            authorize(actor, Transition::VerifyCrop, Some(&owner_id))?;
            ensure_unlocked(&crop)?;

            guard(crops::mark_verified(tx, id, &actor.id, Utc::now())?, "crop record", id)?;
            Ok(load_crop(tx, id)?.0)
        })?;

        info!(crop_id = %id, reviewer = %actor.id, "Crop record verified");
        self.events.emit(RecordEvent::CropVerified {
            id: id.to_string(),
            reviewer: actor.id.clone(),
        });
        Ok(crop)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn load_crop(conn: &Connection, id: &str) -> Result<(CropRecord, String), RecordsError> {
    crops::get_crop_with_owner(conn, id)?
        .ok_or_else(|| RecordsError::NotFound(format!("crop record {}", id)))
}

fn load_parent(conn: &Connection, field_id: &str) -> Result<Option<Field>, RecordsError> {
    fields::get_field(conn, field_id)
}

fn ensure_unlocked(crop: &CropRecord) -> Result<(), RecordsError> {
    if crop.verified {
        return Err(RecordsError::Locked(format!("crop record {}", crop.id)));
    }
    Ok(())
}

fn validate_crop(
    conn: &Connection,
    crop: &CropRecord,
    field: &Field,
    enforce_area: bool,
) -> Result<(), RecordsError> {
    if catalog::crop_type_name(conn, &crop.crop_type_id)?.is_none() {
        return Err(RecordsError::Validation(format!("unknown crop type '{}'", crop.crop_type_id)));
    }
    if !CROP_YEAR_RANGE.contains(&crop.crop_year) {
        return Err(RecordsError::Validation(format!(
            "cropYear {} is out of range",
            crop.crop_year
        )));
    }
    if !crop.area_hectares.is_finite() || crop.area_hectares <= 0.0 {
        return Err(RecordsError::Validation("areaHectares must be positive".into()));
    }
    if !crop.production.is_finite() || crop.production < 0.0 {
        return Err(RecordsError::Validation("production must not be negative".into()));
    }
    if enforce_area && crop.area_hectares > field.area_hectares {
        return Err(RecordsError::Validation(format!(
            "areaHectares {} exceeds field area {}",
            crop.area_hectares, field.area_hectares
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldDeletePolicy;
    use crate::db::catalog::{apply_seed, CatalogSeed};
    use crate::db::models::{NewField, Season};
    use crate::services::field_service::FieldService;

    struct Fixture {
        db: Arc<RecordsDb>,
        fields: FieldService,
        crops: CropService,
        field_id: String,
    }

    fn setup(policy: LifecyclePolicy) -> Fixture {
        let db = Arc::new(RecordsDb::open_in_memory().unwrap());
        let seed: CatalogSeed = serde_json::from_str(
            r#"{
                "mandals": [{
                    "id": "m1",
                    "name": "Kondapur",
                    "villages": [{"id": "v1", "name": "Gachibowli"}]
                }],
                "cropTypes": [{"id": "rice", "name": "Rice"}, {"id": "cotton", "name": "Cotton"}]
            }"#,
        )
        .unwrap();
        db.with_conn_mut(|conn| apply_seed(conn, &seed)).unwrap();

        let events = Arc::new(EventBus::new());
        let fields = FieldService::new(db.clone(), events.clone(), policy);
        let crops = CropService::new(db.clone(), events, policy);
        let field = fields
            .create(
                &Actor::farmer("u1"),
                NewField {
                    name: "North plot".into(),
                    area_hectares: 2.0,
                    latitude: 17.4,
                    longitude: 78.4,
                    mandal_id: "m1".into(),
                    village_id: "v1".into(),
                },
            )
            .unwrap();

        Fixture { db, fields, crops, field_id: field.id }
    }

    fn new_crop(field_id: &str, area: f64) -> NewCropRecord {
        NewCropRecord {
            field_id: field_id.into(),
            crop_type_id: "rice".into(),
            crop_year: 2026,
            season: Season::Kharif,
            area_hectares: area,
            production: 4.2,
        }
    }

    #[test]
    fn test_create_on_pending_field() {
        let fx = setup(LifecyclePolicy::default());
        let crop = fx.crops.create(&Actor::farmer("u1"), new_crop(&fx.field_id, 1.5)).unwrap();
        assert!(!crop.verified);
        assert_eq!(fx.crops.list_own(&Actor::farmer("u1")).unwrap(), vec![crop]);
    }

    #[test]
    fn test_unknown_field_persists_nothing() {
        let fx = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        assert!(matches!(
            fx.crops.create(&farmer, new_crop("nope", 1.0)),
            Err(RecordsError::Validation(_))
        ));
        assert!(fx.crops.list_own(&farmer).unwrap().is_empty());
    }

    #[test]
    fn test_area_policy() {
        let fx = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        assert!(matches!(
            fx.crops.create(&farmer, new_crop(&fx.field_id, 2.5)),
            Err(RecordsError::Validation(_))
        ));

        let relaxed = setup(LifecyclePolicy { enforce_crop_area: false, ..Default::default() });
        assert!(relaxed.crops.create(&farmer, new_crop(&relaxed.field_id, 2.5)).is_ok());
    }

    #[test]
    fn test_field_cannot_shrink_below_crop() {
        let fx = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        fx.crops.create(&farmer, new_crop(&fx.field_id, 1.5)).unwrap();

        let update = crate::db::models::FieldUpdate {
            area_hectares: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            fx.fields.update(&farmer, &fx.field_id, update),
            Err(RecordsError::Validation(_))
        ));
    }

    #[test]
    fn test_verified_crop_is_locked() {
        let fx = setup(LifecyclePolicy::default());
        let farmer = Actor::farmer("u1");
        let admin = Actor::admin("a1");
        let crop = fx.crops.create(&farmer, new_crop(&fx.field_id, 1.0)).unwrap();

        assert!(matches!(fx.crops.verify(&farmer, &crop.id), Err(RecordsError::Forbidden(_))));
        let verified = fx.crops.verify(&admin, &crop.id).unwrap();
        assert!(verified.verified);
        assert_eq!(verified.verified_by.as_deref(), Some("a1"));

        let update = CropUpdate { production: Some(9.0), ..Default::default() };
        assert!(matches!(
            fx.crops.update(&farmer, &crop.id, update.clone()),
            Err(RecordsError::Locked(_))
        ));
        assert!(matches!(fx.crops.update(&admin, &crop.id, update), Err(RecordsError::Locked(_))));
        assert!(matches!(fx.crops.delete(&farmer, &crop.id), Err(RecordsError::Locked(_))));
        assert!(matches!(fx.crops.delete(&admin, &crop.id), Err(RecordsError::Locked(_))));
        assert!(matches!(fx.crops.verify(&admin, &crop.id), Err(RecordsError::Locked(_))));
    }

    #[test]
    fn test_delete_field_policies() {
        let farmer = Actor::farmer("u1");

        let fx = setup(LifecyclePolicy::default());
        fx.crops.create(&farmer, new_crop(&fx.field_id, 1.0)).unwrap();
        fx.crops.create(&farmer, new_crop(&fx.field_id, 0.5)).unwrap();
        let deletion = fx.fields.delete(&farmer, &fx.field_id).unwrap();
        assert_eq!(deletion.cascaded_crops, 2);
        assert!(fx.crops.list_own(&farmer).unwrap().is_empty());

        let refuse = setup(LifecyclePolicy {
            field_delete: FieldDeletePolicy::Refuse,
            ..Default::default()
        });
        refuse.crops.create(&farmer, new_crop(&refuse.field_id, 1.0)).unwrap();
        assert!(matches!(
            refuse.fields.delete(&farmer, &refuse.field_id),
            Err(RecordsError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_verified_crop_blocks_field_delete() {
        let farmer = Actor::farmer("u1");

        for field_delete in [FieldDeletePolicy::Cascade, FieldDeletePolicy::Refuse] {
            let fx = setup(LifecyclePolicy {
                field_delete,
                ..Default::default()
            });
            let verified = fx.crops.create(&farmer, new_crop(&fx.field_id, 1.0)).unwrap();
            let pending = fx.crops.create(&farmer, new_crop(&fx.field_id, 0.5)).unwrap();
            fx.crops.verify(&Actor::employee("e1"), &verified.id).unwrap();

            // Locked wins over the refuse policy's InvalidTransition
            let result = fx.fields.delete(&farmer, &fx.field_id);
            assert!(
                matches!(result, Err(RecordsError::Locked(_))),
                "{:?}: expected Locked, got {:?}",
                field_delete,
                result
            );

            // Nothing was removed, including the unverified record
            assert!(fx.fields.get(&farmer, &fx.field_id).is_ok());
            assert!(fx.crops.get(&farmer, &verified.id).is_ok());
            assert!(fx.crops.get(&farmer, &pending.id).is_ok());

            let raw = fx.db.with_conn(|conn| {
                conn.execute("DELETE FROM crop_records WHERE id = ?1", [&verified.id])?;
                Ok(())
            });
            assert!(matches!(raw, Err(RecordsError::Locked(_))));
        }
    }

    #[test]
    fn test_other_farmer_cannot_touch() {
        let fx = setup(LifecyclePolicy::default());
        let stranger = Actor::farmer("u2");
        assert!(matches!(
            fx.crops.create(&stranger, new_crop(&fx.field_id, 1.0)),
            Err(RecordsError::Forbidden(_))
        ));

        let crop = fx.crops.create(&Actor::farmer("u1"), new_crop(&fx.field_id, 1.0)).unwrap();
        assert!(matches!(fx.crops.get(&stranger, &crop.id), Err(RecordsError::Forbidden(_))));
        assert!(matches!(fx.crops.delete(&stranger, &crop.id), Err(RecordsError::Forbidden(_))));
        assert!(matches!(fx.crops.list_unverified(&stranger), Err(RecordsError::Forbidden(_))));
        assert_eq!(fx.crops.list_unverified(&Actor::employee("e1")).unwrap().len(), 1);
    }
}
