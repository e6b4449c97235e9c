//! Lifecycle tests against a file-backed database
//!
//! Several tests open two independent `RecordsDb` handles on the same file to
//! model two service processes sharing one store.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use farm_records::db::catalog::CatalogSeed;
use farm_records::db::models::{
    CropUpdate, FieldStatus, FieldUpdate, NewCropRecord, NewField, Season,
};
use farm_records::services::{CatalogService, CropService, EventBus, FieldService};
use farm_records::{Actor, LifecyclePolicy, RecordsDb, RecordsError};
use tempfile::TempDir;

struct Node {
    db: Arc<RecordsDb>,
    fields: FieldService,
    crops: CropService,
}

fn open_node(temp: &TempDir) -> Node {
    let path = temp.path().join("records.db");
    let db = Arc::new(RecordsDb::open_file(&path, Duration::from_secs(5)).unwrap());
    let events = Arc::new(EventBus::new());
    let policy = LifecyclePolicy::default();
    Node {
        fields: FieldService::new(db.clone(), events.clone(), policy),
        crops: CropService::new(db.clone(), events, policy),
        db,
    }
}

fn seed(node: &Node) {
    let seed: CatalogSeed = serde_json::from_str(
        r#"{
            "mandals": [{
                "id": "m1",
                "name": "Shadnagar",
                "villages": [{"id": "v1", "name": "Kothur"}]
            }],
            "cropTypes": [{"id": "rice", "name": "Rice"}, {"id": "maize", "name": "Maize"}]
        }"#,
    )
    .unwrap();
    CatalogService::new(node.db.clone()).apply_seed(&seed).unwrap();
}

fn farmer() -> Actor {
    Actor::farmer("farmer-1")
}

fn new_field(area: f64) -> NewField {
    NewField {
        name: "Canal plot".into(),
        area_hectares: area,
        latitude: 17.07,
        longitude: 78.2,
        mandal_id: "m1".into(),
        village_id: "v1".into(),
    }
}

fn new_crop(field_id: &str, year: i32) -> NewCropRecord {
    NewCropRecord {
        field_id: field_id.into(),
        crop_type_id: "rice".into(),
        crop_year: year,
        season: Season::Kharif,
        area_hectares: 1.0,
        production: 3.5,
    }
}

#[test]
fn concurrent_verify_and_delete_have_one_winner() {
    let temp = TempDir::new().unwrap();
    let a = open_node(&temp);
    let b = open_node(&temp);
    seed(&a);

    let field = a.fields.create(&farmer(), new_field(5.0)).unwrap();

    for _ in 0..20 {
        let crop = a.crops.create(&farmer(), new_crop(&field.id, 2026)).unwrap();
        let barrier = Barrier::new(2);

        let (verify, delete) = thread::scope(|s| {
            let verify = s.spawn(|| {
                barrier.wait();
                a.crops.verify(&Actor::employee("e1"), &crop.id)
            });
            let delete = s.spawn(|| {
                barrier.wait();
                b.crops.delete(&farmer(), &crop.id)
            });
            (verify.join().unwrap(), delete.join().unwrap())
        });

        match (verify, delete) {
            (Ok(verified), Err(RecordsError::Locked(_))) => {
                assert!(verified.verified);
                assert!(b.crops.get(&farmer(), &crop.id).unwrap().verified);
            }
            (Err(RecordsError::NotFound(_)), Ok(())) => {
                assert!(matches!(a.crops.get(&farmer(), &crop.id), Err(RecordsError::NotFound(_))));
            }
            other => panic!("expected exactly one winner, got {:?}", other),
        }
    }
}

#[test]
fn concurrent_approve_and_reject_have_one_winner() {
    let temp = TempDir::new().unwrap();
    let a = open_node(&temp);
    let b = open_node(&temp);
    seed(&a);

    for _ in 0..10 {
        let field = a.fields.create(&farmer(), new_field(3.0)).unwrap();
        let barrier = Barrier::new(2);

        let (approve, reject) = thread::scope(|s| {
            let approve = s.spawn(|| {
                barrier.wait();
                a.fields.approve(&Actor::employee("e1"), &field.id)
            });
            let reject = s.spawn(|| {
                barrier.wait();
                b.fields.reject(&Actor::admin("a1"), &field.id)
            });
            (approve.join().unwrap(), reject.join().unwrap())
        });

        let stored = a.fields.get(&farmer(), &field.id).unwrap();
        match (approve, reject) {
            // Reject first, then approve from rejected is legal
            (Ok(_), Ok(_)) => assert_eq!(stored.status, FieldStatus::Approved),
            (Ok(_), Err(RecordsError::InvalidTransition(_))) => {
                assert_eq!(stored.status, FieldStatus::Approved)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

#[test]
fn verified_records_are_locked_for_every_role() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    seed(&node);
    let staff = Actor::employee("e1");

    let field = node.fields.create(&farmer(), new_field(4.0)).unwrap();
    let crop = node.crops.create(&farmer(), new_crop(&field.id, 2026)).unwrap();
    node.fields.approve(&staff, &field.id).unwrap();
    let field = node.fields.verify(&staff, &field.id).unwrap();
    assert!(field.verified && field.status == FieldStatus::Approved);
    node.crops.verify(&staff, &crop.id).unwrap();

    for actor in [farmer(), Actor::farmer("farmer-2"), staff.clone(), Actor::admin("a1")] {
        let update = FieldUpdate { name: Some("Renamed".into()), ..Default::default() };
        assert!(matches!(
            node.fields.update(&actor, &field.id, update),
            Err(RecordsError::Locked(_))
        ));
        assert!(matches!(node.fields.delete(&actor, &field.id), Err(RecordsError::Locked(_))));

        let update = CropUpdate { production: Some(1.0), ..Default::default() };
        assert!(matches!(
            node.crops.update(&actor, &crop.id, update),
            Err(RecordsError::Locked(_))
        ));
        assert!(matches!(node.crops.delete(&actor, &crop.id), Err(RecordsError::Locked(_))));
    }

    // No path around the service either
    let raw = node.db.with_conn(|conn| {
        conn.execute("UPDATE crop_records SET production = 0 WHERE id = ?1", [&crop.id])?;
        Ok(())
    });
    assert!(matches!(raw, Err(RecordsError::Locked(_))));
    let raw = node.db.with_conn(|conn| {
        conn.execute("DELETE FROM fields WHERE id = ?1", [&field.id])?;
        Ok(())
    });
    assert!(matches!(raw, Err(RecordsError::Locked(_))));
}

#[test]
fn verification_requires_approval() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    seed(&node);
    let staff = Actor::admin("a1");

    let field = node.fields.create(&farmer(), new_field(1.0)).unwrap();
    assert!(matches!(
        node.fields.verify(&staff, &field.id),
        Err(RecordsError::InvalidTransition(_))
    ));
    node.fields.reject(&staff, &field.id).unwrap();
    assert!(matches!(
        node.fields.verify(&staff, &field.id),
        Err(RecordsError::InvalidTransition(_))
    ));

    // The storage CHECK holds even for direct writes
    let raw = node.db.with_conn(|conn| {
        conn.execute("UPDATE fields SET verified = 1 WHERE id = ?1", [&field.id])?;
        Ok(())
    });
    assert!(raw.is_err());
    let stored = node.fields.get(&farmer(), &field.id).unwrap();
    assert!(!stored.verified);
}

#[test]
fn crop_on_missing_field_is_not_persisted() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    seed(&node);

    let result = node.crops.create(&farmer(), new_crop("no-such-field", 2026));
    assert!(matches!(result, Err(RecordsError::Validation(_))));
    assert_eq!(node.db.stats().unwrap().crop_record_count, 0);
}

#[test]
fn eligibility_is_repeatable_and_current_year_only() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    seed(&node);
    let staff = Actor::employee("e1");
    let as_of = NaiveDate::from_ymd_opt(2026, 8, 15).unwrap();

    let field = node.fields.create(&farmer(), new_field(6.0)).unwrap();
    let mut verified_ids = Vec::new();
    for year in [2026, 2026, 2025, 2026] {
        let crop = node.crops.create(&farmer(), new_crop(&field.id, year)).unwrap();
        node.crops.verify(&staff, &crop.id).unwrap();
        if year == as_of.year() {
            verified_ids.push(crop.id);
        }
    }
    node.crops.create(&farmer(), new_crop(&field.id, 2026)).unwrap();

    // Pending field: nothing is eligible
    assert!(node.fields.eligible_crops(&farmer(), &field.id, as_of).unwrap().is_empty());

    node.fields.approve(&staff, &field.id).unwrap();
    let first = node.fields.eligible_crops(&farmer(), &field.id, as_of).unwrap();
    let second = node.fields.eligible_crops(&farmer(), &field.id, as_of).unwrap();
    assert_eq!(first, second);

    verified_ids.sort();
    let ids: Vec<String> = first.into_iter().map(|c| c.id).collect();
    assert_eq!(ids, verified_ids);
}

#[test]
fn state_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let field_id = {
        let node = open_node(&temp);
        seed(&node);
        let field = node.fields.create(&farmer(), new_field(2.0)).unwrap();
        node.fields.approve(&Actor::employee("e1"), &field.id).unwrap();
        field.id
    };

    let node = open_node(&temp);
    let field = node.fields.get(&farmer(), &field_id).unwrap();
    assert_eq!(field.status, FieldStatus::Approved);
    assert!(field.approved_at.is_some());
}
