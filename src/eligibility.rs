//! Disease-detection eligibility
//!
//! A crop record may feed disease detection when its field is approved, the
//! record is verified, and it belongs to the current crop year.

use chrono::{Datelike, NaiveDate};

use crate::db::models::{CropRecord, Field};

/// Crop records of `field` usable for disease detection as of `as_of`.
///
/// Returns an empty list for fields that are not approved. The result is
/// sorted by id, so repeated calls over the same data return the same order.
pub fn eligible_crops(field: &Field, crops: &[CropRecord], as_of: NaiveDate) -> Vec<CropRecord> {
    if !field.is_approved() {
        return Vec::new();
    }

    let year = as_of.year();
    let mut eligible: Vec<CropRecord> = crops
        .iter()
        .filter(|c| c.field_id == field.id && c.verified && c.crop_year == year)
        .cloned()
        .collect();
    eligible.sort_by(|a, b| a.id.cmp(&b.id));
    eligible
}

/// Whether one crop record is eligible on `field` as of `as_of`
pub fn is_eligible(field: &Field, crop: &CropRecord, as_of: NaiveDate) -> bool {
    field.is_approved()
        && crop.field_id == field.id
        && crop.verified
        && crop.crop_year == as_of.year()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{FieldStatus, Season};
    use chrono::Utc;

    fn field(status: FieldStatus) -> Field {
        let now = Utc::now();
        Field {
            id: "f1".into(),
            name: "Canal plot".into(),
            area_hectares: 5.0,
            latitude: 17.0,
            longitude: 78.0,
            mandal_id: "m1".into(),
            village_id: "v1".into(),
            owner_id: "u1".into(),
            status,
            verified: false,
            created_at: now,
            updated_at: now,
            approved_at: None,
            verified_at: None,
            reviewed_by: None,
        }
    }

    fn crop(id: &str, field_id: &str, year: i32, verified: bool) -> CropRecord {
        let now = Utc::now();
        CropRecord {
            id: id.into(),
            field_id: field_id.into(),
            crop_type_id: "rice".into(),
            crop_year: year,
            season: Season::Rabi,
            area_hectares: 1.0,
            production: 3.0,
            verified,
            created_at: now,
            updated_at: now,
            verified_at: None,
            verified_by: None,
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn test_filters_year_verification_and_field() {
        let crops = vec![
            crop("c3", "f1", 2026, true),
            crop("c1", "f1", 2026, true),
            crop("c2", "f1", 2026, false),
            crop("c4", "f1", 2025, true),
            crop("c5", "f2", 2026, true),
        ];

        let ids: Vec<String> = eligible_crops(&field(FieldStatus::Approved), &crops, as_of())
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c1", "c3"]);
    }

    #[test]
    fn test_unapproved_field_is_empty() {
        let crops = vec![crop("c1", "f1", 2026, true)];
        assert!(eligible_crops(&field(FieldStatus::Pending), &crops, as_of()).is_empty());
        assert!(eligible_crops(&field(FieldStatus::Rejected), &crops, as_of()).is_empty());
        assert!(!is_eligible(&field(FieldStatus::Pending), &crops[0], as_of()));
    }

    #[test]
    fn test_repeatable() {
        let crops = vec![crop("b", "f1", 2026, true), crop("a", "f1", 2026, true)];
        let f = field(FieldStatus::Approved);
        let first = eligible_crops(&f, &crops, as_of());
        let second = eligible_crops(&f, &crops, as_of());
        assert_eq!(first, second);
        assert_eq!(first[0].id, "a");
    }
}
