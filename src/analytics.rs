//! Read-only rollups over a farmer's fields, crop records and predictions
//!
//! Everything here is a pure function over slices; the analytics service
//! loads one consistent snapshot and hands it in. Counts are `u64`
//! throughout, and rates are percentages rounded to one decimal place.

use std::collections::BTreeMap;

use serde::Serialize;
use ts_rs::TS;

use crate::db::models::{CropRecord, Field, FieldStatus, Season, Severity};

/// Upper bounds (exclusive, hectares) of the small, medium and large buckets
pub const SMALL_FIELD_MAX_HA: f64 = 2.0;
pub const MEDIUM_FIELD_MAX_HA: f64 = 5.0;
pub const LARGE_FIELD_MAX_HA: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SeasonSummary {
    #[ts(type = "string")]
    pub season: Season,
    #[ts(type = "number")]
    pub record_count: u64,
    pub total_area_hectares: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct YearlyTrendRow {
    pub crop_year: i32,
    #[ts(type = "number")]
    pub record_count: u64,
    pub total_area_hectares: f64,
    pub total_production: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum FieldSizeBucket {
    Small,
    Medium,
    Large,
    VeryLarge,
}

impl FieldSizeBucket {
    pub const ALL: [FieldSizeBucket; 4] = [
        FieldSizeBucket::Small,
        FieldSizeBucket::Medium,
        FieldSizeBucket::Large,
        FieldSizeBucket::VeryLarge,
    ];

    pub fn for_area(area_hectares: f64) -> Self {
        if area_hectares < SMALL_FIELD_MAX_HA {
            FieldSizeBucket::Small
        } else if area_hectares < MEDIUM_FIELD_MAX_HA {
            FieldSizeBucket::Medium
        } else if area_hectares < LARGE_FIELD_MAX_HA {
            FieldSizeBucket::Large
        } else {
            FieldSizeBucket::VeryLarge
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FieldSizeSummary {
    pub bucket: FieldSizeBucket,
    #[ts(type = "number")]
    pub field_count: u64,
    pub total_area_hectares: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ApprovalSummary {
    #[ts(type = "number")]
    pub total_fields: u64,
    #[ts(type = "number")]
    pub approved_fields: u64,
    #[ts(type = "number")]
    pub verified_fields: u64,
    /// Percentage, one decimal
    pub approval_rate: f64,
    /// Percentage, one decimal
    pub verification_rate: f64,
    /// Mean hours from creation to approval; `None` when nothing was approved
    pub average_approval_hours: Option<f64>,
    #[ts(type = "number")]
    pub total_crop_records: u64,
    #[ts(type = "number")]
    pub verified_crop_records: u64,
    pub crop_verification_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SeverityCount {
    #[ts(type = "string")]
    pub severity: Severity,
    #[ts(type = "number")]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SeverityDistribution {
    pub buckets: Vec<SeverityCount>,
    #[ts(type = "number")]
    pub total: u64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / total` as a percentage with one decimal; 0.0 when `total` is zero
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(part as f64 * 100.0 / total as f64)
}

/// Area and row count per season, in Kharif, Rabi, WholeYear order.
/// Seasons without records are omitted.
pub fn season_distribution(crops: &[CropRecord]) -> Vec<SeasonSummary> {
    let mut by_season: BTreeMap<Season, (u64, f64)> = BTreeMap::new();
    for crop in crops {
        let entry = by_season.entry(crop.season).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += crop.area_hectares;
    }

    Season::ALL
        .iter()
        .filter_map(|season| {
            by_season.remove(season).map(|(record_count, area)| SeasonSummary {
                season: *season,
                record_count,
                total_area_hectares: round1(area),
            })
        })
        .collect()
}

/// Area and production per crop year, ascending by year
pub fn yearly_trend(crops: &[CropRecord]) -> Vec<YearlyTrendRow> {
    let mut by_year: BTreeMap<i32, (u64, f64, f64)> = BTreeMap::new();
    for crop in crops {
        let entry = by_year.entry(crop.crop_year).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += crop.area_hectares;
        entry.2 += crop.production;
    }

    by_year
        .into_iter()
        .map(|(crop_year, (record_count, area, production))| YearlyTrendRow {
            crop_year,
            record_count,
            total_area_hectares: round1(area),
            total_production: round1(production),
        })
        .collect()
}

/// Field count and area per size bucket; every bucket is present
pub fn field_size_buckets(fields: &[Field]) -> Vec<FieldSizeSummary> {
    let mut totals: BTreeMap<FieldSizeBucket, (u64, f64)> =
        FieldSizeBucket::ALL.iter().map(|b| (*b, (0, 0.0))).collect();

    for field in fields {
        let entry = totals
            .entry(FieldSizeBucket::for_area(field.area_hectares))
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += field.area_hectares;
    }

    totals
        .into_iter()
        .map(|(bucket, (field_count, area))| FieldSizeSummary {
            bucket,
            field_count,
            total_area_hectares: round1(area),
        })
        .collect()
}

/// Approval and verification rates over a farmer's fields and crop records
pub fn approval_summary(fields: &[Field], crops: &[CropRecord]) -> ApprovalSummary {
    let total_fields = fields.len() as u64;
    let approved_fields = fields
        .iter()
        .filter(|f| f.status == FieldStatus::Approved)
        .count() as u64;
    let verified_fields = fields.iter().filter(|f| f.verified).count() as u64;

    let latencies: Vec<f64> = fields
        .iter()
        .filter_map(|f| f.approved_at.map(|at| (at - f.created_at).num_seconds() as f64 / 3600.0))
        .collect();
    let average_approval_hours = if latencies.is_empty() {
        None
    } else {
        Some(round1(latencies.iter().sum::<f64>() / latencies.len() as f64))
    };

    let total_crop_records = crops.len() as u64;
    let verified_crop_records = crops.iter().filter(|c| c.verified).count() as u64;

    ApprovalSummary {
        total_fields,
        approved_fields,
        verified_fields,
        approval_rate: percentage(approved_fields, total_fields),
        verification_rate: percentage(verified_fields, total_fields),
        average_approval_hours,
        total_crop_records,
        verified_crop_records,
        crop_verification_rate: percentage(verified_crop_records, total_crop_records),
    }
}

/// Prediction counts per severity bucket. Healthy labels are not counted.
pub fn severity_distribution<S: AsRef<str>>(labels: &[S]) -> SeverityDistribution {
    let mut counts: BTreeMap<Severity, u64> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
    for label in labels {
        if let Some(severity) = Severity::from_label(label.as_ref()) {
            *counts.entry(severity).or_insert(0) += 1;
        }
    }

    let total: u64 = counts.values().sum();
    SeverityDistribution {
        buckets: counts
            .into_iter()
            .map(|(severity, count)| SeverityCount { severity, count })
            .collect(),
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn field(id: &str, area: f64, status: FieldStatus, verified: bool) -> Field {
        let created = Utc::now() - Duration::hours(48);
        Field {
            id: id.into(),
            name: id.into(),
            area_hectares: area,
            latitude: 17.0,
            longitude: 78.0,
            mandal_id: "m1".into(),
            village_id: "v1".into(),
            owner_id: "u1".into(),
            status,
            verified,
            created_at: created,
            updated_at: created,
            approved_at: None,
            verified_at: None,
            reviewed_by: None,
        }
    }

    fn crop(
        id: &str,
        year: i32,
        season: Season,
        area: f64,
        production: f64,
        verified: bool,
    ) -> CropRecord {
        let now = Utc::now();
        CropRecord {
            id: id.into(),
            field_id: "f1".into(),
            crop_type_id: "rice".into(),
            crop_year: year,
            season,
            area_hectares: area,
            production,
            verified,
            created_at: now,
            updated_at: now,
            verified_at: None,
            verified_by: None,
        }
    }

    #[test]
    fn test_yearly_trend_is_ascending() {
        let crops = vec![
            crop("a", 2025, Season::Kharif, 1.0, 4.0, false),
            crop("b", 2023, Season::Rabi, 2.0, 5.0, false),
            crop("c", 2024, Season::Kharif, 1.5, 2.0, false),
            crop("d", 2025, Season::Rabi, 0.5, 1.0, false),
        ];
        let rows = yearly_trend(&crops);
        let years: Vec<i32> = rows.iter().map(|r| r.crop_year).collect();
        assert_eq!(years, vec![2023, 2024, 2025]);
        assert_eq!(rows[2].record_count, 2);
        assert_eq!(rows[2].total_area_hectares, 1.5);
        assert_eq!(rows[2].total_production, 5.0);
    }

    #[test]
    fn test_season_distribution() {
        let crops = vec![
            crop("a", 2025, Season::WholeYear, 3.0, 0.0, false),
            crop("b", 2025, Season::Kharif, 1.0, 0.0, false),
            crop("c", 2026, Season::Kharif, 2.0, 0.0, true),
            crop("d", 2026, Season::Rabi, 0.5, 0.0, false),
        ];
        let rows = season_distribution(&crops);
        let seasons: Vec<Season> = rows.iter().map(|r| r.season).collect();
        assert_eq!(seasons, Season::ALL.to_vec());
        assert_eq!(rows[0].record_count, 2);
        assert_eq!(rows[0].total_area_hectares, 3.0);

        // Seasons without records are left out
        let rows = season_distribution(&crops[..3]);
        let seasons: Vec<Season> = rows.iter().map(|r| r.season).collect();
        assert_eq!(seasons, vec![Season::Kharif, Season::WholeYear]);
    }

    #[test]
    fn test_field_size_buckets() {
        let fields = vec![
            field("a", 1.0, FieldStatus::Pending, false),
            field("b", 2.0, FieldStatus::Pending, false),
            field("c", 4.5, FieldStatus::Pending, false),
            field("d", 12.0, FieldStatus::Pending, false),
        ];
        let buckets = field_size_buckets(&fields);
        let counts: Vec<u64> = buckets.iter().map(|b| b.field_count).collect();
        assert_eq!(counts, vec![1, 2, 0, 1]);
        assert_eq!(buckets[1].total_area_hectares, 6.5);
        assert_eq!(buckets[3].bucket, FieldSizeBucket::VeryLarge);
        assert!(field_size_buckets(&[]).iter().all(|b| b.field_count == 0));
    }

    #[test]
    fn test_approval_rate_is_percentage() {
        let mut fields = vec![
            field("a", 1.0, FieldStatus::Approved, true),
            field("b", 1.0, FieldStatus::Approved, false),
            field("c", 1.0, FieldStatus::Approved, false),
            field("d", 1.0, FieldStatus::Pending, false),
        ];
        fields[0].approved_at = Some(fields[0].created_at + Duration::hours(10));
        fields[1].approved_at = Some(fields[1].created_at + Duration::hours(20));

        let summary = approval_summary(&fields, &[]);
        assert_eq!(summary.total_fields, 4);
        assert_eq!(summary.approved_fields, 3);
        assert_eq!(summary.approval_rate, 75.0);
        assert_eq!(summary.verification_rate, 25.0);
        assert_eq!(summary.average_approval_hours, Some(15.0));
        assert_eq!(summary.crop_verification_rate, 0.0);
    }

    #[test]
    fn test_approval_summary_empty() {
        let summary = approval_summary(&[], &[]);
        assert_eq!(summary.approval_rate, 0.0);
        assert_eq!(summary.average_approval_hours, None);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn test_severity_excludes_healthy() {
        let dist = severity_distribution(&["Healthy", "Leaf Blight", "healthy"]);
        assert_eq!(dist.total, 1);
        assert_eq!(dist.buckets[0], SeverityCount { severity: Severity::High, count: 1 });
        assert_eq!(dist.buckets.len(), 3);
    }
}
