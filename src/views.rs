//! View types for the HTTP API boundary
//!
//! These types use camelCase serialization for TypeScript clients.
//! Record types in `db/models.rs` stay snake_case.
//!
//! Pattern:
//! - Services return record types (Field, CropRecord, ...)
//! - The HTTP layer converts them to views (FieldView, CropRecordView, ...)
//! - ts-rs generates the TypeScript client types from the views
//!
//! InputView types reject unknown keys. A client that sends `status` or
//! `verified` in a field edit gets a 400 instead of a silently ignored key.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::models::{
    CropRecord, CropUpdate, DiseasePrediction, Field, FieldUpdate, NewCropRecord, NewField, Season,
};
use crate::error::RecordsError;
use crate::services::{DetectionResult, FieldDeletion};

// ============================================================================
// Field Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FieldView {
    pub id: String,
    pub name: String,
    pub area_hectares: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub mandal_id: String,
    pub village_id: String,
    pub owner_id: String,
    pub status: String,
    pub verified: bool,
    pub created_at: String,
    pub updated_at: String,
    pub approved_at: Option<String>,
    pub verified_at: Option<String>,
    pub reviewed_by: Option<String>,
}

impl From<Field> for FieldView {
    fn from(f: Field) -> Self {
        Self {
            id: f.id,
            name: f.name,
            area_hectares: f.area_hectares,
            latitude: f.latitude,
            longitude: f.longitude,
            mandal_id: f.mandal_id,
            village_id: f.village_id,
            owner_id: f.owner_id,
            status: f.status.as_str().to_string(),
            verified: f.verified,
            created_at: f.created_at.to_rfc3339(),
            updated_at: f.updated_at.to_rfc3339(),
            approved_at: f.approved_at.map(|t| t.to_rfc3339()),
            verified_at: f.verified_at.map(|t| t.to_rfc3339()),
            reviewed_by: f.reviewed_by,
        }
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[ts(export)]
pub struct FieldInputView {
    pub name: String,
    pub area_hectares: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub mandal_id: String,
    pub village_id: String,
}

impl From<FieldInputView> for NewField {
    fn from(v: FieldInputView) -> Self {
        Self {
            name: v.name,
            area_hectares: v.area_hectares,
            latitude: v.latitude,
            longitude: v.longitude,
            mandal_id: v.mandal_id,
            village_id: v.village_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[ts(export)]
pub struct FieldUpdateInputView {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub area_hectares: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub mandal_id: Option<String>,
    #[serde(default)]
    pub village_id: Option<String>,
}

impl From<FieldUpdateInputView> for FieldUpdate {
    fn from(v: FieldUpdateInputView) -> Self {
        Self {
            name: v.name,
            area_hectares: v.area_hectares,
            latitude: v.latitude,
            longitude: v.longitude,
            mandal_id: v.mandal_id,
            village_id: v.village_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FieldDeletionView {
    pub id: String,
    #[ts(type = "number")]
    pub cascaded_crops: usize,
}

impl From<FieldDeletion> for FieldDeletionView {
    fn from(d: FieldDeletion) -> Self {
        Self {
            id: d.id,
            cascaded_crops: d.cascaded_crops,
        }
    }
}

// ============================================================================
// Crop Record Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CropRecordView {
    pub id: String,
    pub field_id: String,
    pub crop_type_id: String,
    pub crop_year: i32,
    pub season: String,
    pub area_hectares: f64,
    pub production: f64,
    pub verified: bool,
    pub created_at: String,
    pub updated_at: String,
    pub verified_at: Option<String>,
    pub verified_by: Option<String>,
}

impl From<CropRecord> for CropRecordView {
    fn from(c: CropRecord) -> Self {
        Self {
            id: c.id,
            field_id: c.field_id,
            crop_type_id: c.crop_type_id,
            crop_year: c.crop_year,
            season: c.season.as_str().to_string(),
            area_hectares: c.area_hectares,
            production: c.production,
            verified: c.verified,
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
            verified_at: c.verified_at.map(|t| t.to_rfc3339()),
            verified_by: c.verified_by,
        }
    }
}

/// Seasons are accepted in any spelling ("Whole Year", "whole_year", ...)
#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[ts(export)]
pub struct CropRecordInputView {
    pub field_id: String,
    pub crop_type_id: String,
    pub crop_year: i32,
    pub season: String,
    pub area_hectares: f64,
    pub production: f64,
}

impl TryFrom<CropRecordInputView> for NewCropRecord {
    type Error = RecordsError;

    fn try_from(v: CropRecordInputView) -> Result<Self, Self::Error> {
        Ok(Self {
            field_id: v.field_id,
            crop_type_id: v.crop_type_id,
            crop_year: v.crop_year,
            season: v.season.parse::<Season>()?,
            area_hectares: v.area_hectares,
            production: v.production,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[ts(export)]
pub struct CropRecordUpdateInputView {
    #[serde(default)]
    pub crop_type_id: Option<String>,
    #[serde(default)]
    pub crop_year: Option<i32>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub area_hectares: Option<f64>,
    #[serde(default)]
    pub production: Option<f64>,
}

impl TryFrom<CropRecordUpdateInputView> for CropUpdate {
    type Error = RecordsError;

    fn try_from(v: CropRecordUpdateInputView) -> Result<Self, Self::Error> {
        Ok(Self {
            crop_type_id: v.crop_type_id,
            crop_year: v.crop_year,
            season: v.season.as_deref().map(str::parse::<Season>).transpose()?,
            area_hectares: v.area_hectares,
            production: v.production,
        })
    }
}

// ============================================================================
// Detection Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PredictionView {
    pub id: String,
    pub field_id: String,
    pub crop_record_id: Option<String>,
    pub image_key: String,
    pub predicted_label: String,
    pub confidence: f64,
    pub detected_at: String,
    pub severity: Option<String>,
}

impl From<DiseasePrediction> for PredictionView {
    fn from(p: DiseasePrediction) -> Self {
        Self {
            id: p.id,
            field_id: p.field_id,
            crop_record_id: p.crop_record_id,
            image_key: p.image_key,
            predicted_label: p.predicted_label,
            confidence: p.confidence,
            detected_at: p.detected_at.to_rfc3339(),
            severity: p.severity.map(|s| s.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DetectionView {
    pub prediction: PredictionView,
    /// Signed, expiring image URL
    pub display_url: String,
}

impl From<DetectionResult> for DetectionView {
    fn from(r: DetectionResult) -> Self {
        Self {
            prediction: r.prediction.into(),
            display_url: r.display_url,
        }
    }
}

/// Convert a list of records into views
pub fn to_views<T, V: From<T>>(items: Vec<T>) -> Vec<V> {
    items.into_iter().map(V::from).collect()
}
