//! Record types stored in SQLite
//!
//! Wire types use snake_case and typed enums. The HTTP layer converts them to
//! camelCase view types in `views.rs`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::RecordsError;

// ============================================================================
// Enums
// ============================================================================

/// Approval status of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Pending,
    Approved,
    Rejected,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::Pending => "pending",
            FieldStatus::Approved => "approved",
            FieldStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for FieldStatus {
    type Err = RecordsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(FieldStatus::Pending),
            "approved" => Ok(FieldStatus::Approved),
            "rejected" => Ok(FieldStatus::Rejected),
            other => Err(RecordsError::Validation(format!("unknown field status '{}'", other))),
        }
    }
}

/// Growing season of a crop record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    Kharif,
    Rabi,
    WholeYear,
}

impl Season {
    /// Fixed presentation order
    pub const ALL: [Season; 3] = [Season::Kharif, Season::Rabi, Season::WholeYear];

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Kharif => "Kharif",
            Season::Rabi => "Rabi",
            Season::WholeYear => "WholeYear",
        }
    }
}

impl FromStr for Season {
    type Err = RecordsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "kharif" => Ok(Season::Kharif),
            "rabi" => Ok(Season::Rabi),
            "wholeyear" => Ok(Season::WholeYear),
            _ => Err(RecordsError::Validation(format!("unknown season '{}'", s))),
        }
    }
}

/// Severity bucket derived from a predicted disease label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Moderate,
    Low,
}

const HIGH_SEVERITY_TERMS: &[&str] = &["blight", "rot", "wilt", "virus", "mosaic", "canker"];
const MODERATE_SEVERITY_TERMS: &[&str] = &["rust", "mildew", "spot", "scab", "curl", "smut"];

impl Severity {
    /// Presentation order, most severe first
    pub const ALL: [Severity; 3] = [Severity::High, Severity::Moderate, Severity::Low];

    /// Derive the bucket for a classifier label.
    ///
    /// Returns `None` for healthy plants so they never count toward severity.
    pub fn from_label(label: &str) -> Option<Severity> {
        let label = label.trim().to_lowercase();
        if label == "healthy" {
            return None;
        }
        if HIGH_SEVERITY_TERMS.iter().any(|t| label.contains(t)) {
            Some(Severity::High)
        } else if MODERATE_SEVERITY_TERMS.iter().any(|t| label.contains(t)) {
            Some(Severity::Moderate)
        } else {
            Some(Severity::Low)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Moderate => "moderate",
            Severity::Low => "low",
        }
    }
}

impl FromStr for Severity {
    type Err = RecordsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Severity::High),
            "moderate" => Ok(Severity::Moderate),
            "low" => Ok(Severity::Low),
            other => Err(RecordsError::Validation(format!("unknown severity '{}'", other))),
        }
    }
}

macro_rules! sql_text_enum {
    ($($ty:ty),*) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: RecordsError| FromSqlError::Other(Box::new(e)))
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

sql_text_enum!(FieldStatus, Season, Severity);

// ============================================================================
// Records
// ============================================================================

/// A registered land parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub name: String,
    pub area_hectares: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub mandal_id: String,
    pub village_id: String,
    pub owner_id: String,
    pub status: FieldStatus,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

impl Field {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            area_hectares: row.get("area_hectares")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            mandal_id: row.get("mandal_id")?,
            village_id: row.get("village_id")?,
            owner_id: row.get("owner_id")?,
            status: row.get("status")?,
            verified: row.get("verified")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            approved_at: row.get("approved_at")?,
            verified_at: row.get("verified_at")?,
            reviewed_by: row.get("reviewed_by")?,
        })
    }

    pub fn is_approved(&self) -> bool {
        self.status == FieldStatus::Approved
    }
}

/// Input for registering a field
#[derive(Debug, Clone, Deserialize)]
pub struct NewField {
    pub name: String,
    pub area_hectares: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub mandal_id: String,
    pub village_id: String,
}

/// Owner-editable field attributes. Status and verification are not part of
/// this type; they change only through staff transitions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldUpdate {
    pub name: Option<String>,
    pub area_hectares: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub mandal_id: Option<String>,
    pub village_id: Option<String>,
}

impl FieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.area_hectares.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.mandal_id.is_none()
            && self.village_id.is_none()
    }

    /// Apply the present attributes onto `field`
    pub fn apply_to(&self, field: &mut Field) {
        if let Some(ref name) = self.name {
            field.name = name.clone();
        }
        if let Some(area) = self.area_hectares {
            field.area_hectares = area;
        }
        if let Some(lat) = self.latitude {
            field.latitude = lat;
        }
        if let Some(lng) = self.longitude {
            field.longitude = lng;
        }
        if let Some(ref mandal) = self.mandal_id {
            field.mandal_id = mandal.clone();
        }
        if let Some(ref village) = self.village_id {
            field.village_id = village.clone();
        }
    }
}

/// One crop grown on one field in one season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecord {
    pub id: String,
    pub field_id: String,
    pub crop_type_id: String,
    pub crop_year: i32,
    pub season: Season,
    pub area_hectares: f64,
    pub production: f64,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
}

impl CropRecord {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            field_id: row.get("field_id")?,
            crop_type_id: row.get("crop_type_id")?,
            crop_year: row.get("crop_year")?,
            season: row.get("season")?,
            area_hectares: row.get("area_hectares")?,
            production: row.get("production")?,
            verified: row.get("verified")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            verified_at: row.get("verified_at")?,
            verified_by: row.get("verified_by")?,
        })
    }
}

/// Input for logging a crop record
#[derive(Debug, Clone, Deserialize)]
pub struct NewCropRecord {
    pub field_id: String,
    pub crop_type_id: String,
    pub crop_year: i32,
    pub season: Season,
    pub area_hectares: f64,
    pub production: f64,
}

/// Owner-editable crop attributes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CropUpdate {
    pub crop_type_id: Option<String>,
    pub crop_year: Option<i32>,
    pub season: Option<Season>,
    pub area_hectares: Option<f64>,
    pub production: Option<f64>,
}

impl CropUpdate {
    pub fn is_empty(&self) -> bool {
        self.crop_type_id.is_none()
            && self.crop_year.is_none()
            && self.season.is_none()
            && self.area_hectares.is_none()
            && self.production.is_none()
    }

    pub fn apply_to(&self, crop: &mut CropRecord) {
        if let Some(ref crop_type) = self.crop_type_id {
            crop.crop_type_id = crop_type.clone();
        }
        if let Some(year) = self.crop_year {
            crop.crop_year = year;
        }
        if let Some(season) = self.season {
            crop.season = season;
        }
        if let Some(area) = self.area_hectares {
            crop.area_hectares = area;
        }
        if let Some(production) = self.production {
            crop.production = production;
        }
    }
}

/// A stored disease classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseasePrediction {
    pub id: String,
    pub field_id: String,
    pub crop_record_id: Option<String>,
    pub owner_id: String,
    pub image_key: String,
    pub predicted_label: String,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    /// `None` for healthy predictions
    pub severity: Option<Severity>,
}

impl DiseasePrediction {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            field_id: row.get("field_id")?,
            crop_record_id: row.get("crop_record_id")?,
            owner_id: row.get("owner_id")?,
            image_key: row.get("image_key")?,
            predicted_label: row.get("predicted_label")?,
            confidence: row.get("confidence")?,
            detected_at: row.get("detected_at")?,
            severity: row.get("severity")?,
        })
    }
}
