//! Disease detection service
//!
//! Flow for one upload:
//!
//! 1. Check the field is readable by the owner and approved, and that the
//!    optional crop record is eligible today.
//! 2. Store the image and call the classifier, bounded by a timeout.
//! 3. Re-check the target and write the prediction row in one transaction.
//!
//! The row is only written after the classifier answered, so a failed or
//! timed-out call leaves nothing behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{Classification, Classifier};
use crate::db::models::{DiseasePrediction, Severity};
use crate::db::{crops, fields, predictions, RecordsDb};
use crate::eligibility;
use crate::error::RecordsError;
use crate::identity::Actor;
use crate::image_store::ImageStorage;
use crate::policy::{authorize, authorize_read, Transition};

use super::events::{EventBus, RecordEvent};

/// Detection timing settings
#[derive(Debug, Clone, Copy)]
pub struct DetectionConfig {
    /// Upper bound on one classifier call
    pub classify_timeout: Duration,
    /// Lifetime of the returned display URL
    pub image_url_ttl: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_secs(10),
            image_url_ttl: Duration::from_secs(900),
        }
    }
}

/// A stored prediction with a browser-usable image URL
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub prediction: DiseasePrediction,
    pub display_url: String,
}

pub struct DetectionService {
    db: Arc<RecordsDb>,
    events: Arc<EventBus>,
    images: Arc<dyn ImageStorage>,
    classifier: Arc<dyn Classifier>,
    config: DetectionConfig,
}

impl DetectionService {
    pub fn new(
        db: Arc<RecordsDb>,
        events: Arc<EventBus>,
        images: Arc<dyn ImageStorage>,
        classifier: Arc<dyn Classifier>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            db,
            events,
            images,
            classifier,
            config,
        }
    }

    /// Classify an image for one of the actor's approved fields, as of today
    pub async fn detect(
        &self,
        actor: &Actor,
        field_id: &str,
        crop_record_id: Option<&str>,
        image: &[u8],
    ) -> Result<DetectionResult, RecordsError> {
        self.detect_as_of(actor, field_id, crop_record_id, image, Utc::now().date_naive())
            .await
    }

    pub async fn detect_as_of(
        &self,
        actor: &Actor,
        field_id: &str,
        crop_record_id: Option<&str>,
        image: &[u8],
        as_of: NaiveDate,
    ) -> Result<DetectionResult, RecordsError> {
        let crop_type_id = self
            .db
            .with_read_tx(|tx| check_target(tx, actor, field_id, crop_record_id, as_of))?;

        let image_key = self.images.store_image(image).await?;

        let classification = tokio::time::timeout(
            self.config.classify_timeout,
            self.classifier.classify(&image_key, image, crop_type_id.as_deref()),
        )
        .await
        .map_err(|_| {
            warn!(
                field_id = %field_id,
                timeout = ?self.config.classify_timeout,
                "Classifier timed out"
            );
            RecordsError::UpstreamUnavailable(format!(
                "classifier did not answer within {:?}",
                self.config.classify_timeout
            ))
        })??;
        let classification = validate_classification(classification)?;

        let prediction = DiseasePrediction {
            id: Uuid::new_v4().to_string(),
            field_id: field_id.to_string(),
            crop_record_id: crop_record_id.map(str::to_string),
            owner_id: actor.id.clone(),
            image_key,
            severity: Severity::from_label(&classification.label),
            predicted_label: classification.label,
            confidence: classification.confidence,
            detected_at: Utc::now(),
        };

        // The field or crop record may have changed while the classifier ran
        self.db.with_tx(|tx| {
            check_target(tx, actor, field_id, crop_record_id, as_of)?;
            predictions::insert_prediction(tx, &prediction)
        })?;

        info!(
            prediction_id = %prediction.id,
            field_id = %field_id,
            label = %prediction.predicted_label,
            confidence = prediction.confidence,
            "Disease prediction recorded"
        );
        self.events.emit(RecordEvent::PredictionRecorded {
            id: prediction.id.clone(),
            field_id: prediction.field_id.clone(),
            label: prediction.predicted_label.clone(),
            severity: prediction.severity,
        });

        let display_url = self
            .images
            .resolve_display_url(&prediction.image_key, self.config.image_url_ttl)?;
        Ok(DetectionResult { prediction, display_url })
    }

    /// The actor's predictions, newest first
    pub fn list_own(&self, actor: &Actor) -> Result<Vec<DiseasePrediction>, RecordsError> {
        self.db.with_conn(|conn| predictions::list_predictions_by_owner(conn, &actor.id))
    }

    pub fn get(&self, actor: &Actor, id: &str) -> Result<DiseasePrediction, RecordsError> {
        let prediction = self
            .db
            .with_conn(|conn| predictions::get_prediction(conn, id))?
            .ok_or_else(|| RecordsError::NotFound(format!("prediction {}", id)))?;
        authorize_read(actor, &prediction.owner_id)?;
        Ok(prediction)
    }
}

/// Checks the detection target and returns the crop type hint for the classifier
fn check_target(
    conn: &Connection,
    actor: &Actor,
    field_id: &str,
    crop_record_id: Option<&str>,
    as_of: NaiveDate,
) -> Result<Option<String>, RecordsError> {
    let field = fields::get_field(conn, field_id)?
        .ok_or_else(|| RecordsError::NotFound(format!("field {}", field_id)))?;
    authorize(actor, Transition::Detect, Some(&field.owner_id))?;

    if !field.is_approved() {
        return Err(RecordsError::InvalidTransition(format!(
            "field {} is {}; detection needs an approved field",
            field_id, field.status
        )));
    }

    let Some(crop_id) = crop_record_id else {
        return Ok(None);
    };
    let crop = crops::get_crop(conn, crop_id)?
        .ok_or_else(|| RecordsError::Validation(format!("unknown crop record '{}'", crop_id)))?;
    if !eligibility::is_eligible(&field, &crop, as_of) {
        return Err(RecordsError::Validation(format!(
            "crop record {} is not eligible for detection on field {}",
            crop_id, field_id
        )));
    }
    Ok(Some(crop.crop_type_id))
}

fn validate_classification(classification: Classification) -> Result<Classification, RecordsError> {
    if classification.label.trim().is_empty() {
        return Err(RecordsError::UpstreamUnavailable("classifier returned an empty label".into()));
    }
    if !(0.0..=1.0).contains(&classification.confidence) {
        return Err(RecordsError::UpstreamUnavailable(format!(
            "classifier confidence {} is outside [0, 1]",
            classification.confidence
        )));
    }
    Ok(classification)
}
