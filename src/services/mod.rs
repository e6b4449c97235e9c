//! Service layer for farm-records
//!
//! Services hold the lifecycle rules between HTTP handlers and repositories.
//! Each service wraps database operations with:
//! - Role and ownership checks
//! - Input validation against the catalogs
//! - Transaction boundaries
//! - Event emission for the audit trail
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (lifecycle rules)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod analytics_service;
pub mod catalog_service;
pub mod crop_service;
pub mod detection_service;
pub mod events;
pub mod field_service;
pub mod response;

// Re-exports
pub use analytics_service::{AnalyticsOverview, AnalyticsService};
pub use catalog_service::CatalogService;
pub use crop_service::CropService;
pub use detection_service::{DetectionConfig, DetectionResult, DetectionService};
pub use events::{EventBus, EventListener, RecordEvent};
pub use field_service::{FieldDeletion, FieldService};

use std::sync::Arc;

use crate::classifier::Classifier;
use crate::config::LifecyclePolicy;
use crate::db::RecordsDb;
use crate::image_store::ImageStorage;

/// Service container for dependency injection
///
/// Holds all services with a shared database and event bus.
/// Pass this to HttpServer for handler access.
pub struct Services {
    pub fields: Arc<FieldService>,
    pub crops: Arc<CropService>,
    pub analytics: Arc<AnalyticsService>,
    pub detection: Arc<DetectionService>,
    pub catalog: Arc<CatalogService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(
        db: Arc<RecordsDb>,
        policy: LifecyclePolicy,
        images: Arc<dyn ImageStorage>,
        classifier: Arc<dyn Classifier>,
        detection: DetectionConfig,
    ) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            fields: Arc::new(FieldService::new(db.clone(), events.clone(), policy)),
            crops: Arc::new(CropService::new(db.clone(), events.clone(), policy)),
            analytics: Arc::new(AnalyticsService::new(db.clone())),
            detection: Arc::new(DetectionService::new(
                db.clone(),
                events.clone(),
                images,
                classifier,
                detection,
            )),
            catalog: Arc::new(CatalogService::new(db)),
            events,
        }
    }
}
