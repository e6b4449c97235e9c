//! Farm Records - Field and crop record lifecycle service
//!
//! Farmers register land parcels ("fields"), log crop-season records against
//! them and submit plant images for disease classification. Employees and
//! admins approve fields and verify records.
//!
//! ## Lifecycles
//!
//! | Record | States | Staff transitions | Terminal |
//! |--------|--------|-------------------|----------|
//! | Field | `(status, verified)` | approve, reject, verify | `(approved, true)` |
//! | Crop record | `verified` | verify | `verified = true` |
//!
//! Verified records can never be edited or deleted. All transitions run as
//! single SQLite transactions with state-guarded writes, so concurrent
//! requests, including ones from separate processes, cannot both win.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/farm-records/
//! ├── records.db             # SQLite (WAL mode)
//! ├── images/                # Content-addressed plant images
//! │   └── ab12/sha256-ab12...
//! └── config.toml            # Configuration
//! ```

pub mod analytics;
pub mod classifier;
pub mod config;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod http;
pub mod identity;
pub mod image_store;
pub mod policy;
pub mod services;
pub mod views;

// Re-exports
pub use classifier::{Classification, Classifier, HttpClassifier};
pub use config::{Config, FieldDeletePolicy, LifecyclePolicy};
pub use db::RecordsDb;
pub use error::RecordsError;
pub use http::HttpServer;
pub use identity::{Actor, Role};
pub use image_store::{ImageStorage, LocalImageStore};
pub use services::Services;
