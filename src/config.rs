//! Configuration for farm-records

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("farm-records")
}

/// What deleting a field does to its unverified crop records.
///
/// Verified crop records always block field deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldDeletePolicy {
    /// Delete unverified crop records together with the field
    Cascade,
    /// Refuse while any crop record exists
    Refuse,
}

impl Default for FieldDeletePolicy {
    fn default() -> Self {
        FieldDeletePolicy::Cascade
    }
}

/// Lifecycle rules shared by the field and crop services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub field_delete: FieldDeletePolicy,
    /// Reject crop records larger than their field
    pub enforce_crop_area: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            field_delete: FieldDeletePolicy::Cascade,
            enforce_crop_area: true,
        }
    }
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage directory for the database and images
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Disease classification endpoint
    #[serde(default = "default_classifier_url")]
    pub classifier_url: String,

    /// Upper bound on a single classification call
    #[serde(default = "default_classifier_timeout")]
    pub classifier_timeout_secs: u64,

    /// Public base URL used when signing image display URLs
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// Lifetime of a signed image URL
    #[serde(default = "default_image_url_ttl")]
    pub image_url_ttl_secs: u64,

    /// Secret mixed into image URL signatures
    #[serde(default = "default_signing_secret")]
    pub url_signing_secret: String,

    #[serde(default)]
    pub field_delete_policy: FieldDeletePolicy,

    #[serde(default = "default_true")]
    pub enforce_crop_area: bool,

    /// Optional JSON catalog snapshot loaded at startup
    #[serde(default)]
    pub catalog_seed: Option<PathBuf>,

    /// How long a writer waits on another writer's lock
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_http_port() -> u16 {
    8095
}

fn default_classifier_url() -> String {
    "http://localhost:8500/classify".to_string()
}

fn default_classifier_timeout() -> u64 {
    10
}

fn default_image_base_url() -> String {
    "http://localhost:8095".to_string()
}

fn default_image_url_ttl() -> u64 {
    900
}

/// Placeholder written to a fresh config file; replace before deploying
pub const DEFAULT_SIGNING_SECRET: &str = "change-me";

fn default_signing_secret() -> String {
    DEFAULT_SIGNING_SECRET.to_string()
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            classifier_url: default_classifier_url(),
            classifier_timeout_secs: default_classifier_timeout(),
            image_base_url: default_image_base_url(),
            image_url_ttl_secs: default_image_url_ttl(),
            url_signing_secret: default_signing_secret(),
            field_delete_policy: FieldDeletePolicy::default(),
            enforce_crop_area: true,
            catalog_seed: None,
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get images directory
    pub fn images_dir(&self) -> PathBuf {
        self.storage_dir.join("images")
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("records.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }

    pub fn image_url_ttl(&self) -> Duration {
        Duration::from_secs(self.image_url_ttl_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Whether image URLs would be signed with the published placeholder
    pub fn uses_default_signing_secret(&self) -> bool {
        self.url_signing_secret == DEFAULT_SIGNING_SECRET
    }

    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            field_delete: self.field_delete_policy,
            enforce_crop_area: self.enforce_crop_area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            http_port = 9000
            field_delete_policy = "refuse"
            "#,
        )
        .unwrap();

        assert_eq!(config.http_port, 9000);
        assert_eq!(config.field_delete_policy, FieldDeletePolicy::Refuse);
        assert!(config.enforce_crop_area);
        assert_eq!(config.classifier_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage_dir = temp.path().to_path_buf();
        config.enforce_crop_area = false;

        let path = config.config_path();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.storage_dir, temp.path());
        assert!(!loaded.enforce_crop_area);
        assert_eq!(
            loaded.lifecycle_policy(),
            LifecyclePolicy { field_delete: FieldDeletePolicy::Cascade, enforce_crop_area: false }
        );
    }

    #[test]
    fn test_default_signing_secret_is_detected() {
        let mut config = Config::default();
        assert!(config.uses_default_signing_secret());

        config.url_signing_secret = "3f9c1e".into();
        assert!(!config.uses_default_signing_secret());
    }
}
