//! Content-addressed image storage
//!
//! Uploaded plant images are stored under their SHA256 hash. Display URLs
//! are signed with an expiry so a browser can fetch an image without the
//! caller's identity headers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};
use url::Url;

use crate::error::RecordsError;

type HmacSha256 = Hmac<Sha256>;

/// Largest accepted upload (10MB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Image storage collaborator used by the detection flow
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Persist image bytes and return an opaque key
    async fn store_image(&self, data: &[u8]) -> Result<String, RecordsError>;

    /// URL a browser can use to fetch the image for `ttl`
    fn resolve_display_url(&self, image_key: &str, ttl: Duration) -> Result<String, RecordsError>;
}

/// Filesystem image store with signed display URLs
pub struct LocalImageStore {
    root_dir: PathBuf,
    base_url: Url,
    secret: String,
}

impl LocalImageStore {
    /// Create a store rooted at `root_dir`, serving URLs under `base_url`
    pub async fn new<P: AsRef<Path>>(
        root_dir: P,
        base_url: &str,
        secret: &str,
    ) -> Result<Self, RecordsError> {
        if secret.is_empty() {
            return Err(RecordsError::Config("image URL signing secret is empty".into()));
        }

        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await?;

        let base_url = Url::parse(base_url).map_err(|e| {
            RecordsError::Config(format!("invalid image base URL '{}': {}", base_url, e))
        })?;

        info!(path = %root_dir.display(), "Initialized image store");

        Ok(Self {
            root_dir,
            base_url,
            secret: secret.to_string(),
        })
    }

    /// Compute the storage key for image bytes
    pub fn compute_key(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("sha256-{}", hex::encode(hasher.finalize()))
    }

    /// Path for an image key; rejects anything that is not a sha256 key
    fn image_path(&self, key: &str) -> Result<PathBuf, RecordsError> {
        let hash_part = key
            .strip_prefix("sha256-")
            .filter(|h| h.len() == 64 && h.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| RecordsError::NotFound(format!("image {}", key)))?;
        Ok(self.root_dir.join(&hash_part[..4]).join(key))
    }

    /// Read a stored image
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, RecordsError> {
        let path = self.image_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecordsError::NotFound(format!("image {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// HMAC-SHA256 over `key` and its expiry (unix seconds)
    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256, RecordsError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| RecordsError::Config(format!("invalid image signing secret: {}", e)))?;
        mac.update(key.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Hex signature for a display URL
    pub fn sign(&self, key: &str, expires: i64) -> Result<String, RecordsError> {
        Ok(hex::encode(self.mac(key, expires)?.finalize().into_bytes()))
    }

    /// Whether a display URL's signature is valid and unexpired at `now`.
    ///
    /// The comparison is constant-time.
    pub fn verify_signature(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        if now > expires {
            return false;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        match self.mac(key, expires) {
            Ok(mac) => mac.verify_slice(&provided).is_ok(),
            Err(_) => false,
        }
    }

    /// Build a signed URL for `key` that expires at `expires`
    pub fn signed_url(&self, key: &str, expires: i64) -> Result<String, RecordsError> {
        let mut url = self
            .base_url
            .join(&format!("images/{}", key))
            .map_err(|e| RecordsError::Internal(format!("failed to build image URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("sig", &self.sign(key, expires)?);
        Ok(url.to_string())
    }
}

#[async_trait]
impl ImageStorage for LocalImageStore {
    async fn store_image(&self, data: &[u8]) -> Result<String, RecordsError> {
        if data.is_empty() {
            return Err(RecordsError::Validation("image is empty".into()));
        }
        if data.len() > MAX_IMAGE_SIZE {
            return Err(RecordsError::Validation(format!(
                "image is {} bytes; limit is {}",
                data.len(),
                MAX_IMAGE_SIZE
            )));
        }

        let key = Self::compute_key(data);
        let path = self.image_path(&key)?;

        if fs::metadata(&path).await.is_ok() {
            debug!(key = %key, "Image already stored");
            return Ok(key);
        }

        let write = async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            // Write-then-rename keeps readers from seeing a partial file
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, data).await?;
            fs::rename(&tmp, &path).await
        };
        write
            .await
            .map_err(|e| {
                RecordsError::UpstreamUnavailable(format!("image storage failed: {}", e))
            })?;

        info!(key = %key, size = data.len(), "Stored image");
        Ok(key)
    }

    fn resolve_display_url(&self, image_key: &str, ttl: Duration) -> Result<String, RecordsError> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        self.signed_url(image_key, expires)
    }
}
