//! Disease classification client
//!
//! The classifier is an external model service. It receives the stored image
//! and answers with a label and a confidence in `[0, 1]`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RecordsError;

/// A single classification answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(alias = "prediction", alias = "predicted_label")]
    pub label: String,
    pub confidence: f64,
}

/// Classification collaborator used by the detection flow
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        image_key: &str,
        image: &[u8],
        crop_type_id: Option<&str>,
    ) -> Result<Classification, RecordsError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyRequest<'a> {
    image_key: &'a str,
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    crop_type_id: Option<&'a str>,
}

/// Classifier reached over HTTP with a JSON body
pub struct HttpClassifier {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RecordsError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("farm-records/0.1")
            .build()
            .map_err(|e| {
                RecordsError::Config(format!("failed to build classifier client: {}", e))
            })?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        image_key: &str,
        image: &[u8],
        crop_type_id: Option<&str>,
    ) -> Result<Classification, RecordsError> {
        let body = ClassifyRequest {
            image_key,
            image: base64::engine::general_purpose::STANDARD.encode(image),
            crop_type_id,
        };

        debug!(endpoint = %self.endpoint, image_key = %image_key, "Calling classifier");
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RecordsError::UpstreamUnavailable(format!("classifier request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Classifier returned an error");
            return Err(RecordsError::UpstreamUnavailable(format!(
                "classifier returned {}",
                status
            )));
        }

        response
            .json::<Classification>()
            .await
            .map_err(|e| {
                RecordsError::UpstreamUnavailable(format!("invalid classifier response: {}", e))
            })
    }
}
