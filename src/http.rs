//! HTTP API for field and crop records
//!
//! Every route except `/health` and `/images/*` requires the
//! `x-actor-id` and `x-actor-role` headers set by the upstream gateway.
//!
//! ## Fields
//! - `POST /fields` - Register a field (farmer)
//! - `GET /fields` - Own fields
//! - `GET|PATCH|DELETE /fields/{id}`
//! - `POST /fields/{id}/approve|reject|verify` - Staff transitions
//! - `GET /fields/{id}/eligible-crops?asOf=YYYY-MM-DD`
//! - `POST /fields/{id}/detections?cropRecordId=` - Raw image body
//!
//! ## Crop records
//! - `POST /crops`, `GET /crops?fieldId=`
//! - `GET|PATCH|DELETE /crops/{id}`
//! - `POST /crops/{id}/verify` - Staff
//!
//! ## Review, detections, analytics, catalog
//! - `GET /review/fields?status=`, `GET /review/crops`
//! - `GET /detections`, `GET /detections/{id}`
//! - `GET /analytics`, `GET /analytics/{seasons|yearly|field-sizes|approval|severity}`
//! - `GET /catalog/crop-types`, `GET /catalog/mandals/{id}/villages`
//! - `GET /images/{key}?expires=&sig=` - Signed image download
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -H "x-actor-id: u1" -H "x-actor-role: farmer" \
//!      -d '{"name":"East plot","areaHectares":2.5,"latitude":17.4,"longitude":78.4,
//!           "mandalId":"m1","villageId":"v1"}' \
//!      http://localhost:8095/fields
//!
//! curl -X POST -H "x-actor-id: e1" -H "x-actor-role: employee" \
//!      http://localhost:8095/fields/{id}/approve
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::db::models::{CropUpdate, FieldStatus, NewCropRecord};
use crate::db::RecordsDb;
use crate::error::RecordsError;
use crate::identity::{Actor, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
use crate::image_store::{LocalImageStore, MAX_IMAGE_SIZE};
use crate::services::response::{
    binary_response, error_response, from_create_result, from_delete_result, from_result,
    method_not_allowed, not_found, ok, HandlerResult,
};
use crate::services::Services;
use crate::views::{
    to_views, CropRecordInputView, CropRecordUpdateInputView, CropRecordView, DetectionView,
    FieldDeletionView, FieldInputView, FieldUpdateInputView, FieldView, PredictionView,
};

/// Largest accepted JSON body (1MB)
const MAX_JSON_BODY: usize = 1024 * 1024;

/// Top-level path segments this server owns
const KNOWN_ROOTS: &[&str] = &[
    "health", "fields", "crops", "review", "detections", "analytics", "catalog", "images",
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EligibilityQuery {
    as_of: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectQuery {
    crop_record_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewQuery {
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CropListQuery {
    field_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageQuery {
    expires: i64,
    sig: String,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    images: Arc<LocalImageStore>,
    db: Arc<RecordsDb>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(
        services: Arc<Services>,
        images: Arc<LocalImageStore>,
        db: Arc<RecordsDb>,
        bind_addr: SocketAddr,
    ) -> Self {
        Self {
            services,
            images,
            db,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), RecordsError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), RecordsError> {
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();

        debug!(method = %method, path = %path, "Incoming request");

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let response = match self.route(req, &method, &segments, &query).await {
            Ok(response) => response,
            Err(e) => error_response(e),
        };
        Ok(response)
    }

    async fn route(
        &self,
        req: Request<Incoming>,
        method: &Method,
        segments: &[&str],
        query: &str,
    ) -> HandlerResult {
        // Routes without an actor
        match (method, segments) {
            (&Method::GET, ["health"]) => return self.handle_health(),
            (&Method::GET, ["images", key]) => return self.handle_get_image(key, query).await,
            _ => {}
        }

        let actor = actor_from_request(&req)?;
        let s = &self.services;

        let response = match (method, segments) {
            // Fields
            (&Method::POST, ["fields"]) => {
                let input: FieldInputView = read_json(req).await?;
                from_create_result(s.fields.create(&actor, input.into()).map(FieldView::from))
            }
            (&Method::GET, ["fields"]) => {
                from_result(s.fields.list_own(&actor).map(to_views::<_, FieldView>))
            }
            (&Method::GET, ["fields", id]) => {
                from_result(s.fields.get(&actor, id).map(FieldView::from))
            }
            (&Method::PATCH, ["fields", id]) => {
                let input: FieldUpdateInputView = read_json(req).await?;
                from_result(s.fields.update(&actor, id, input.into()).map(FieldView::from))
            }
            (&Method::DELETE, ["fields", id]) => {
                from_result(s.fields.delete(&actor, id).map(FieldDeletionView::from))
            }
            (&Method::POST, ["fields", id, "approve"]) => {
                from_result(s.fields.approve(&actor, id).map(FieldView::from))
            }
            (&Method::POST, ["fields", id, "reject"]) => {
                from_result(s.fields.reject(&actor, id).map(FieldView::from))
            }
            (&Method::POST, ["fields", id, "verify"]) => {
                from_result(s.fields.verify(&actor, id).map(FieldView::from))
            }
            (&Method::GET, ["fields", id, "eligible-crops"]) => {
                let q: EligibilityQuery = parse_query(query)?;
                let as_of = q.as_of.unwrap_or_else(|| Utc::now().date_naive());
                let crops = s.fields.eligible_crops(&actor, id, as_of);
                from_result(crops.map(to_views::<_, CropRecordView>))
            }
            (&Method::POST, ["fields", id, "detections"]) => {
                let q: DetectQuery = parse_query(query)?;
                let image = read_body(req.into_body(), MAX_IMAGE_SIZE).await?;
                let result = s
                    .detection
                    .detect(&actor, id, q.crop_record_id.as_deref(), &image)
                    .await;
                from_create_result(result.map(DetectionView::from))
            }

            // Crop records
            (&Method::POST, ["crops"]) => {
                let input: CropRecordInputView = read_json(req).await?;
                from_create_result(
                    NewCropRecord::try_from(input)
                        .and_then(|input| s.crops.create(&actor, input))
                        .map(CropRecordView::from),
                )
            }
            (&Method::GET, ["crops"]) => {
                let q: CropListQuery = parse_query(query)?;
                let crops = match q.field_id {
                    Some(field_id) => s.crops.list_for_field(&actor, &field_id),
                    None => s.crops.list_own(&actor),
                };
                from_result(crops.map(to_views::<_, CropRecordView>))
            }
            (&Method::GET, ["crops", id]) => {
                from_result(s.crops.get(&actor, id).map(CropRecordView::from))
            }
            (&Method::PATCH, ["crops", id]) => {
                let input: CropRecordUpdateInputView = read_json(req).await?;
                from_result(
                    CropUpdate::try_from(input)
                        .and_then(|update| s.crops.update(&actor, id, update))
                        .map(CropRecordView::from),
                )
            }
            (&Method::DELETE, ["crops", id]) => from_delete_result(s.crops.delete(&actor, id)),
            (&Method::POST, ["crops", id, "verify"]) => {
                from_result(s.crops.verify(&actor, id).map(CropRecordView::from))
            }

            // Staff review queues
            (&Method::GET, ["review", "fields"]) => {
                let q: ReviewQuery = parse_query(query)?;
                let status = q.status.as_deref().map(str::parse::<FieldStatus>).transpose()?;
                from_result(s.fields.list_for_review(&actor, status).map(to_views::<_, FieldView>))
            }
            (&Method::GET, ["review", "crops"]) => {
                from_result(s.crops.list_unverified(&actor).map(to_views::<_, CropRecordView>))
            }

            // Detections
            (&Method::GET, ["detections"]) => {
                from_result(s.detection.list_own(&actor).map(to_views::<_, PredictionView>))
            }
            (&Method::GET, ["detections", id]) => {
                from_result(s.detection.get(&actor, id).map(PredictionView::from))
            }

            // Analytics
            (&Method::GET, ["analytics"]) => from_result(s.analytics.overview(&actor)),
            (&Method::GET, ["analytics", "seasons"]) => from_result(s.analytics.seasons(&actor)),
            (&Method::GET, ["analytics", "yearly"]) => from_result(s.analytics.yearly(&actor)),
            (&Method::GET, ["analytics", "field-sizes"]) => {
                from_result(s.analytics.field_sizes(&actor))
            }
            (&Method::GET, ["analytics", "approval"]) => from_result(s.analytics.approval(&actor)),
            (&Method::GET, ["analytics", "severity"]) => from_result(s.analytics.severity(&actor)),

            // Catalog
            (&Method::GET, ["catalog", "crop-types"]) => from_result(s.catalog.crop_types()),
            (&Method::GET, ["catalog", "mandals", mandal_id, "villages"]) => {
                from_result(s.catalog.villages(mandal_id))
            }

            (_, [root, ..]) if KNOWN_ROOTS.contains(root) => method_not_allowed(),
            _ => not_found("Not found"),
        };

        Ok(response)
    }

    /// Health check endpoint
    fn handle_health(&self) -> HandlerResult {
        let stats = self.db.stats()?;
        Ok(ok(&serde_json::json!({
            "status": "ok",
            "fields": stats.field_count,
            "cropRecords": stats.crop_record_count,
            "predictions": stats.prediction_count,
        })))
    }

    /// GET /images/{key} - Serve an image behind a signed, expiring URL
    async fn handle_get_image(&self, key: &str, query: &str) -> HandlerResult {
        let q: ImageQuery = parse_query(query)?;
        if !self.images.verify_signature(key, q.expires, &q.sig, Utc::now().timestamp()) {
            return Err(RecordsError::Forbidden("invalid or expired image signature".into()));
        }

        let data = self.images.get(key).await?;
        Ok(binary_response(image_content_type(&data), data))
    }
}

/// Resolve the actor from gateway headers
fn actor_from_request(req: &Request<Incoming>) -> Result<Actor, RecordsError> {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());
    Actor::from_headers(header(ACTOR_ID_HEADER), header(ACTOR_ROLE_HEADER))
}

/// Collect a request body, stopping as soon as it passes `limit` bytes
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, RecordsError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            RecordsError::Validation(format!("body exceeds the {} byte limit", limit))
        } else {
            RecordsError::Internal(format!("Failed to read body: {}", e))
        }
    })?;
    Ok(collected.to_bytes())
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, RecordsError> {
    let body = read_body(req.into_body(), MAX_JSON_BODY).await?;
    Ok(serde_json::from_slice(&body)?)
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T, RecordsError> {
    serde_urlencoded::from_str(query)
        .map_err(|e| RecordsError::Validation(format!("invalid query string: {}", e)))
}

fn image_content_type(data: &[u8]) -> &'static str {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}
