//! Cloudinary upload API client
//!
//! Implements [`BlobStore`] with a signed `multipart/form-data` upload:
//!
//! ```text
//! POST {api_base}/v1_1/{cloud_name}/{resource_type}/upload
//!   file, api_key, timestamp, public_id, folder, signature
//! ```
//!
//! The signature is the hex digest of the signed parameters sorted by name,
//! joined as `k=v&k=v`, with the API secret appended.
//!
//! # Tracing
//!
//! Each upload creates a span named `cloudinary.upload` with the cloud name,
//! object id, folder, and the HTTP status once the provider has answered.

use super::{BlobStore, ForwardError, StoredObject};
use crate::config::{CloudinaryConfig, SignatureAlgorithm};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::Digest;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

/// Successful upload response (fields we use)
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    #[serde(default)]
    public_id: Option<String>,
    #[serde(default)]
    bytes: Option<u64>,
}

/// Error body: `{"error": {"message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Media API client
pub struct CloudinaryClient {
    config: CloudinaryConfig,
    http_client: reqwest::Client,
}

impl CloudinaryClient {
    /// Create a new client
    pub fn new(config: CloudinaryConfig) -> Result<Self, ForwardError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ForwardError::Config(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Upload endpoint URL
    pub fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/{}/upload",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            self.config.resource_type
        )
    }

    /// Sign `params` with the configured secret and algorithm
    pub fn sign(&self, params: &[(&str, String)]) -> String {
        sign_params(
            params,
            &self.config.api_secret,
            self.config.signature_algorithm,
        )
    }
}

/// Canonical string of signed parameters: sorted by name, `k=v` joined by `&`.
///
/// Empty values are left out.
pub fn string_to_sign(params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex digest of the canonical string with `secret` appended
pub fn sign_params(params: &[(&str, String)], secret: &str, algorithm: SignatureAlgorithm) -> String {
    let payload = format!("{}{}", string_to_sign(params), secret);
    match algorithm {
        SignatureAlgorithm::Sha1 => hex::encode(sha1::Sha1::digest(payload.as_bytes())),
        SignatureAlgorithm::Sha256 => hex::encode(sha2::Sha256::digest(payload.as_bytes())),
    }
}

/// Pull the provider's message out of an error body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl BlobStore for CloudinaryClient {
    #[tracing::instrument(
        name = "cloudinary.upload",
        skip(self, local_path),
        fields(
            cloudinary.cloud_name = %self.config.cloud_name,
            cloudinary.public_id = %public_id,
            cloudinary.folder = %folder,
            http.method = "POST",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn upload(
        &self,
        local_path: &Path,
        public_id: &str,
        folder: &str,
    ) -> Result<StoredObject, ForwardError> {
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(ForwardError::Artifact)?;
        let length = file
            .metadata()
            .await
            .map_err(ForwardError::Artifact)?
            .len();

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signed = [
            ("folder", folder.to_string()),
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = self.sign(&signed);

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let file_part = Part::stream_with_length(body, length).file_name(public_id.to_string());

        let mut form = Form::new()
            .part("file", file_part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("public_id", public_id.to_string())
            .text("folder", folder.to_string())
            .text("signature", signature);
        if self.config.signature_algorithm == SignatureAlgorithm::Sha256 {
            form = form.text("signature_algorithm", "sha256");
        }

        let response = self
            .http_client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        let text = response
            .text()
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ForwardError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&text)
            .map_err(|e| ForwardError::InvalidResponse(e.to_string()))?;

        let url = parsed
            .secure_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ForwardError::InvalidResponse("missing secure_url".into()))?;

        Ok(StoredObject {
            url,
            public_id: parsed
                .public_id
                .unwrap_or_else(|| format!("{}/{}", folder, public_id)),
            bytes: parsed.bytes,
        })
    }
}
