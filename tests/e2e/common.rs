//! Common E2E Test Infrastructure
//!
//! Provides shared utilities for E2E tests:
//! - Test server management
//! - A mock media API (wiremock) that records what it received
//! - GraphQL multipart request helpers
//! - Test data generation

use bytes::Bytes;
use gql_uploadr::config::Config;
use gql_uploadr::server::http::HttpServer;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Cloud name used by every test
pub const CLOUD_NAME: &str = "demo";

/// Upload endpoint path on the mock media API
pub const UPLOAD_PATH: &str = "/v1_1/demo/image/upload";

/// The mutation the web client sends
pub const UPLOAD_MUTATION: &str =
    "mutation Upload($file: Upload) { UploadFile(file: $file) { url } }";

/// Records every upload body and answers like the media API
#[derive(Clone, Default)]
pub struct RecordingMediaApi {
    bodies: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingMediaApi {
    /// Raw multipart bodies received so far
    pub fn bodies(&self) -> Vec<Vec<u8>> {
        self.bodies.lock().unwrap().clone()
    }
}

impl Respond for RecordingMediaApi {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut bodies = self.bodies.lock().unwrap();
        bodies.push(request.body.clone());

        let public_id = form_field(&request.body, "public_id").unwrap_or_default();
        let folder = form_field(&request.body, "folder").unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "public_id": format!("{}/{}", folder, public_id),
            "secure_url": format!(
                "https://res.cloudinary.test/{}/image/upload/v1/{}/{}",
                CLOUD_NAME, folder, public_id
            ),
            "bytes": request.body.len(),
        }))
    }
}

/// E2E Test Environment
///
/// Runs the server against a mock media API with a private temp directory.
pub struct E2ETestEnv {
    pub server_addr: SocketAddr,
    pub media: MockServer,
    pub client: reqwest::Client,
    pub temp_dir: TempDir,
    _server_handle: tokio::task::JoinHandle<()>,
}

impl E2ETestEnv {
    /// Start a server whose artifacts go to a fresh temp directory
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let artifacts = temp_dir.path().to_path_buf();
        Self::with_artifact_dir(temp_dir, artifacts).await
    }

    /// Start a server writing artifacts to `artifacts` (which may not exist)
    pub async fn with_artifact_dir(
        temp_dir: TempDir,
        artifacts: PathBuf,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let media = MockServer::start().await;
        let config = Self::config(&media.uri(), artifacts);

        let server = HttpServer::new(config).await?;
        let server_addr = server.local_addr();

        let server_handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        // Wait for server to be ready
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            server_addr,
            media,
            client,
            temp_dir,
            _server_handle: server_handle,
        })
    }

    /// Test configuration pointing at the mock media API
    pub fn config(api_base: &str, artifacts: PathBuf) -> Config {
        let mut config = Config::default();
        config.server.address = "127.0.0.1:0".into();
        config.relay.temp_dir = Some(artifacts);
        config.storage.cloudinary.cloud_name = CLOUD_NAME.into();
        config.storage.cloudinary.api_key = "test-key".into();
        config.storage.cloudinary.api_secret = "test-secret".into();
        config.storage.cloudinary.api_base = api_base.to_string();
        config.metrics.enabled = false;
        config
    }

    /// Get the base URL for the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.server_addr)
    }

    /// GraphQL endpoint
    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.base_url())
    }

    /// Mount a media API that accepts and records uploads
    pub async fn accept_uploads(&self) -> RecordingMediaApi {
        let api = RecordingMediaApi::default();
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(api.clone())
            .mount(&self.media)
            .await;
        api
    }

    /// Mount a media API that rejects uploads with `status`
    pub async fn reject_uploads(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({
                    "error": { "message": message }
                })),
            )
            .mount(&self.media)
            .await;
    }

    /// Send `UploadFile` with `data` as the file, return the JSON response
    pub async fn upload_file(&self, data: &[u8], file_name: &str) -> Value {
        let operations = json!({
            "query": UPLOAD_MUTATION,
            "variables": { "file": null },
        });
        let form = Form::new()
            .text("operations", operations.to_string())
            .text("map", r#"{"0":["variables.file"]}"#)
            .part(
                "0",
                Part::bytes(data.to_vec())
                    .file_name(file_name.to_string())
                    .mime_str("application/octet-stream")
                    .unwrap(),
            );

        self.client
            .post(self.graphql_url())
            .multipart(form)
            .send()
            .await
            .expect("Request failed")
            .json()
            .await
            .expect("Response was not JSON")
    }

    /// Send a plain JSON GraphQL request
    pub async fn query(&self, query: &str) -> Value {
        self.client
            .post(self.graphql_url())
            .json(&json!({ "query": query }))
            .send()
            .await
            .expect("Request failed")
            .json()
            .await
            .expect("Response was not JSON")
    }

    /// Number of entries in the artifact directory
    pub fn artifact_count(&self) -> usize {
        count_entries(self.temp_dir.path())
    }

    /// Generate a random test payload
    pub fn random_payload(size: usize) -> Bytes {
        use rand::Rng;
        let mut rng = rand::rng();
        let data: Vec<u8> = (0..size).map(|_| rng.random()).collect();
        Bytes::from(data)
    }
}

/// Count directory entries (0 for a missing directory)
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Value of a text field in a multipart body
pub fn form_field(body: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let marker = format!("name=\"{}\"\r\n\r\n", name);
    let start = text.find(&marker)? + marker.len();
    let end = text[start..].find("\r\n")? + start;
    Some(text[start..end].to_string())
}

/// Whether `haystack` contains `needle` as a contiguous byte run
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
