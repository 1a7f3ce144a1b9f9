//! Configuration module for gql-uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. When no configuration file
//! is present the whole configuration can be built from the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Environment variable holding the media account name
pub const ENV_CLOUD_NAME: &str = "CLOUDINARY_CLOUD_NAME";
/// Environment variable holding the media API key
pub const ENV_API_KEY: &str = "CLOUDINARY_API_KEY";
/// Environment variable holding the media API secret
pub const ENV_API_SECRET: &str = "CLOUDINARY_API_SECRET";

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// A value still of the form `${VAR}` was never expanded
fn is_unexpanded(value: &str) -> bool {
    value.starts_with("${") && value.ends_with('}')
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from defaults and environment variables
    ///
    /// Credentials come from `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY` and
    /// `CLOUDINARY_API_SECRET`. `UPLOADR_ADDRESS`, `UPLOADR_TEMP_DIR` and
    /// `UPLOADR_FOLDER` override the matching defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        config.storage.cloudinary.cloud_name = std::env::var(ENV_CLOUD_NAME).unwrap_or_default();
        config.storage.cloudinary.api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
        config.storage.cloudinary.api_secret = std::env::var(ENV_API_SECRET).unwrap_or_default();

        if let Ok(address) = std::env::var("UPLOADR_ADDRESS") {
            config.server.address = address;
        }
        if let Ok(dir) = std::env::var("UPLOADR_TEMP_DIR") {
            config.relay.temp_dir = Some(PathBuf::from(dir));
        }
        if let Ok(folder) = std::env::var("UPLOADR_FOLDER") {
            config.storage.folder = folder;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .address
            .parse::<SocketAddr>()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid server address '{}': {}",
                    self.server.address, e
                ))
            })?;

        if !self.server.graphql_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "GraphQL path '{}' must start with '/'",
                self.server.graphql_path
            )));
        }

        if self.server.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_upload_size must be greater than zero".into(),
            ));
        }

        if self.server.max_request_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_request_size must be greater than zero".into(),
            ));
        }

        if self.relay.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "Relay buffer_size must be greater than zero".into(),
            ));
        }

        if self.storage.folder.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Storage folder cannot be empty".into(),
            ));
        }

        let cloudinary = &self.storage.cloudinary;
        for (field, value) in [
            ("cloud_name", &cloudinary.cloud_name),
            ("api_key", &cloudinary.api_key),
            ("api_secret", &cloudinary.api_secret),
        ] {
            if value.trim().is_empty() || is_unexpanded(value) {
                return Err(ConfigError::ValidationError(format!(
                    "Media API {} is not set",
                    field
                )));
            }
        }

        if !is_valid_http_url(&cloudinary.api_base) {
            return Err(ConfigError::ValidationError(
                "Invalid media API base: must start with http:// or https://".into(),
            ));
        }

        if cloudinary.resource_type.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Media API resource_type cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_graphql_path")]
    pub graphql_path: String,
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,
    /// Largest file accepted in a multipart GraphQL request, in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// Largest request body apart from the uploaded file, in bytes
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            graphql_path: default_graphql_path(),
            cors_allow_origin: default_cors_allow_origin(),
            max_upload_size: default_max_upload_size(),
            max_request_size: default_max_request_size(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:4100".to_string()
}

fn default_graphql_path() -> String {
    "/graphql".to_string()
}

fn default_cors_allow_origin() -> String {
    "*".to_string()
}

fn default_max_upload_size() -> usize {
    104857600 // 100MB
}

fn default_max_request_size() -> usize {
    1048576 // 1MB
}

/// Stream relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Directory for transient artifacts. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub name_prefix: String,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            name_prefix: String::new(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl RelayConfig {
    /// Resolved temp directory
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_buffer_size() -> usize {
    65536 // 64KB
}

/// Storage forwarding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Folder every object is stored under
    #[serde(default = "default_folder")]
    pub folder: String,
    pub cloudinary: CloudinaryConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            cloudinary: CloudinaryConfig::default(),
        }
    }
}

fn default_folder() -> String {
    "graphql".to_string()
}

/// Hash used to sign upload requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

/// Media API account and client settings
#[derive(Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_base: default_api_base(),
            resource_type: default_resource_type(),
            signature_algorithm: SignatureAlgorithm::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("resource_type", &self.resource_type)
            .field("signature_algorithm", &self.signature_algorithm)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_api_base() -> String {
    "https://api.cloudinary.com".to_string()
}

fn default_resource_type() -> String {
    "image".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}
