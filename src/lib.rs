//! gql-uploadr Library
//!
//! GraphQL upload relay: files sent through the `UploadFile` mutation are
//! drained to a transient local artifact, forwarded to a hosted media API,
//! and answered with the public URL of the stored object.
//!
//! # Features
//!
//! - **GraphQL multipart uploads**: `async-graphql` over a `hyper` listener
//! - **Guaranteed cleanup**: the transient artifact is deleted on every path
//! - **Pluggable storage**: the media API sits behind the `BlobStore` trait
//! - **Observability**: structured `tracing` logs and Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use gql_uploadr::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod graphql;
pub mod metrics;
pub mod server;
pub mod storage;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use upload::{UploadError, UploadService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
