//! HTTP listener for the GraphQL endpoint
//!
//! Built directly on `hyper` and `tokio`, one task per connection:
//!
//! | Method  | Path            | Response                                  |
//! |---------|-----------------|-------------------------------------------|
//! | POST    | `graphql_path`  | GraphQL (JSON or multipart request body)  |
//! | GET     | `graphql_path`  | GraphiQL page                             |
//! | OPTIONS | any             | CORS preflight (204)                      |
//! | GET     | `/health`       | `ok`                                      |
//!
//! Every response carries `Access-Control-Allow-Origin`.
//!
//! # Example
//!
//! ```no_run
//! use gql_uploadr::config::Config;
//! use gql_uploadr::server::http::HttpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = HttpServer::new(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::graphql::{build_schema, RelaySchema};
use crate::metrics;
use crate::server::ServerError;
use crate::upload::UploadService;
use async_graphql::http::{GraphiQLSource, MultipartOptions};
use async_graphql::{BatchRequest, ParseRequestError};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// State shared by every connection
struct AppState {
    schema: RelaySchema,
    graphql_path: String,
    cors_allow_origin: HeaderValue,
    multipart: MultipartOptions,
    max_upload_size: usize,
    max_request_size: usize,
}

/// GraphQL HTTP server
pub struct HttpServer {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl HttpServer {
    /// Bind the configured address with the production upload service
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let service = UploadService::from_config(&config)
            .map_err(|e| ServerError::RuntimeError(format!("Failed to build media client: {}", e)))?;
        Self::with_service(config, Arc::new(service)).await
    }

    /// Bind the configured address around an existing upload service
    ///
    /// Port 0 lets the OS pick a port; see [`HttpServer::local_addr`].
    pub async fn with_service(
        config: Config,
        service: Arc<UploadService>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        let cors_allow_origin = HeaderValue::from_str(&config.server.cors_allow_origin)
            .map_err(|e| ServerError::RuntimeError(format!("Invalid CORS origin: {}", e)))?;

        let state = AppState {
            schema: build_schema(service),
            graphql_path: config.server.graphql_path.clone(),
            cors_allow_origin,
            multipart: MultipartOptions::default()
                .max_file_size(config.server.max_upload_size)
                .max_num_files(1),
            max_upload_size: config.server.max_upload_size,
            max_request_size: config.server.max_request_size,
        };

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    /// The address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            "GraphQL endpoint at http://{}{}",
            self.local_addr, self.state.graphql_path
        );

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    info!("Handling {} {}", method, path);

    let mut response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => preflight(),
        (&Method::GET, "/health") => text(StatusCode::OK, "ok"),
        (&Method::GET, p) if p == state.graphql_path => graphiql(&state.graphql_path),
        (&Method::POST, p) if p == state.graphql_path => graphql(req, &state).await,
        _ => {
            metrics::record_request_error("not_found");
            text(StatusCode::NOT_FOUND, "Not Found")
        }
    };

    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        state.cors_allow_origin.clone(),
    );
    Ok(response)
}

impl AppState {
    /// Body size cap; multipart bodies also carry the file
    fn body_limit(&self, content_type: Option<&str>) -> usize {
        body_limit(content_type, self.max_upload_size, self.max_request_size)
    }
}

fn body_limit(content_type: Option<&str>, max_upload_size: usize, max_request_size: usize) -> usize {
    match content_type {
        Some(ct) if ct.starts_with("multipart/") => max_upload_size.saturating_add(max_request_size),
        _ => max_request_size,
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Parse a GraphQL request body, reading at most `limit` bytes
async fn receive_batch<B>(
    content_type: Option<String>,
    body: B,
    limit: usize,
    multipart: MultipartOptions,
) -> Result<BatchRequest, ParseRequestError>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body: std::pin::Pin<Box<dyn futures::AsyncRead + Send>> = Box::pin(
        Limited::new(body, limit)
            .into_data_stream()
            .map_err(std::io::Error::other)
            .into_async_read(),
    );

    async_graphql::http::receive_batch_body(content_type, body, multipart).await
}

/// Execute a (possibly batched) GraphQL request
async fn graphql(req: Request<Incoming>, state: &AppState) -> Response<Full<Bytes>> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let limit = state.body_limit(content_type.as_deref());
    if let Some(len) = declared_length(req.headers()).filter(|len| *len > limit as u64) {
        warn!("Rejected GraphQL request: body of {} bytes exceeds {}", len, limit);
        metrics::record_request_error("payload_too_large");
        return text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
    }

    let batch = match receive_batch(content_type, req.into_body(), limit, state.multipart.clone()).await {
        Ok(batch) => batch,
        Err(e) => {
            warn!("Rejected GraphQL request: {}", e);
            metrics::record_request_error("bad_request");
            return text(StatusCode::BAD_REQUEST, &format!("Bad request: {}", e));
        }
    };

    let response = state.schema.execute_batch(batch).await;
    match serde_json::to_vec(&response) {
        Ok(body) => {
            let mut res = Response::new(Full::new(Bytes::from(body)));
            res.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            res
        }
        Err(e) => {
            error!("Failed to serialize GraphQL response: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn graphiql(endpoint: &str) -> Response<Full<Bytes>> {
    let page = GraphiQLSource::build().endpoint(endpoint).finish();
    let mut res = Response::new(Full::new(Bytes::from(page)));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    res
}

fn preflight() -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::new()));
    *res.status_mut() = StatusCode::NO_CONTENT;
    let headers = res.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type, apollo-require-preflight, x-apollo-operation-name"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    res
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from(body.to_string())));
    *res.status_mut() = status;
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain"),
    );
    res
}
