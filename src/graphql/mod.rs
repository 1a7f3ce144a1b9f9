//! GraphQL schema
//!
//! ```graphql
//! type Query { hello: String! }
//! scalar Upload
//! type Result { url: String }
//! type Mutation { UploadFile(file: Upload): Result }
//! ```
//!
//! `UploadFile` without a file answers `{ url: null }`. Failures surface as an
//! opaque `"Upload failed"` error with an `extensions.code`; the cause is only
//! logged.

use crate::upload::UploadService;
use async_graphql::{
    Context, EmptySubscription, Error, ErrorExtensions, Object, Schema, SimpleObject, Upload,
};
use std::sync::Arc;

/// Schema served by the HTTP layer
pub type RelaySchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the schema around an upload service
pub fn build_schema(service: Arc<UploadService>) -> RelaySchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(service)
        .finish()
}

/// Result of `UploadFile`
#[derive(SimpleObject, Debug, Clone, Default)]
#[graphql(name = "Result")]
pub struct UploadFileResult {
    pub url: Option<String>,
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn hello(&self) -> &'static str {
        "Hello world!"
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    #[graphql(name = "UploadFile")]
    async fn upload_file(
        &self,
        ctx: &Context<'_>,
        file: Option<Upload>,
    ) -> async_graphql::Result<Option<UploadFileResult>> {
        let Some(file) = file else {
            tracing::info!("UploadFile called without a file");
            return Ok(Some(UploadFileResult::default()));
        };

        let service = ctx.data::<Arc<UploadService>>()?;
        let value = file.value(ctx).map_err(|e| {
            tracing::error!(error = %e, "Upload part unavailable");
            upload_error("IO_FAILURE")
        })?;

        tracing::info!(
            filename = %value.filename,
            content_type = ?value.content_type,
            "Relaying upload"
        );

        let reader = tokio::fs::File::from_std(value.content);
        match service.upload(reader).await {
            Ok(stored) => Ok(Some(UploadFileResult {
                url: Some(stored.url),
            })),
            Err(e) => Err(upload_error(e.code())),
        }
    }
}

fn upload_error(code: &'static str) -> Error {
    Error::new("Upload failed").extend_with(|_, e| e.set("code", code))
}
