//! E2E Error Scenario Tests
//!
//! ## Test Coverage
//!
//! - Media API rejections (bad credentials, server errors)
//! - Local write failures
//! - Malformed GraphQL requests
//! - Unknown routes
//!
//! Every failing upload must still leave the artifact directory empty and
//! must not leak provider detail to the client.

use super::common::{count_entries, E2ETestEnv};

/// Test: Invalid credentials surface as an opaque UPLOAD_FAILURE
#[tokio::test]
async fn test_provider_rejection_is_upload_failure() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    env.reject_uploads(401, "Invalid api_key test-key").await;

    let response = env.upload_file(b"some bytes", "file.bin").await;

    let errors = response["errors"].as_array().expect("errors expected");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "Upload failed");
    assert_eq!(errors[0]["extensions"]["code"], "UPLOAD_FAILURE");
    assert!(
        !response.to_string().contains("Invalid api_key"),
        "Provider detail must not reach the client"
    );
    assert!(response["data"]["UploadFile"].is_null());
}

/// Test: Artifact is deleted even when the provider fails
#[tokio::test]
async fn test_provider_failure_removes_artifact() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    env.reject_uploads(500, "Internal error").await;

    let response = env.upload_file(b"some bytes", "file.bin").await;

    assert!(response["errors"].is_array());
    assert_eq!(env.artifact_count(), 0);
}

/// Test: Unknown upload endpoint (provider 404) is an UPLOAD_FAILURE too
#[tokio::test]
async fn test_unknown_upload_endpoint_is_upload_failure() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    // No mock mounted: wiremock answers 404
    let response = env.upload_file(b"some bytes", "file.bin").await;

    assert_eq!(response["errors"][0]["extensions"]["code"], "UPLOAD_FAILURE");
    assert_eq!(env.artifact_count(), 0);
}

/// Test: Local write failure is an IO_FAILURE and nothing reaches the provider
#[tokio::test]
async fn test_local_write_failure_is_io_failure() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("missing");
    let env = E2ETestEnv::with_artifact_dir(temp_dir, missing.clone())
        .await
        .expect("Failed to create test env");
    let api = env.accept_uploads().await;

    let response = env.upload_file(b"some bytes", "file.bin").await;

    assert_eq!(response["errors"][0]["message"], "Upload failed");
    assert_eq!(response["errors"][0]["extensions"]["code"], "IO_FAILURE");
    assert!(api.bodies().is_empty(), "Provider must not be called");
    assert_eq!(count_entries(&missing), 0);
    assert_eq!(env.artifact_count(), 0);
}

/// Test: Garbage body is rejected with 400
#[tokio::test]
async fn test_malformed_request_rejected() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .client
        .post(env.graphql_url())
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400);
}

/// Test: Multipart request with a map pointing nowhere is rejected
#[tokio::test]
async fn test_multipart_without_operations_rejected() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let form = reqwest::multipart::Form::new().text("map", r#"{"0":["variables.file"]}"#);
    let response = env
        .client
        .post(env.graphql_url())
        .multipart(form)
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 400);
    assert_eq!(env.artifact_count(), 0);
}

/// Test: Unknown routes return 404
#[tokio::test]
async fn test_unknown_route_not_found() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .client
        .delete(format!("{}/uploads/test.txt", env.base_url()))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 404);
}
