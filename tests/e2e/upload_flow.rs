//! E2E Upload Flow Tests
//!
//! Happy path: a file sent through `UploadFile` reaches the media API intact,
//! the client gets the stored URL back, and no artifact is left behind.

use super::common::{contains_bytes, form_field, E2ETestEnv};
use serde_json::json;

/// Test: Uploaded bytes reach the media API unchanged and the URL comes back
#[tokio::test]
async fn test_upload_returns_url_and_forwards_bytes() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let api = env.accept_uploads().await;

    let payload = E2ETestEnv::random_payload(64 * 1024);
    let response = env.upload_file(&payload, "photo.png").await;

    assert!(response.get("errors").is_none(), "Unexpected errors: {}", response);
    let url = response["data"]["UploadFile"]["url"]
        .as_str()
        .expect("URL should be a string");
    assert!(url.starts_with("https://res.cloudinary.test/demo/image/upload/v1/graphql/"));

    let bodies = api.bodies();
    assert_eq!(bodies.len(), 1, "Exactly one provider call");
    assert!(
        contains_bytes(&bodies[0], &payload),
        "Provider should receive the file byte-for-byte"
    );
    assert_eq!(form_field(&bodies[0], "folder").as_deref(), Some("graphql"));
    assert_eq!(form_field(&bodies[0], "api_key").as_deref(), Some("test-key"));
    assert!(form_field(&bodies[0], "signature").is_some());

    let public_id = form_field(&bodies[0], "public_id").expect("public_id sent");
    assert!(url.ends_with(&public_id));
    assert!(!public_id.contains(char::is_whitespace));
}

/// Test: Temp directory holds nothing once the response is received
#[tokio::test]
async fn test_upload_leaves_no_artifact() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    env.accept_uploads().await;

    assert_eq!(env.artifact_count(), 0);
    let response = env.upload_file(b"hello world", "hello.txt").await;

    assert!(response["data"]["UploadFile"]["url"].is_string());
    assert_eq!(env.artifact_count(), 0, "Artifact should be deleted");
}

/// Test: Two uploads of different content get distinct ids and URLs
#[tokio::test]
async fn test_sequential_uploads_distinct_urls() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");
    let api = env.accept_uploads().await;

    let first = env.upload_file(b"first file", "a.txt").await;
    let second = env.upload_file(b"second file", "b.txt").await;

    let first_url = first["data"]["UploadFile"]["url"].as_str().unwrap();
    let second_url = second["data"]["UploadFile"]["url"].as_str().unwrap();
    assert_ne!(first_url, second_url);

    let bodies = api.bodies();
    assert_eq!(bodies.len(), 2);
    assert_ne!(
        form_field(&bodies[0], "public_id"),
        form_field(&bodies[1], "public_id")
    );
    assert_eq!(env.artifact_count(), 0);
}

/// Test: Missing file is not an error, the URL is null
#[tokio::test]
async fn test_upload_without_file_returns_null() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env.query("mutation { UploadFile { url } }").await;

    assert_eq!(response, json!({ "data": { "UploadFile": { "url": null } } }));
    assert_eq!(env.artifact_count(), 0);
}

/// Test: The hello query answers
#[tokio::test]
async fn test_hello_query() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env.query("{ hello }").await;

    assert_eq!(response, json!({ "data": { "hello": "Hello world!" } }));
}

/// Test: Health endpoint
#[tokio::test]
async fn test_health_check() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .client
        .get(format!("{}/health", env.base_url()))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

/// Test: Browser preflight is answered with CORS headers
#[tokio::test]
async fn test_cors_preflight() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .client
        .request(reqwest::Method::OPTIONS, env.graphql_url())
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 204);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

/// Test: GET on the GraphQL path serves GraphiQL
#[tokio::test]
async fn test_graphiql_page() {
    let env = E2ETestEnv::new().await.expect("Failed to create test env");

    let response = env
        .client
        .get(env.graphql_url())
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.to_lowercase().contains("graphiql"));
}
