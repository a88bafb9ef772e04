//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per server endpoint.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::Value;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Server Endpoints
    // ========================================================================

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.get_path("/").await
    }

    /// GET /api/v1/{resource}
    pub async fn get_document(&self, resource: &str) -> Response {
        self.get_path(&format!("/api/v1/{}", resource)).await
    }

    /// GET /api/v1/{resource} with an explicit forwarded host
    pub async fn get_document_forwarded(&self, resource: &str, host: &str) -> Response {
        self.client
            .get(format!("{}/api/v1/{}", self.base_url, resource))
            .header("X-Forwarded-Host", host)
            .send()
            .await
            .expect("Get document request failed")
    }

    /// GET /api/v1/{resource}, asserting success and parsing the body
    pub async fn get_document_json(&self, resource: &str) -> Value {
        let response = self.get_document(resource).await;
        assert!(
            response.status().is_success(),
            "GET {} failed with {}",
            resource,
            response.status()
        );
        response.json().await.expect("Document is not JSON")
    }

    /// POST /api/v1/listening-session
    pub async fn post_listening_session(&self, payload: &Value) -> Response {
        self.client
            .post(format!("{}/api/v1/listening-session", self.base_url))
            .json(payload)
            .send()
            .await
            .expect("Listening session request failed")
    }

    // ========================================================================
    // Raw Files
    // ========================================================================

    /// GET /data/{path}
    pub async fn get_data_file(&self, path: &str) -> Response {
        self.get_path(&format!("/data/{}", path)).await
    }

    /// GET /data/{path} with a Range header
    pub async fn get_data_file_range(&self, path: &str, range: &str) -> Response {
        self.client
            .get(format!("{}/data/{}", self.base_url, path))
            .header("Range", range)
            .send()
            .await
            .expect("Ranged file request failed")
    }

    /// GET /assets/{path}
    pub async fn get_asset_file(&self, path: &str) -> Response {
        self.get_path(&format!("/assets/{}", path)).await
    }

    /// GET an arbitrary, already-encoded path
    pub async fn get_path(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Request failed")
    }
}
