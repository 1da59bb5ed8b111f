//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per server route. When API routes or
//! request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
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
    // Conversion
    // ========================================================================

    /// POST /api/convert
    pub async fn convert(&self, url: &str) -> Response {
        self.convert_with_body(json!({ "url": url })).await
    }

    /// POST /api/convert with an arbitrary JSON body
    pub async fn convert_with_body(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/api/convert", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Convert request failed")
    }

    /// POST /convert
    pub async fn convert_legacy(&self, url: &str) -> Response {
        self.client
            .post(format!("{}/convert", self.base_url))
            .json(&json!({ "url": url }))
            .send()
            .await
            .expect("Convert request failed")
    }

    /// Converts `url` and returns the staged file id, asserting success.
    pub async fn convert_ok(&self, url: &str) -> String {
        let response = self.convert(url).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.expect("Invalid convert JSON");
        body["file_id"]
            .as_str()
            .expect("Missing file_id")
            .to_string()
    }

    /// GET /api/download/{file_id}
    pub async fn download(&self, file_id: &str, title: Option<&str>) -> Response {
        let mut request = self
            .client
            .get(format!("{}/api/download/{}", self.base_url, file_id));
        if let Some(title) = title {
            request = request.query(&[("title", title)]);
        }
        request.send().await.expect("Download request failed")
    }

    /// GET /download/{file_id}
    pub async fn download_legacy(&self, file_id: &str) -> Response {
        self.client
            .get(format!("{}/download/{}", self.base_url, file_id))
            .send()
            .await
            .expect("Download request failed")
    }

    // ========================================================================
    // Library
    // ========================================================================

    /// POST /api/songs
    pub async fn save_to_library(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/api/songs", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Save request failed")
    }

    /// POST /save-to-library
    pub async fn save_to_library_legacy(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/save-to-library", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Save request failed")
    }

    /// Promotes `file_id` and returns the created song id, asserting success.
    pub async fn save_ok(&self, file_id: &str) -> i64 {
        let response = self.save_to_library(json!({ "file_id": file_id })).await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: Value = response.json().await.expect("Invalid save JSON");
        body["song"]["id"].as_i64().expect("Missing song id")
    }

    /// GET /api/songs
    pub async fn list_songs(&self) -> Response {
        self.client
            .get(format!("{}/api/songs", self.base_url))
            .send()
            .await
            .expect("List request failed")
    }

    /// GET /api/songs/{id}
    pub async fn get_song(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/api/songs/{}", self.base_url, id))
            .send()
            .await
            .expect("Get song request failed")
    }

    /// GET /api/songs/{id}/audio
    pub async fn get_song_audio(&self, id: &str, range: Option<&str>) -> Response {
        let mut request = self
            .client
            .get(format!("{}/api/songs/{}/audio", self.base_url, id));
        if let Some(range) = range {
            request = request.header("Range", range);
        }
        request.send().await.expect("Audio request failed")
    }

    /// DELETE /api/songs/{id}
    pub async fn delete_song(&self, id: &str) -> Response {
        self.client
            .delete(format!("{}/api/songs/{}", self.base_url, id))
            .send()
            .await
            .expect("Delete request failed")
    }
}
