//! End-to-end tests for conversion and staged downloads

mod common;

use common::{
    fixture_audio, TestClient, TestServer, AGE_RESTRICTED_VIDEO_URL, FIXTURE_AUDIO_SIZE,
    NOT_A_VIDEO_URL, NO_OUTPUT_VIDEO_URL, SHORT_VIDEO_URL, STAGING_TTL_SECS, TEST_SONG_DURATION,
    TEST_SONG_TITLE, TEST_SONG_URL, UNAVAILABLE_VIDEO_URL, VIDEO_ARTIST, VIDEO_DURATION,
    VIDEO_SAFE_TITLE, VIDEO_TITLE, VIDEO_URL,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime};

fn is_uuid_shaped(id: &str) -> bool {
    id.len() == 36
        && id
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || ('a'..='f').contains(&c))
}

// =============================================================================
// Convert then save
// =============================================================================

#[tokio::test]
async fn test_convert_then_save_to_library() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.convert(TEST_SONG_URL).await;
    assert_eq!(response.status(), StatusCode::OK);
    let converted: Value = response.json().await.unwrap();
    assert_eq!(converted["success"], true);
    assert_eq!(converted["safe_title"], TEST_SONG_TITLE);
    assert_eq!(converted["duration"], TEST_SONG_DURATION);
    let file_id = converted["file_id"].as_str().unwrap().to_string();
    assert!(is_uuid_shaped(&file_id), "unexpected file id {}", file_id);
    assert_eq!(server.staged_file_count(), 2);

    let response = client
        .save_to_library_legacy(json!({ "file_id": file_id }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let saved: Value = response.json().await.unwrap();
    assert_eq!(saved["success"], true);
    assert_eq!(saved["song"]["title"], TEST_SONG_TITLE);
    assert_eq!(saved["song"]["duration"], TEST_SONG_DURATION);
    assert_eq!(saved["song"]["file_size"], FIXTURE_AUDIO_SIZE);
    assert_eq!(saved["song"]["youtube_url"], TEST_SONG_URL);

    assert_eq!(server.staged_file_count(), 0);
    assert!(server.staging.get(&file_id).is_err());
    assert_eq!(server.library.count().unwrap(), 1);
}

// =============================================================================
// Conversion responses
// =============================================================================

#[tokio::test]
async fn test_convert_reports_metadata() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.convert(VIDEO_URL).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["title"], VIDEO_TITLE);
    assert_eq!(body["artist"], VIDEO_ARTIST);
    assert_eq!(body["safe_title"], VIDEO_SAFE_TITLE);
    assert_eq!(body["duration"], VIDEO_DURATION);
    assert_eq!(body["youtube_url"], VIDEO_URL);
    assert!(body["thumbnail"].is_string());
}

#[tokio::test]
async fn test_convert_trims_url() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.convert(&format!("  {}\n", SHORT_VIDEO_URL)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["youtube_url"], SHORT_VIDEO_URL);
}

#[tokio::test]
async fn test_legacy_convert_route() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.convert_legacy(VIDEO_URL).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_convert_rejects_bad_input_without_extracting() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let cases = [
        (json!({}), "Please provide a YouTube URL"),
        (json!({ "url": "" }), "Please provide a YouTube URL"),
        (json!({ "url": "   " }), "Please provide a YouTube URL"),
        (json!({ "url": NOT_A_VIDEO_URL }), "Invalid YouTube URL format"),
        (
            json!({ "url": "https://youtube.com/watch?v=short" }),
            "Invalid YouTube URL format",
        ),
    ];

    for (body, message) in cases {
        let response = client.convert_with_body(body.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error, json!({ "success": false, "error": message }));
    }

    assert_eq!(server.extractor_calls(), 0);
    assert_eq!(server.staged_file_count(), 0);
}

#[tokio::test]
async fn test_extraction_failures_are_reported() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let cases = [
        (UNAVAILABLE_VIDEO_URL, "Video is unavailable or private"),
        (AGE_RESTRICTED_VIDEO_URL, "Video is age-restricted"),
        (NO_OUTPUT_VIDEO_URL, "Failed to convert audio"),
    ];

    for (url, message) in cases {
        let response = client.convert(url).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["success"], false);
        assert_eq!(error["error"], message);
    }

    assert_eq!(server.extractor_calls(), 3);
    assert_eq!(server.staged_file_count(), 0);
}

// =============================================================================
// Staged downloads
// =============================================================================

#[tokio::test]
async fn test_download_staged_file() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let file_id = client.convert_ok(VIDEO_URL).await;

    let response = client.download(&file_id, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    assert_eq!(
        response.headers()["content-disposition"],
        format!("attachment; filename=\"{}.mp3\"", VIDEO_SAFE_TITLE).as_str()
    );
    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.as_ref(), fixture_audio().as_slice());

    // Downloading does not consume the staged file
    let response = client.download_legacy(&file_id).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_download_uses_sanitized_title() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let file_id = client.convert_ok(VIDEO_URL).await;

    let response = client.download(&file_id, Some("A/B: Song?! ")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"AB Song .mp3\""
    );

    let response = client.download(&file_id, Some("?!?")).await;
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"audio.mp3\""
    );
}

#[tokio::test]
async fn test_download_rejects_invalid_and_unknown_ids() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    for id in ["NOT-HEX", "abc.mp3", "%2E%2E%2Fsecret"] {
        let response = client.download(id, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "id {}", id);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"], "Invalid file ID");
    }

    let response = client
        .download("0b3f1a2c-1111-4222-8333-444455556666", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "File not found or expired");
}

#[tokio::test]
async fn test_expired_staged_file_is_gone() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let file_id = client.convert_ok(VIDEO_URL).await;

    let later = SystemTime::now() + Duration::from_secs(STAGING_TTL_SECS + 60);
    assert_eq!(server.staging.sweep_at(later), 2);
    assert_eq!(server.staging.sweep_at(later), 0);

    let response = client.download(&file_id, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.save_to_library(json!({ "file_id": file_id })).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "File not found or expired");
}

#[tokio::test]
async fn test_expired_staged_file_is_refused_before_any_sweep() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let file_id = client.convert_ok(VIDEO_URL).await;

    let path = server.staging.root().join(format!("{}.mp3", file_id));
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(STAGING_TTL_SECS + 100))
        .unwrap();

    let response = client.download(&file_id, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.save_to_library(json!({ "file_id": file_id })).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "File not found or expired");
    assert_eq!(server.library.count().unwrap(), 0);
    assert!(path.exists());
}
