//! JSON payloads and the response envelope shared by every route.
//!
//! Success: `{"success": true, ...payload}`.
//! Failure: `{"success": false, "error": "..."}`.

use crate::library::LibraryTrack;
use crate::pipeline::{ConversionResult, PipelineError};
use crate::server::metrics::record_error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Serialize, Debug)]
pub struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    payload: T,
}

pub fn success<T: Serialize>(payload: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        payload,
    })
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Failure {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::ExtractionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::StorageFailure(e) => {
                error!("Storage failure: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            record_error(self.kind(), "pipeline");
        }

        let body = Failure {
            success: false,
            error: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ConvertRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConvertResponse {
    pub file_id: String,
    pub title: String,
    pub artist: String,
    pub safe_title: String,
    pub duration: u32,
    pub youtube_url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thumbnail: Option<String>,
}

impl From<ConversionResult> for ConvertResponse {
    fn from(result: ConversionResult) -> Self {
        ConvertResponse {
            file_id: result.id,
            title: result.title,
            artist: result.artist,
            safe_title: result.safe_title,
            duration: result.duration,
            youtube_url: result.source_url,
            thumbnail: result.thumbnail,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct SaveToLibraryRequest {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub youtube_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SongResponse {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub duration: u32,
    pub youtube_url: Option<String>,
    pub file_size: u64,
    pub created_at: String,
}

impl From<LibraryTrack> for SongResponse {
    fn from(track: LibraryTrack) -> Self {
        let created_at = chrono::DateTime::from_timestamp(track.created_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        SongResponse {
            id: track.id,
            title: track.title,
            artist: track.artist,
            duration: track.duration,
            youtube_url: track.source_url,
            file_size: track.file_size,
            created_at,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct SongEnvelope {
    pub song: SongResponse,
}

#[derive(Serialize, Debug)]
pub struct SongsEnvelope {
    pub songs: Vec<SongResponse>,
}

#[derive(Serialize, Debug)]
pub struct DeletedEnvelope {
    pub id: i64,
}
