use anyhow::{Context, Result};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tower_http::services::ServeDir;
use tracing::{debug, info};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::responses::{
    success, ConvertRequest, ConvertResponse, DeletedEnvelope, SaveToLibraryRequest,
    SongEnvelope, SongResponse, SongsEnvelope,
};
use super::stream_audio::{attachment_response, audio_response, ByteRange};
use super::{http_cache, log_requests, state::*, ServerConfig};
use crate::pipeline::{ConversionPipeline, PipelineError, PromotionRequest, MISSING_URL_MESSAGE};
use crate::validation::download_filename;

const SONG_NOT_FOUND_MESSAGE: &str = "Song not found";
const INVALID_SONG_ID_MESSAGE: &str = "Invalid song ID";
const INVALID_SAVE_REQUEST_MESSAGE: &str = "Invalid request body";

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug, Default)]
struct DownloadQuery {
    pub title: Option<String>,
}

fn parse_song_id(id: &str) -> Result<i64, PipelineError> {
    id.parse::<i64>()
        .map_err(|_| PipelineError::InvalidInput(INVALID_SONG_ID_MESSAGE.to_string()))
}

fn song_not_found() -> PipelineError {
    PipelineError::NotFound(SONG_NOT_FOUND_MESSAGE.to_string())
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: state.version.to_string(),
    };
    success(stats)
}

async fn convert(
    State(pipeline): State<GuardedPipeline>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PipelineError> {
    let url = match payload {
        Ok(Json(request)) => request.url.unwrap_or_default(),
        Err(rejection) => {
            debug!("Rejected convert payload: {}", rejection);
            return Err(PipelineError::InvalidInput(MISSING_URL_MESSAGE.to_string()));
        }
    };

    let result = pipeline.convert(&url).await?;
    Ok(success(ConvertResponse::from(result)))
}

async fn download(
    State(pipeline): State<GuardedPipeline>,
    Path(file_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, PipelineError> {
    let staged = pipeline.staged(&file_id).await?;
    let title = query
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| staged.metadata.title.clone());

    Ok(attachment_response(&staged.path, &download_filename(&title)).await)
}

async fn save_to_library(
    State(pipeline): State<GuardedPipeline>,
    payload: Result<Json<SaveToLibraryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PipelineError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected save-to-library payload: {}", rejection);
            return Err(PipelineError::InvalidInput(
                INVALID_SAVE_REQUEST_MESSAGE.to_string(),
            ));
        }
    };

    let track = pipeline
        .promote(PromotionRequest {
            file_id: request.file_id.unwrap_or_default(),
            title: request.title,
            artist: request.artist,
            duration: request.duration,
            source_url: request.youtube_url,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        success(SongEnvelope {
            song: SongResponse::from(track),
        }),
    ))
}

async fn list_songs(
    State(library): State<GuardedLibraryStore>,
) -> Result<impl IntoResponse, PipelineError> {
    let songs = library
        .list()?
        .into_iter()
        .map(SongResponse::from)
        .collect();
    Ok(success(SongsEnvelope { songs }))
}

async fn get_song(
    State(library): State<GuardedLibraryStore>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let id = parse_song_id(&id)?;
    let track = library.get(id)?.ok_or_else(song_not_found)?;
    Ok(success(SongEnvelope {
        song: SongResponse::from(track),
    }))
}

async fn stream_song_audio(
    State(library): State<GuardedLibraryStore>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PipelineError> {
    let id = parse_song_id(&id)?;
    let audio = library.get_audio_bytes(id)?.ok_or_else(song_not_found)?;
    debug!("Streaming song {} ({} bytes)", id, audio.len());
    Ok(audio_response(audio, ByteRange::from_headers(&headers)))
}

async fn delete_song(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let id = parse_song_id(&id)?;
    if !state.library.delete(id)? {
        return Err(song_not_found());
    }
    info!("Deleted library song {}", id);
    state.pipeline.refresh_library_gauge();
    Ok(success(DeletedEnvelope { id }))
}

pub fn make_app(config: ServerConfig, pipeline: Arc<ConversionPipeline>) -> Router {
    let state = ServerState::new(config.clone(), pipeline);

    let audio_routes: Router = Router::new()
        .route("/songs/{id}/audio", get(stream_song_audio))
        .layer(middleware::from_fn_with_state(
            config.content_cache_age_sec,
            http_cache,
        ))
        .with_state(state.clone());

    let api_routes: Router = Router::new()
        .route("/convert", post(convert))
        .route("/download/{file_id}", get(download))
        .route("/songs", get(list_songs).post(save_to_library))
        .route("/songs/{id}", get(get_song).delete(delete_song))
        .with_state(state.clone())
        .merge(audio_routes);

    let legacy_routes: Router = Router::new()
        .route("/convert", post(convert))
        .route("/save-to-library", post(save_to_library))
        .route("/download/{file_id}", get(download))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router
        .merge(legacy_routes)
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server<F>(
    config: ServerConfig,
    pipeline: Arc<ConversionPipeline>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let port = config.port;
    let app = make_app(config, pipeline);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Serves Prometheus metrics on their own port, away from the public API.
pub async fn run_metrics_server<F>(port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = Router::new().route("/metrics", get(super::metrics::metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
