//! Sequences validation, extraction, staging and promotion.
//!
//! The pipeline holds no per-request state: between a conversion and its
//! promotion the staged artifact is the only carrier of progress.

use crate::extractor::{ExtractionFailure, ExtractionInvoker};
use crate::library::{LibraryStore, LibraryTrack, NewLibraryTrack};
use crate::server::metrics;
use crate::staging::{ClaimedArtifact, StagedArtifact, StagingError, StagingSlot, StagingStore};
use crate::validation::{is_supported_video_url, sanitize_title};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

pub const MISSING_URL_MESSAGE: &str = "Please provide a YouTube URL";
pub const INVALID_URL_MESSAGE: &str = "Invalid YouTube URL format";
pub const INVALID_FILE_ID_MESSAGE: &str = "Invalid file ID";
pub const STAGED_NOT_FOUND_MESSAGE: &str = "File not found or expired";
pub const EMPTY_AUDIO_MESSAGE: &str = "Converted file is empty";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionFailure),

    #[error("storage failure: {0:#}")]
    StorageFailure(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::ExtractionFailed(failure) => failure.kind(),
            PipelineError::StorageFailure(_) => "storage_failure",
        }
    }

    /// Message that can be shown to the caller. Storage details stay in logs.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InvalidInput(msg) | PipelineError::NotFound(msg) => msg.clone(),
            PipelineError::ExtractionFailed(failure) => failure.user_message().to_string(),
            PipelineError::StorageFailure(_) => "Internal storage error".to_string(),
        }
    }
}

impl From<StagingError> for PipelineError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::InvalidId => {
                PipelineError::InvalidInput(INVALID_FILE_ID_MESSAGE.to_string())
            }
            StagingError::NotFound => {
                PipelineError::NotFound(STAGED_NOT_FOUND_MESSAGE.to_string())
            }
            other => PipelineError::StorageFailure(anyhow::Error::new(other)),
        }
    }
}

/// What a successful conversion hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration: u32,
    pub safe_title: String,
    pub source_url: String,
    pub thumbnail: Option<String>,
}

/// A request to move a staged artifact into the library. Metadata fields
/// override what was recorded at conversion time.
#[derive(Debug, Clone, Default)]
pub struct PromotionRequest {
    pub file_id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub duration: Option<u32>,
    pub source_url: Option<String>,
}

pub struct ConversionPipeline {
    invoker: ExtractionInvoker,
    staging: Arc<StagingStore>,
    library: Arc<dyn LibraryStore>,
    sweep_on_convert: bool,
}

impl ConversionPipeline {
    pub fn new(
        invoker: ExtractionInvoker,
        staging: Arc<StagingStore>,
        library: Arc<dyn LibraryStore>,
        sweep_on_convert: bool,
    ) -> Self {
        Self {
            invoker,
            staging,
            library,
            sweep_on_convert,
        }
    }

    pub fn staging(&self) -> &Arc<StagingStore> {
        &self.staging
    }

    pub fn library(&self) -> &Arc<dyn LibraryStore> {
        &self.library
    }

    /// Validating -> Extracting -> Staged.
    pub async fn convert(&self, url: &str) -> Result<ConversionResult, PipelineError> {
        let start = Instant::now();
        let result = self.do_convert(url.trim()).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_conversion(outcome, start.elapsed());
        result
    }

    async fn do_convert(&self, url: &str) -> Result<ConversionResult, PipelineError> {
        if url.is_empty() {
            return Err(PipelineError::InvalidInput(MISSING_URL_MESSAGE.to_string()));
        }
        if !is_supported_video_url(url) {
            return Err(PipelineError::InvalidInput(INVALID_URL_MESSAGE.to_string()));
        }

        if self.sweep_on_convert {
            let swept = self.on_staging(|staging| staging.sweep()).await?;
            metrics::record_swept_files(swept);
        }

        let slot = self.staging.new_slot();
        let audio = match self.invoker.extract(url, slot.output_stem()).await {
            Ok(audio) => audio,
            Err(failure) => {
                warn!("Extraction of {} failed: {}", url, failure);
                self.discard(slot).await;
                return Err(failure.into());
            }
        };

        let put_slot = slot.clone();
        let source_url = url.to_string();
        let staged = match self
            .on_staging(move |staging| staging.put(&put_slot, &audio, &source_url))
            .await
        {
            Ok(Ok(staged)) => staged,
            Ok(Err(e)) => {
                error!("Failed to stage converted audio for {}: {}", url, e);
                self.discard(slot).await;
                return Err(e.into());
            }
            Err(e) => {
                self.discard(slot).await;
                return Err(e);
            }
        };

        info!(
            "Converted {} into staged artifact {} ({} bytes)",
            url, staged.id, staged.file_size
        );
        Ok(ConversionResult {
            safe_title: sanitize_title(&staged.metadata.title),
            id: staged.id,
            title: staged.metadata.title,
            artist: staged.metadata.artist,
            duration: staged.metadata.duration,
            source_url: staged.metadata.source_url,
            thumbnail: staged.metadata.thumbnail,
        })
    }

    /// Staged -> Promoting -> Promoted. The staged artifact is claimed
    /// atomically, so concurrent promotions of one id produce one track.
    pub async fn promote(&self, request: PromotionRequest) -> Result<LibraryTrack, PipelineError> {
        let result = self.do_promote(request).await;
        metrics::record_promotion(match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        });
        result
    }

    async fn do_promote(&self, request: PromotionRequest) -> Result<LibraryTrack, PipelineError> {
        let file_id = request.file_id.trim().to_string();
        let claim = self
            .on_staging(move |staging| staging.claim(&file_id))
            .await??;
        let staged = claim.artifact();

        let audio = match tokio::fs::read(&staged.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Claimed artifact {} disappeared before it was read", staged.id);
                return Err(StagingError::NotFound.into());
            }
            Err(e) => {
                error!("Failed to read claimed artifact {}: {}", staged.id, e);
                self.release(claim).await;
                return Err(PipelineError::StorageFailure(e.into()));
            }
        };
        if audio.is_empty() {
            self.release(claim).await;
            return Err(PipelineError::InvalidInput(EMPTY_AUDIO_MESSAGE.to_string()));
        }

        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        let metadata = &staged.metadata;
        let new_track = NewLibraryTrack {
            title: non_empty(request.title).unwrap_or_else(|| metadata.title.clone()),
            artist: non_empty(request.artist).unwrap_or_else(|| metadata.artist.clone()),
            duration: request.duration.unwrap_or(metadata.duration),
            source_url: non_empty(request.source_url)
                .or_else(|| non_empty(Some(metadata.source_url.clone()))),
            audio,
        };

        let track = match self.library.create(new_track) {
            Ok(track) => track,
            Err(e) => {
                error!("Failed to store {} in the library: {:#}", staged.id, e);
                self.release(claim).await;
                return Err(PipelineError::StorageFailure(e));
            }
        };

        info!(
            "Promoted staged artifact {} to library track {}",
            staged.id, track.id
        );
        if let Err(e) = self.on_staging(move |staging| staging.complete(claim)).await {
            warn!("Failed to clean up promoted artifact: {}", e);
        }
        self.refresh_library_gauge();
        Ok(track)
    }

    /// A staged artifact ready to be downloaded.
    pub async fn staged(&self, file_id: &str) -> Result<StagedArtifact, PipelineError> {
        let file_id = file_id.to_string();
        Ok(self.on_staging(move |staging| staging.get(&file_id)).await??)
    }

    /// Runs blocking staging filesystem work off the async executor.
    async fn on_staging<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&StagingStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let staging = self.staging.clone();
        tokio::task::spawn_blocking(move || f(&staging))
            .await
            .map_err(|e| PipelineError::StorageFailure(e.into()))
    }

    async fn discard(&self, slot: StagingSlot) {
        if let Err(e) = self.on_staging(move |staging| staging.discard(&slot)).await {
            warn!("Failed to discard staging slot: {}", e);
        }
    }

    async fn release(&self, claim: ClaimedArtifact) {
        if let Err(e) = self.on_staging(move |staging| staging.release(claim)).await {
            warn!("Failed to release claimed artifact: {}", e);
        }
    }

    pub fn refresh_library_gauge(&self) {
        match self.library.count() {
            Ok(count) => metrics::set_library_tracks(count),
            Err(e) => warn!("Failed to count library tracks: {:#}", e),
        }
    }
}
