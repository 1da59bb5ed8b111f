//! Extraction of an audio track from a remote video.
//!
//! The heavy lifting (fetching, format selection, transcoding) belongs to an
//! external [`Extractor`]. [`ExtractionInvoker`] wraps it and normalizes
//! whatever it left on disk into a single `.mp3` file.

mod ytdlp;

pub use ytdlp::YtDlpExtractor;

use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Target bitrate requested from the Extractor, in kbps.
pub const TARGET_BITRATE_KBPS: u32 = 192;

/// Container extensions the Extractor may produce, in probe order.
/// The first one is the normalized suffix.
pub const KNOWN_EXTENSIONS: &[&str] = &["mp3", "webm", "m4a", "opus", "ogg"];

pub const NO_OUTPUT_MESSAGE: &str = "conversion produced no output";

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Why an extraction did not produce audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    #[error("video is unavailable or private")]
    Unavailable,

    #[error("video is age-restricted")]
    AgeRestricted,

    #[error("{0}")]
    Generic(String),
}

impl ExtractionFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionFailure::Unavailable => "unavailable",
            ExtractionFailure::AgeRestricted => "age_restricted",
            ExtractionFailure::Generic(_) => "generic",
        }
    }

    /// Message suitable for showing to the person who submitted the URL.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExtractionFailure::Unavailable => "Video is unavailable or private",
            ExtractionFailure::AgeRestricted => "Video is age-restricted",
            ExtractionFailure::Generic(msg) if msg == NO_OUTPUT_MESSAGE => {
                "Failed to convert audio"
            }
            ExtractionFailure::Generic(_) => "Failed to download video. Please check the URL.",
        }
    }
}

/// Metadata reported by an [`Extractor`] after a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorReport {
    pub title: String,
    pub artist: String,
    pub duration: u32,
    pub thumbnail: Option<String>,
}

/// An external capability that downloads the best available audio stream of
/// `url` and transcodes it, writing the result as `<output_stem>.<ext>`.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        url: &str,
        output_stem: &Path,
    ) -> Result<ExtractorReport, ExtractionFailure>;
}

/// A successful extraction: the normalized audio file plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedAudio {
    pub local_path: PathBuf,
    pub title: String,
    pub artist: String,
    pub duration: u32,
    pub thumbnail: Option<String>,
}

pub type ExtractionOutcome = Result<ExtractedAudio, ExtractionFailure>;

/// Calls the [`Extractor`] exactly once and normalizes its output.
#[derive(Clone)]
pub struct ExtractionInvoker {
    extractor: Arc<dyn Extractor>,
}

impl ExtractionInvoker {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }

    pub async fn extract(&self, url: &str, output_stem: &Path) -> ExtractionOutcome {
        debug!("Extracting audio from {} into {:?}", url, output_stem);
        let report = self.extractor.extract(url, output_stem).await?;

        let local_path = normalize_output(output_stem).await?;

        Ok(ExtractedAudio {
            local_path,
            title: report.title,
            artist: report.artist,
            duration: report.duration,
            thumbnail: report.thumbnail,
        })
    }
}

fn path_with_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut s: OsString = stem.as_os_str().to_owned();
    s.push(".");
    s.push(extension);
    PathBuf::from(s)
}

/// Finds the Extractor's output under any known extension and makes sure it
/// ends up at `<stem>.mp3`.
async fn normalize_output(stem: &Path) -> Result<PathBuf, ExtractionFailure> {
    let target = path_with_extension(stem, KNOWN_EXTENSIONS[0]);
    if is_file(&target).await {
        return Ok(target);
    }

    for extension in &KNOWN_EXTENSIONS[1..] {
        let candidate = path_with_extension(stem, extension);
        if !is_file(&candidate).await {
            continue;
        }
        debug!("Renaming extractor output {:?} to {:?}", candidate, target);
        return match tokio::fs::rename(&candidate, &target).await {
            Ok(()) => Ok(target),
            Err(e) => {
                warn!("Failed to normalize extractor output {:?}: {}", candidate, e);
                Err(ExtractionFailure::Generic(format!(
                    "failed to normalize output: {}",
                    e
                )))
            }
        };
    }

    Err(ExtractionFailure::Generic(NO_OUTPUT_MESSAGE.to_string()))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
