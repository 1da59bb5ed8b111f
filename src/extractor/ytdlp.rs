//! [`Extractor`] backed by the `yt-dlp` command line tool.

use super::{ExtractionFailure, Extractor, ExtractorReport, TARGET_BITRATE_KBPS, UNKNOWN_ARTIST};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const UNAVAILABLE_MARKERS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is unavailable",
];

const AGE_RESTRICTED_MARKERS: &[&str] = &["age-restricted", "confirm your age"];

/// Subset of the info JSON that yt-dlp prints for a single video.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    artist: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
}

impl From<YtDlpInfo> for ExtractorReport {
    fn from(info: YtDlpInfo) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());

        let title = non_empty(info.title).unwrap_or_else(|| "audio".to_string());
        let artist = non_empty(info.artist)
            .or_else(|| non_empty(info.uploader))
            .or_else(|| non_empty(info.channel))
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
        let duration = info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u32)
            .unwrap_or(0);

        ExtractorReport {
            title,
            artist,
            duration,
            thumbnail: non_empty(info.thumbnail),
        }
    }
}

pub struct YtDlpExtractor {
    yt_dlp_path: String,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(yt_dlp_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            timeout,
        }
    }

    /// Check if the yt-dlp binary can be executed.
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn build_command(&self, url: &str, output_stem: &Path) -> Command {
        let output_template = format!("{}.%(ext)s", output_stem.to_string_lossy());
        let mut command = Command::new(&self.yt_dlp_path);
        command
            .args([
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                &format!("{}K", TARGET_BITRATE_KBPS),
                "--no-playlist",
                "--no-progress",
                "--no-warnings",
                // Print the info JSON on stdout but still download.
                "--dump-json",
                "--no-simulate",
                "--output",
                &output_template,
            ])
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(
        &self,
        url: &str,
        output_stem: &Path,
    ) -> Result<ExtractorReport, ExtractionFailure> {
        debug!("Running {} for {}", self.yt_dlp_path, url);

        let output = match tokio::time::timeout(
            self.timeout,
            self.build_command(url, output_stem).output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to run {}: {}", self.yt_dlp_path, e);
                return Err(ExtractionFailure::Generic(format!(
                    "failed to run {}: {}",
                    self.yt_dlp_path, e
                )));
            }
            Err(_) => {
                warn!(
                    "yt-dlp timed out after {}s for {}",
                    self.timeout.as_secs(),
                    url
                );
                return Err(ExtractionFailure::Generic(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp failed for {}: {}", url, stderr.trim());
            return Err(classify_failure(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_info(&stdout)
    }
}

/// Maps yt-dlp's diagnostic output to a failure kind.
pub(crate) fn classify_failure(stderr: &str) -> ExtractionFailure {
    if UNAVAILABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
        return ExtractionFailure::Unavailable;
    }
    let lowercase = stderr.to_lowercase();
    if AGE_RESTRICTED_MARKERS.iter().any(|m| lowercase.contains(m)) {
        return ExtractionFailure::AgeRestricted;
    }
    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("yt-dlp exited with an error");
    ExtractionFailure::Generic(message.to_string())
}

/// yt-dlp prints one JSON object per line; the last non-empty line wins.
fn parse_info(stdout: &str) -> Result<ExtractorReport, ExtractionFailure> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ExtractionFailure::Generic("yt-dlp printed no metadata".to_string()))?;

    let info: YtDlpInfo = serde_json::from_str(line)
        .map_err(|e| ExtractionFailure::Generic(format!("invalid yt-dlp metadata: {}", e)))?;
    Ok(info.into())
}
