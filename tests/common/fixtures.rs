//! Test fixtures
//!
//! A scripted extractor standing in for yt-dlp. Its behavior is keyed on
//! the video id so tests pick an outcome through the URL they submit.

use super::constants::*;
use async_trait::async_trait;
use musicbox_server::extractor::{ExtractionFailure, Extractor, ExtractorReport};
use musicbox_server::validation::video_id;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Deterministic audio bytes written for every successful extraction.
pub fn fixture_audio() -> Vec<u8> {
    (0..FIXTURE_AUDIO_SIZE).map(|i| (i % 251) as u8).collect()
}

pub struct FixtureExtractor {
    calls: Arc<AtomicUsize>,
}

impl FixtureExtractor {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Extractor for FixtureExtractor {
    async fn extract(
        &self,
        url: &str,
        output_stem: &Path,
    ) -> Result<ExtractorReport, ExtractionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let id = video_id(url);
        match id {
            Some("unavailable") => return Err(ExtractionFailure::Unavailable),
            Some("agerestrict") => return Err(ExtractionFailure::AgeRestricted),
            Some("nooutput000") => {}
            _ => {
                // Written in a non-mp3 container to exercise normalization
                let path = format!("{}.m4a", output_stem.display());
                tokio::fs::write(&path, fixture_audio())
                    .await
                    .map_err(|e| ExtractionFailure::Generic(e.to_string()))?;
            }
        }

        let (title, duration) = match id {
            Some("AAAAAAAAAAA") => (TEST_SONG_TITLE, TEST_SONG_DURATION),
            _ => (VIDEO_TITLE, VIDEO_DURATION),
        };
        Ok(ExtractorReport {
            title: title.to_string(),
            artist: VIDEO_ARTIST.to_string(),
            duration,
            thumbnail: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".to_string()),
        })
    }
}
