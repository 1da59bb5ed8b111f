//! Ephemeral on-disk staging of converted audio.
//!
//! Layout under the staging root:
//!
//! ```text
//! <root>/<id>.mp3          staged audio, only visible once normalized
//! <root>/<id>.json         metadata sidecar, written before the audio rename
//! <root>/incoming/         extraction work area
//! <root>/claimed/<id>.mp3  artifacts held by an in-flight promotion
//! ```
//!
//! Everything older than the TTL is removed by [`StagingStore::sweep`],
//! wherever it lives under the root. Lookups and claims treat an artifact
//! older than the TTL as gone even if no sweep has run yet.

use crate::extractor::ExtractedAudio;
use crate::validation::is_valid_staged_id;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const INCOMING_DIR: &str = "incoming";
const CLAIMED_DIR: &str = "claimed";
const AUDIO_EXTENSION: &str = "mp3";
const SIDECAR_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("invalid staged id")]
    InvalidId,

    #[error("staged artifact not found or expired")]
    NotFound,

    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("staging metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Metadata recorded next to a staged audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedMetadata {
    pub title: String,
    pub artist: String,
    pub duration: u32,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedArtifact {
    pub id: String,
    pub path: PathBuf,
    pub file_size: u64,
    pub metadata: StagedMetadata,
}

/// A freshly reserved id plus the stem the Extractor should write to.
#[derive(Debug, Clone)]
pub struct StagingSlot {
    id: String,
    output_stem: PathBuf,
}

impl StagingSlot {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn output_stem(&self) -> &Path {
        &self.output_stem
    }
}

/// A staged artifact moved out of the visible set by [`StagingStore::claim`].
/// Must be handed back through either `release` or `complete`.
#[derive(Debug)]
pub struct ClaimedArtifact {
    artifact: StagedArtifact,
    /// Modification time before the claim refreshed it.
    staged_at: SystemTime,
}

impl ClaimedArtifact {
    pub fn artifact(&self) -> &StagedArtifact {
        &self.artifact
    }
}

pub struct StagingStore {
    root: PathBuf,
    ttl: Duration,
}

impl StagingStore {
    /// Opens the staging directory, creating it and its subdirectories if needed.
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Result<Self, StagingError> {
        let root = root.into();
        std::fs::create_dir_all(root.join(INCOMING_DIR))?;
        std::fs::create_dir_all(root.join(CLAIMED_DIR))?;
        Ok(Self { root, ttl })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn audio_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, AUDIO_EXTENSION))
    }

    fn sidecar_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, SIDECAR_EXTENSION))
    }

    fn claimed_path(&self, id: &str) -> PathBuf {
        self.root
            .join(CLAIMED_DIR)
            .join(format!("{}.{}", id, AUDIO_EXTENSION))
    }

    /// Reserves a fresh id. Ids are random v4 UUIDs and never reused.
    pub fn new_slot(&self) -> StagingSlot {
        let id = uuid::Uuid::new_v4().to_string();
        let output_stem = self.root.join(INCOMING_DIR).join(&id);
        StagingSlot { id, output_stem }
    }

    /// Makes the extracted audio visible under the slot's id.
    pub fn put(
        &self,
        slot: &StagingSlot,
        audio: &ExtractedAudio,
        source_url: &str,
    ) -> Result<StagedArtifact, StagingError> {
        let metadata = StagedMetadata {
            title: audio.title.clone(),
            artist: audio.artist.clone(),
            duration: audio.duration,
            source_url: source_url.to_string(),
            thumbnail: audio.thumbnail.clone(),
            created_at: unix_now(),
        };

        let sidecar_path = self.sidecar_path(&slot.id);
        std::fs::write(&sidecar_path, serde_json::to_vec(&metadata)?)?;

        let path = self.audio_path(&slot.id);
        if let Err(e) = std::fs::rename(&audio.local_path, &path) {
            let _ = std::fs::remove_file(&sidecar_path);
            return Err(e.into());
        }
        let file_size = std::fs::metadata(&path)?.len();

        debug!("Staged {} ({} bytes)", slot.id, file_size);
        Ok(StagedArtifact {
            id: slot.id.clone(),
            path,
            file_size,
            metadata,
        })
    }

    /// Removes whatever an abandoned extraction left in the work area.
    pub fn discard(&self, slot: &StagingSlot) {
        let prefix = format!("{}.", slot.id);
        let entries = match std::fs::read_dir(self.root.join(INCOMING_DIR)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list incoming staging directory: {}", e);
                return;
            }
        };
        for entry in entries.flatten() {
            let matches = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&prefix))
                .unwrap_or(false);
            if matches {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!("Failed to remove {:?}: {}", entry.path(), e);
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<StagedArtifact, StagingError> {
        self.get_at(id, SystemTime::now())
    }

    /// Looks up `id` as of `now`. Artifacts past the TTL are `NotFound`.
    pub fn get_at(&self, id: &str, now: SystemTime) -> Result<StagedArtifact, StagingError> {
        if !is_valid_staged_id(id) {
            return Err(StagingError::InvalidId);
        }
        let path = self.audio_path(id);
        let file_metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(StagingError::NotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StagingError::NotFound),
            Err(e) => return Err(e.into()),
        };
        if self.is_expired(file_metadata.modified()?, now) {
            debug!("Staged artifact {} has expired", id);
            return Err(StagingError::NotFound);
        }
        let metadata = self.read_sidecar(id, &file_metadata)?;

        Ok(StagedArtifact {
            id: id.to_string(),
            path,
            file_size: file_metadata.len(),
            metadata,
        })
    }

    /// Atomically takes `id` out of the visible set. Of several concurrent
    /// claims for the same id exactly one succeeds; the others see `NotFound`.
    pub fn claim(&self, id: &str) -> Result<ClaimedArtifact, StagingError> {
        self.claim_at(id, SystemTime::now())
    }

    /// Claims `id` as of `now`. An expired artifact is put back and reported
    /// as `NotFound`. A successful claim stamps the claimed file with `now`,
    /// so the sweep leaves it alone while the promotion is in flight.
    pub fn claim_at(&self, id: &str, now: SystemTime) -> Result<ClaimedArtifact, StagingError> {
        if !is_valid_staged_id(id) {
            return Err(StagingError::InvalidId);
        }
        let claimed_path = self.claimed_path(id);
        match std::fs::rename(self.audio_path(id), &claimed_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StagingError::NotFound),
            Err(e) => return Err(e.into()),
        }

        let (file_metadata, staged_at) =
            match std::fs::metadata(&claimed_path).and_then(|m| m.modified().map(|t| (m, t))) {
                Ok(pair) => pair,
                Err(e) => {
                    self.restore(id);
                    return Err(e.into());
                }
            };
        if self.is_expired(staged_at, now) {
            debug!("Refusing to claim expired staged artifact {}", id);
            self.restore(id);
            return Err(StagingError::NotFound);
        }
        let metadata = match self.read_sidecar(id, &file_metadata) {
            Ok(m) => m,
            Err(e) => {
                self.restore(id);
                return Err(e);
            }
        };
        if let Err(e) = set_modified(&claimed_path, now) {
            warn!("Failed to refresh claimed artifact {}: {}", id, e);
            self.restore(id);
            return Err(e.into());
        }

        debug!("Claimed staged artifact {}", id);
        Ok(ClaimedArtifact {
            artifact: StagedArtifact {
                id: id.to_string(),
                path: claimed_path,
                file_size: file_metadata.len(),
                metadata,
            },
            staged_at,
        })
    }

    /// Puts a claimed artifact back so that promotion can be retried. The
    /// artifact keeps the age it had before the claim.
    pub fn release(&self, claim: ClaimedArtifact) {
        let id = &claim.artifact.id;
        if let Err(e) = set_modified(&claim.artifact.path, claim.staged_at) {
            warn!("Failed to reset age of claimed artifact {}: {}", id, e);
        }
        self.restore(id);
    }

    fn restore(&self, id: &str) {
        if let Err(e) = std::fs::rename(self.claimed_path(id), self.audio_path(id)) {
            warn!("Failed to release claimed artifact {}: {}", id, e);
        }
    }

    /// Deletes a claimed artifact and its sidecar after a successful promotion.
    /// Failures are left for the sweep.
    pub fn complete(&self, claim: ClaimedArtifact) {
        let id = &claim.artifact.id;
        for path in [&claim.artifact.path, &self.sidecar_path(id)] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            }
        }
    }

    fn read_sidecar(
        &self,
        id: &str,
        audio_metadata: &std::fs::Metadata,
    ) -> Result<StagedMetadata, StagingError> {
        match std::fs::read(self.sidecar_path(id)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            // The sidecar is slightly older than the audio, so a sweep may take
            // it first.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StagedMetadata {
                title: "audio".to_string(),
                artist: crate::extractor::UNKNOWN_ARTIST.to_string(),
                duration: 0,
                source_url: String::new(),
                thumbnail: None,
                created_at: audio_metadata
                    .modified()
                    .ok()
                    .map(unix_seconds)
                    .unwrap_or_else(unix_now),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Strictly older than the TTL. Timestamps in the future are never expired.
    fn is_expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        now.duration_since(modified)
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(SystemTime::now())
    }

    /// Deletes every regular file under the staging root whose age at `now`
    /// is strictly greater than the TTL. Returns the number of deleted files.
    pub fn sweep_at(&self, now: SystemTime) -> usize {
        let mut deleted = 0;
        let mut errors = 0;

        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(2) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to read staging entry: {}", e);
                    errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let modified = match entry.metadata().map(|m| m.modified()) {
                Ok(Ok(t)) => t,
                Ok(Err(e)) => {
                    warn!("Failed to get modified time for {:?}: {}", entry.path(), e);
                    errors += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to get metadata for {:?}: {}", entry.path(), e);
                    errors += 1;
                    continue;
                }
            };
            if !self.is_expired(modified, now) {
                continue;
            }
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);

            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Swept {:?} (age {}s)", entry.path(), age.as_secs());
                    deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to sweep {:?}: {}", entry.path(), e);
                    errors += 1;
                }
            }
        }

        if deleted > 0 || errors > 0 {
            info!(
                "Staging sweep removed {} files ({} errors)",
                deleted, errors
            );
        }
        deleted
    }
}

fn set_modified(path: &Path, time: SystemTime) -> std::io::Result<()> {
    std::fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(time)
}

fn unix_seconds(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn unix_now() -> i64 {
    unix_seconds(SystemTime::now())
}
