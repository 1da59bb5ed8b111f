use serde::Serialize;

/// A track to be inserted into the library.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLibraryTrack {
    pub title: String,
    pub artist: String,
    /// Seconds.
    pub duration: u32,
    pub source_url: Option<String>,
    pub audio: Vec<u8>,
}

/// Metadata of a stored track. The audio payload is only loaded through
/// [`super::LibraryStore::get_audio_bytes`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryTrack {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub duration: u32,
    pub source_url: Option<String>,
    pub file_size: u64,
    /// Unix seconds.
    pub created_at: i64,
}
