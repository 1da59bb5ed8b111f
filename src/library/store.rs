//! SQLite store for promoted tracks.

use super::models::{LibraryTrack, NewLibraryTrack};
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{initialize_schema, open_versioned};
use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Durable storage of promoted tracks. Tracks are immutable once created.
pub trait LibraryStore: Send + Sync {
    /// Insert a track and return its stored metadata.
    fn create(&self, track: NewLibraryTrack) -> Result<LibraryTrack>;

    /// All tracks, most recently created first.
    fn list(&self) -> Result<Vec<LibraryTrack>>;

    fn get(&self, id: i64) -> Result<Option<LibraryTrack>>;

    fn get_audio_bytes(&self, id: i64) -> Result<Option<Vec<u8>>>;

    /// Returns false if no track had this id.
    fn delete(&self, id: i64) -> Result<bool>;

    fn count(&self) -> Result<usize>;
}

const TRACK_COLUMNS: &str = "id, title, artist, duration, youtube_url, file_size, created_at";

pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    /// Open or create a library database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = open_versioned(path, LIBRARY_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        initialize_schema(&mut conn, LIBRARY_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<LibraryTrack> {
        Ok(LibraryTrack {
            id: row.get("id")?,
            title: row.get("title")?,
            artist: row.get("artist")?,
            duration: row.get("duration")?,
            source_url: row.get("youtube_url")?,
            file_size: row.get::<_, i64>("file_size")?.max(0) as u64,
            created_at: row.get("created_at")?,
        })
    }
}

impl LibraryStore for SqliteLibraryStore {
    fn create(&self, track: NewLibraryTrack) -> Result<LibraryTrack> {
        if track.audio.is_empty() {
            bail!("Refusing to store a track without audio");
        }
        let created_at = chrono::Utc::now().timestamp();
        let file_size = track.audio.len() as u64;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO songs (title, artist, duration, youtube_url, audio_data, file_size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                track.title,
                track.artist,
                track.duration,
                track.source_url,
                track.audio,
                file_size as i64,
                created_at,
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(LibraryTrack {
            id,
            title: track.title,
            artist: track.artist,
            duration: track.duration,
            source_url: track.source_url,
            file_size,
            created_at,
        })
    }

    fn list(&self) -> Result<Vec<LibraryTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM songs ORDER BY created_at DESC, id DESC",
            TRACK_COLUMNS
        ))?;
        let tracks = stmt
            .query_map([], Self::row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn get(&self, id: i64) -> Result<Option<LibraryTrack>> {
        let conn = self.conn.lock().unwrap();
        let track = conn
            .query_row(
                &format!("SELECT {} FROM songs WHERE id = ?1", TRACK_COLUMNS),
                params![id],
                Self::row_to_track,
            )
            .optional()?;
        Ok(track)
    }

    fn get_audio_bytes(&self, id: i64) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let audio = conn
            .query_row(
                "SELECT audio_data FROM songs WHERE id = ?1",
                params![id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(audio)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM songs WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
