//! Shared constants for end-to-end tests

// ============================================================================
// Video URLs understood by the fixture extractor
// ============================================================================

/// A video that converts successfully
pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Same video, short link form
pub const SHORT_VIDEO_URL: &str = "https://youtu.be/dQw4w9WgXcQ";

/// A video reported as "Test Song", 180 seconds long
pub const TEST_SONG_URL: &str = "https://youtube.com/watch?v=AAAAAAAAAAA";

pub const TEST_SONG_TITLE: &str = "Test Song";

pub const TEST_SONG_DURATION: u32 = 180;

/// A video the extractor reports as unavailable
pub const UNAVAILABLE_VIDEO_URL: &str = "https://www.youtube.com/watch?v=unavailable";

/// A video the extractor reports as age-restricted
pub const AGE_RESTRICTED_VIDEO_URL: &str = "https://www.youtube.com/watch?v=agerestrict";

/// A video whose extraction "succeeds" without leaving a file behind
pub const NO_OUTPUT_VIDEO_URL: &str = "https://www.youtube.com/watch?v=nooutput000";

/// Not a supported video link
pub const NOT_A_VIDEO_URL: &str = "https://vimeo.com/123456";

// ============================================================================
// Metadata reported by the fixture extractor
// ============================================================================

pub const VIDEO_TITLE: &str = "Never Gonna Give You Up (Official Video)";

pub const VIDEO_SAFE_TITLE: &str = "Never Gonna Give You Up Official Video";

pub const VIDEO_ARTIST: &str = "Rick Astley";

pub const VIDEO_DURATION: u32 = 213;

/// Size of the audio file the fixture extractor writes
pub const FIXTURE_AUDIO_SIZE: usize = 64 * 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the server to accept requests
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval while waiting for the server
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Staging TTL used by the test server
pub const STAGING_TTL_SECS: u64 = 3600;
