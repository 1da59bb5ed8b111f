//! Syntactic checks applied at the boundary, before anything touches the
//! network or the filesystem.

use lazy_static::lazy_static;
use regex::Regex;

/// Maximum number of characters kept from a title when building a filename.
pub const MAX_SAFE_TITLE_CHARS: usize = 50;

lazy_static! {
    static ref VIDEO_URL_REGEX: Regex = Regex::new(
        r"^(?:https?://)?(?:(?:www|m)\.)?(?:youtube\.com|youtu\.be|youtube-nocookie\.com)/(?:watch\?v=|embed/|v/|shorts/|\S*?[?&]v=)?([A-Za-z0-9_-]{11})(?:[&?#/]\S*)?$"
    )
    .unwrap();
    static ref STAGED_ID_REGEX: Regex = Regex::new(r"^[a-f0-9-]+$").unwrap();
    static ref UNSAFE_TITLE_CHARS_REGEX: Regex = Regex::new(r"[^\w\s-]").unwrap();
}

/// Returns true if `url` has the shape of a supported video link.
pub fn is_supported_video_url(url: &str) -> bool {
    VIDEO_URL_REGEX.is_match(url)
}

/// Extracts the 11-character video id from a supported link.
pub fn video_id(url: &str) -> Option<&str> {
    VIDEO_URL_REGEX
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Staged ids are lowercase hex and hyphens only, which rules out any path
/// separator or `..` component.
pub fn is_valid_staged_id(id: &str) -> bool {
    STAGED_ID_REGEX.is_match(id)
}

/// Strips everything but word characters, whitespace and hyphens, then
/// truncates to [`MAX_SAFE_TITLE_CHARS`].
pub fn sanitize_title(title: &str) -> String {
    UNSAFE_TITLE_CHARS_REGEX
        .replace_all(title, "")
        .chars()
        .take(MAX_SAFE_TITLE_CHARS)
        .collect()
}

pub fn download_filename(title: &str) -> String {
    let safe_title = sanitize_title(title);
    if safe_title.trim().is_empty() {
        "audio.mp3".to_string()
    } else {
        format!("{}.mp3", safe_title)
    }
}
