//! Audio streaming functionality

use super::responses::Failure;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::path::Path;
use tokio::{fs::File, io::BufReader};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start_inclusive: Option<u64>,
    end_inclusive: Option<u64>,
}

impl ByteRange {
    pub fn new(start_inclusive: Option<u64>, end_inclusive: Option<u64>) -> ByteRange {
        ByteRange {
            start_inclusive,
            end_inclusive,
        }
    }

    fn parse<S: AsRef<str>>(s: S) -> Option<ByteRange> {
        let v = s.as_ref().trim();
        let v = v.strip_prefix("bytes=")?;

        let parts: Vec<&str> = v.split('-').collect();
        if parts.len() != 2 {
            return None;
        }

        Some(ByteRange {
            start_inclusive: parts[0].trim().parse::<u64>().ok(),
            end_inclusive: parts[1].trim().parse::<u64>().ok(),
        })
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<ByteRange> {
        headers
            .get(header::RANGE)
            .and_then(|x| x.to_str().ok())
            .and_then(ByteRange::parse)
    }

    /// Resolves the range against a body of `length` bytes, returning the
    /// inclusive `(start, end)` to serve, or `None` if it cannot be satisfied.
    /// `bytes=-n` is a suffix range covering the last `n` bytes.
    fn resolve(&self, length: u64) -> Option<(u64, u64)> {
        if length == 0 {
            return None;
        }
        let last = length - 1;
        match (self.start_inclusive, self.end_inclusive) {
            (None, None) => Some((0, last)),
            (Some(start), None) if start <= last => Some((start, last)),
            (None, Some(suffix)) if suffix > 0 => Some((length.saturating_sub(suffix), last)),
            (Some(start), Some(end)) if start <= end && start <= last => {
                Some((start, end.min(last)))
            }
            _ => None,
        }
    }
}

/// Serves an in-memory audio body, honoring a single `Range` request.
pub fn audio_response(audio: Vec<u8>, byte_range: Option<ByteRange>) -> Response {
    let length = audio.len() as u64;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(AUDIO_CONTENT_TYPE),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let range = match byte_range {
        None
        | Some(ByteRange {
            start_inclusive: None,
            end_inclusive: None,
        }) => None,
        Some(range) => match range.resolve(length) {
            Some(bounds) => Some(bounds),
            None => {
                debug!("Unsatisfiable range {:?} for {} bytes", range, length);
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", length)) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                return (StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response();
            }
        },
    };

    let (status, body) = match range {
        None => (StatusCode::OK, audio),
        Some((start, end)) => {
            if let Ok(value) =
                HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, length))
            {
                headers.insert(header::CONTENT_RANGE, value);
            }
            (
                StatusCode::PARTIAL_CONTENT,
                audio[start as usize..=end as usize].to_vec(),
            )
        }
    };
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    (status, headers, body).into_response()
}

/// Builds a `Content-Disposition` value. Non-ASCII names get an ASCII
/// fallback plus a UTF-8 `filename*` parameter.
fn content_disposition(filename: &str) -> Option<HeaderValue> {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let value = if fallback == filename {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    };
    HeaderValue::from_str(&value).ok()
}

/// Streams a file from disk as a download named `filename`.
pub async fn attachment_response(path: &Path, filename: &str) -> Response {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            // The sweep may have taken it between lookup and open.
            warn!("Failed to open {:?} for download: {}", path, e);
            let body = Failure {
                success: false,
                error: crate::pipeline::STAGED_NOT_FOUND_MESSAGE.to_string(),
            };
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }
    };
    let file_length = match file.metadata().await {
        Ok(m) => m.len(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(AUDIO_CONTENT_TYPE),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_length));
    if let Some(value) = content_disposition(filename) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let file_reader = BufReader::with_capacity(4096 * 16, file);
    let stream = ReaderStream::with_capacity(file_reader, 4096 * 16);

    (StatusCode::OK, headers, Body::from_stream(stream)).into_response()
}
