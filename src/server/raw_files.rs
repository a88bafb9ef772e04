//! Raw file serving for `/data/` and `/assets/`, with single byte ranges.

use super::ServerConfig;
use crate::augment::safe_relative_path;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::Path as FsPath;

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

const STREAM_BUFFER_SIZE: usize = 4096 * 16;

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
        let v = s.as_ref().strip_prefix("bytes=")?;
        let parts: Vec<&str> = v.split('-').collect();
        if parts.len() != 2 {
            return None;
        }

        Some(ByteRange {
            start_inclusive: parts[0].trim().parse::<u64>().ok(),
            end_inclusive: parts[1].trim().parse::<u64>().ok(),
        })
    }

    fn from_headers(headers: &HeaderMap) -> Option<ByteRange> {
        headers
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(ByteRange::parse)
    }

    fn is_open(&self) -> bool {
        self.start_inclusive.is_none() && self.end_inclusive.is_none()
    }

    /// Inclusive bounds inside a file of `len` bytes, `None` if unsatisfiable.
    fn bounds(&self, len: u64) -> Option<(u64, u64)> {
        if len == 0 {
            return None;
        }
        match (self.start_inclusive, self.end_inclusive) {
            (Some(start), end) => {
                let end = end.unwrap_or(len - 1).min(len - 1);
                (start <= end).then_some((start, end))
            }
            // Suffix range: the last `n` bytes.
            (None, Some(suffix)) => (suffix > 0).then(|| (len - suffix.min(len), len - 1)),
            (None, None) => Some((0, len - 1)),
        }
    }
}

pub fn content_type_for(path: &FsPath) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn climbs_out(relative: &str) -> bool {
    relative.starts_with('/')
        || relative.starts_with('\\')
        || relative.split(['/', '\\']).any(|part| part == "..")
}

/// Serves `relative` from inside `root`.
///
/// Paths that climb out of `root`, lexically or through a symlink, are a
/// client error. Anything that does not name a regular file is not found.
pub async fn serve_file(root: &FsPath, relative: &str, byte_range: Option<ByteRange>) -> Response {
    let relative_path = match safe_relative_path(relative) {
        Some(path) => path,
        None if climbs_out(relative) => {
            debug!("Rejected raw file path {:?}", relative);
            return StatusCode::BAD_REQUEST.into_response();
        }
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    let root = match tokio::fs::canonicalize(root).await {
        Ok(root) => root,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let target = match tokio::fs::canonicalize(root.join(&relative_path)).await {
        Ok(target) => target,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    if !target.starts_with(&root) {
        debug!("Rejected raw file {:?} resolving outside {:?}", relative, root);
        return StatusCode::BAD_REQUEST.into_response();
    }

    let mut file = match File::open(&target).await {
        Ok(file) => file,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let metadata = match file.metadata().await {
        Ok(metadata) => metadata,
        Err(err) => {
            error!("Failed to stat {:?}: {}", target, err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !metadata.is_file() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let file_length = metadata.len();

    let (status_code, start, chunk_size) = match byte_range {
        None => (StatusCode::OK, 0, file_length),
        Some(range) if range.is_open() => (StatusCode::OK, 0, file_length),
        Some(range) => match range.bounds(file_length) {
            Some((start, end)) => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
            None => {
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(header::CONTENT_RANGE, format!("bytes */{}", file_length))],
                )
                    .into_response()
            }
        },
    };

    if start > 0 && file.seek(SeekFrom::Start(start)).await.is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    debug!("Serving {:?} ({} of {} bytes)", target, chunk_size, file_length);

    let file_reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, file.take(chunk_size));
    let stream = ReaderStream::with_capacity(file_reader, STREAM_BUFFER_SIZE);

    let mut response = Response::builder()
        .status(status_code)
        .header(header::CONTENT_TYPE, content_type_for(&target))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, chunk_size);
    if status_code == StatusCode::PARTIAL_CONTENT {
        response = response.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, start + chunk_size - 1, file_length),
        );
    }

    response
        .body(Body::from_stream(stream))
        .unwrap_or_else(|err| {
            error!("Failed to build file response: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

pub async fn serve_data_file(
    State(config): State<ServerConfig>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Response {
    serve_file(&config.data_dir, &path, ByteRange::from_headers(&headers)).await
}

pub async fn serve_asset_file(
    State(config): State<ServerConfig>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Response {
    serve_file(&config.assets_dir, &path, ByteRange::from_headers(&headers)).await
}
