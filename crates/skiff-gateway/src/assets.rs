// SPDX-License-Identifier: MIT
//
// Static asset serving from the bundle's public directory.
//
// Asset requests bypass the execution queue entirely: a CSS file must not
// wait behind a slow controller. Large files are handed to the webview as a
// chunked stream instead of one allocation.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use skiff_core::error::Result;
use skiff_core::HeaderMap;
use tracing::{debug, warn};

/// Body of a served asset.
#[derive(Debug)]
pub enum AssetBody {
    /// Whole file, loaded eagerly.
    Full(Vec<u8>),
    /// Open handle to be drained chunk by chunk.
    Stream(AssetStream),
}

/// An asset resolved and ready to send.
#[derive(Debug)]
pub struct ServedAsset {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: AssetBody,
}

/// Chunked reader over an open file region.
#[derive(Debug)]
pub struct AssetStream {
    file: File,
    remaining: u64,
    chunk_size: usize,
}

impl AssetStream {
    /// Next chunk, or None when the region is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let want = self.chunk_size.min(self.remaining as usize);
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        self.remaining -= filled as u64;
        if filled == 0 {
            return Ok(None);
        }
        Ok(Some(buf))
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

/// Byte range requested via the `Range` header.
#[derive(Debug, PartialEq, Eq)]
struct ByteRange {
    start: u64,
    /// Inclusive.
    end: u64,
}

/// Serve `asset_path` (relative, already stripped of the URL prefix) from
/// `public_root`.
///
/// Returns None when the file does not exist, so the caller can fall through
/// to a 404. `range` is the raw `Range` header value if the request carried
/// one; an unsatisfiable range produces a 416 with the canonical
/// `Content-Range: bytes */len` marker.
pub fn serve(
    public_root: &Path,
    asset_path: &str,
    range: Option<&str>,
    stream_threshold: u64,
    chunk_size: usize,
) -> Result<Option<ServedAsset>> {
    let Some(resolved) = resolve(public_root, asset_path) else {
        warn!(path = asset_path, "asset path escapes public root, refusing");
        return Ok(None);
    };

    let Ok(metadata) = std::fs::metadata(&resolved) else {
        return Ok(None);
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    let total_len = metadata.len();
    let mime = mime_for(&resolved);

    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", mime);
    headers.insert("Accept-Ranges", "bytes");

    if let Some(range) = range {
        return match parse_range(range, total_len) {
            Some(r) => {
                let span = r.end - r.start + 1;
                headers.insert("Content-Length", span.to_string());
                headers.insert(
                    "Content-Range",
                    format!("bytes {}-{}/{}", r.start, r.end, total_len),
                );
                debug!(path = asset_path, start = r.start, end = r.end, "serving byte range");
                let body = read_region(&resolved, r.start, span, stream_threshold, chunk_size)?;
                Ok(Some(ServedAsset {
                    status: 206,
                    headers,
                    body,
                }))
            }
            None => {
                let mut headers = HeaderMap::new();
                headers.insert("Content-Range", format!("bytes */{total_len}"));
                Ok(Some(ServedAsset {
                    status: 416,
                    headers,
                    body: AssetBody::Full(Vec::new()),
                }))
            }
        };
    }

    headers.insert("Content-Length", total_len.to_string());
    let body = read_region(&resolved, 0, total_len, stream_threshold, chunk_size)?;
    Ok(Some(ServedAsset {
        status: 200,
        headers,
        body,
    }))
}

/// Read `span` bytes at `start`, eagerly for small regions, as a stream when
/// the region crosses the threshold.
fn read_region(
    path: &Path,
    start: u64,
    span: u64,
    stream_threshold: u64,
    chunk_size: usize,
) -> Result<AssetBody> {
    let mut file = File::open(path)?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))?;
    }
    if span > stream_threshold {
        return Ok(AssetBody::Stream(AssetStream {
            file,
            remaining: span,
            chunk_size,
        }));
    }
    let mut buf = vec![0u8; span as usize];
    file.read_exact(&mut buf)?;
    Ok(AssetBody::Full(buf))
}

/// Join and normalize, rejecting any path that would leave the root.
fn resolve(public_root: &Path, asset_path: &str) -> Option<PathBuf> {
    let relative = Path::new(asset_path.trim_start_matches('/'));
    let mut out = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        return None;
    }
    Some(public_root.join(out))
}

/// Parse a single-range `Range` header against a file of `len` bytes.
/// Multi-range requests use only the first range, matching what the
/// webview's media loader actually sends.
fn parse_range(header: &str, len: u64) -> Option<ByteRange> {
    if len == 0 {
        return None;
    }
    let spec = header.strip_prefix("bytes=")?;
    let first = spec.split(',').next()?.trim();
    let (start_s, end_s) = first.split_once('-')?;

    if start_s.is_empty() {
        // Suffix form: last N bytes.
        let suffix: u64 = end_s.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        let span = suffix.min(len);
        return Some(ByteRange {
            start: len - span,
            end: len - 1,
        });
    }

    let start: u64 = start_s.parse().ok()?;
    if start >= len {
        return None;
    }
    let end = if end_s.is_empty() {
        len - 1
    } else {
        end_s.parse::<u64>().ok()?.min(len - 1)
    };
    if end < start {
        return None;
    }
    Some(ByteRange { start, end })
}

/// Content type from the file extension. Unknown extensions fall back to
/// octet-stream, which the webview downloads rather than renders.
fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("wasm") => "application/wasm",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: u64 = 10_000_000;
    const CHUNK: usize = 1024 * 1024;

    fn fixture(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    fn full_body(asset: ServedAsset) -> Vec<u8> {
        match asset.body {
            AssetBody::Full(bytes) => bytes,
            AssetBody::Stream(_) => panic!("expected eager body"),
        }
    }

    #[test]
    fn serves_whole_file_with_mime_and_length() {
        let dir = fixture(&[("app.css", b"body{}" as &[u8])]);
        let asset = serve(dir.path(), "app.css", None, THRESHOLD, CHUNK)
            .unwrap()
            .unwrap();
        assert_eq!(asset.status, 200);
        assert_eq!(asset.headers.get("Content-Type"), Some("text/css; charset=utf-8"));
        assert_eq!(asset.headers.get("Content-Length"), Some("6"));
        assert_eq!(asset.headers.get("Accept-Ranges"), Some("bytes"));
        assert_eq!(full_body(asset), b"body{}");
    }

    #[test]
    fn missing_file_is_none() {
        let dir = fixture(&[]);
        assert!(serve(dir.path(), "nope.js", None, THRESHOLD, CHUNK)
            .unwrap()
            .is_none());
    }

    #[test]
    fn traversal_is_refused() {
        let dir = fixture(&[("ok.txt", b"fine" as &[u8])]);
        assert!(serve(dir.path(), "../secret", None, THRESHOLD, CHUNK)
            .unwrap()
            .is_none());
        assert!(serve(dir.path(), "a/../../secret", None, THRESHOLD, CHUNK)
            .unwrap()
            .is_none());
    }

    #[test]
    fn nested_paths_resolve() {
        let dir = fixture(&[("img/logo.png", b"\x89PNG" as &[u8])]);
        let asset = serve(dir.path(), "img/logo.png", None, THRESHOLD, CHUNK)
            .unwrap()
            .unwrap();
        assert_eq!(asset.headers.get("Content-Type"), Some("image/png"));
    }

    #[test]
    fn bounded_range_gets_206_with_content_range() {
        let data: Vec<u8> = (0..=255u8).collect();
        let dir = fixture(&[("blob.bin", data.as_slice())]);
        let asset = serve(dir.path(), "blob.bin", Some("bytes=100-199"), THRESHOLD, CHUNK)
            .unwrap()
            .unwrap();
        assert_eq!(asset.status, 206);
        assert_eq!(asset.headers.get("Content-Range"), Some("bytes 100-199/256"));
        assert_eq!(asset.headers.get("Content-Length"), Some("100"));
        let body = full_body(asset);
        assert_eq!(body.len(), 100);
        assert_eq!(body[0], 100);
        assert_eq!(body[99], 199);
    }

    #[test]
    fn open_ended_range_runs_to_eof() {
        let dir = fixture(&[("blob.bin", b"0123456789" as &[u8])]);
        let asset = serve(dir.path(), "blob.bin", Some("bytes=4-"), THRESHOLD, CHUNK)
            .unwrap()
            .unwrap();
        assert_eq!(asset.status, 206);
        assert_eq!(asset.headers.get("Content-Range"), Some("bytes 4-9/10"));
        assert_eq!(full_body(asset), b"456789");
    }

    #[test]
    fn suffix_range_serves_tail() {
        let dir = fixture(&[("blob.bin", b"0123456789" as &[u8])]);
        let asset = serve(dir.path(), "blob.bin", Some("bytes=-3"), THRESHOLD, CHUNK)
            .unwrap()
            .unwrap();
        assert_eq!(asset.headers.get("Content-Range"), Some("bytes 7-9/10"));
        assert_eq!(full_body(asset), b"789");
    }

    #[test]
    fn range_end_is_clamped_to_file_length() {
        let dir = fixture(&[("blob.bin", b"0123456789" as &[u8])]);
        let asset = serve(dir.path(), "blob.bin", Some("bytes=8-500"), THRESHOLD, CHUNK)
            .unwrap()
            .unwrap();
        assert_eq!(asset.headers.get("Content-Range"), Some("bytes 8-9/10"));
    }

    #[test]
    fn unsatisfiable_range_gets_416() {
        let dir = fixture(&[("blob.bin", b"0123456789" as &[u8])]);
        let asset = serve(dir.path(), "blob.bin", Some("bytes=50-60"), THRESHOLD, CHUNK)
            .unwrap()
            .unwrap();
        assert_eq!(asset.status, 416);
        assert_eq!(asset.headers.get("Content-Range"), Some("bytes */10"));
    }

    #[test]
    fn files_above_threshold_stream_in_chunks() {
        let data = vec![7u8; 100];
        let dir = fixture(&[("big.bin", data.as_slice())]);
        // Tiny threshold/chunk so the test stays fast.
        let asset = serve(dir.path(), "big.bin", None, 50, 32).unwrap().unwrap();
        assert_eq!(asset.status, 200);
        let AssetBody::Stream(mut stream) = asset.body else {
            panic!("expected streamed body");
        };

        let mut collected = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next_chunk().unwrap() {
            assert!(chunk.len() <= 32);
            collected.extend_from_slice(&chunk);
            chunks += 1;
        }
        assert_eq!(collected, data);
        assert_eq!(chunks, 4);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        let dir = fixture(&[("data.xyz", b"??" as &[u8])]);
        let asset = serve(dir.path(), "data.xyz", None, THRESHOLD, CHUNK)
            .unwrap()
            .unwrap();
        assert_eq!(
            asset.headers.get("Content-Type"),
            Some("application/octet-stream")
        );
    }
}
