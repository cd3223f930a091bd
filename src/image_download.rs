//! Image download
//!
//! Fetches raw image bytes over HTTP and works out which file extension the
//! image should be stored under.

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, warn};

/// Extension used when nothing else tells us the format
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Errors that can occur while downloading a single image
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request could not be sent or the body could not be read
    #[error("Failed to download {url}: {source}")]
    Request { url: String, source: reqwest::Error },

    /// The server answered with a non-success status
    #[error("HTTP {status} while downloading {url}")]
    Status { url: String, status: u16 },
}

/// A downloaded image held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    /// File extension including the leading dot, e.g. ".jpg"
    pub extension: String,
}

/// Trait for anything that can fetch an image by URL
pub trait ImageFetcher {
    /// Downloads the image at `url`.
    ///
    /// # Errors
    ///
    /// Returns a `DownloadError` on network failures and non-2xx responses.
    fn fetch(&self, url: &str) -> Result<DownloadedImage, DownloadError>;
}

/// Downloads images with a shared blocking HTTP client
pub struct ImageDownloader {
    http: reqwest::blocking::Client,
}

impl ImageDownloader {
    pub fn new(http: reqwest::blocking::Client) -> Self {
        Self { http }
    }
}

impl ImageFetcher for ImageDownloader {
    fn fetch(&self, url: &str) -> Result<DownloadedImage, DownloadError> {
        debug!(url, "Downloading image");

        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| DownloadError::Request {
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url, "Image download rejected");
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .map_err(|e| DownloadError::Request {
                url: url.to_string(),
                source: e,
            })?
            .to_vec();

        let extension = infer_extension(content_type.as_deref(), url, &bytes);
        debug!(url, size = bytes.len(), extension = %extension, "Image downloaded");

        Ok(DownloadedImage { bytes, extension })
    }
}

/// Maps an image MIME type to our preferred extension
fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/tiff" => Some(".tif"),
        "image/heic" | "image/heif" => Some(".heic"),
        _ => None,
    }
}

/// Maps a file suffix found in a URL path to our preferred extension
fn extension_for_suffix(suffix: &str) -> Option<&'static str> {
    match suffix.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "jpe" => Some(".jpg"),
        "png" => Some(".png"),
        "gif" => Some(".gif"),
        "webp" => Some(".webp"),
        "tif" | "tiff" => Some(".tif"),
        "heic" | "heif" => Some(".heic"),
        _ => None,
    }
}

/// Extracts the extension from the last path segment of `url`
fn extension_from_url(url: &str) -> Option<&'static str> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let (_, suffix) = segment.rsplit_once('.')?;
    extension_for_suffix(suffix)
}

/// Works out the extension for a downloaded image.
///
/// Tries the `Content-Type` header, then the URL suffix, then the file's
/// magic bytes, and falls back to `.jpg`.
pub fn infer_extension(content_type: Option<&str>, url: &str, bytes: &[u8]) -> String {
    content_type
        .and_then(extension_for_mime)
        .or_else(|| extension_from_url(url))
        .or_else(|| infer::get(bytes).and_then(|kind| extension_for_mime(kind.mime_type())))
        .unwrap_or(DEFAULT_EXTENSION)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    /// Answers a single HTTP request on a local port with `response`
    fn serve_once(response: Vec<u8>) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/photos/1/original", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buffer).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..n]);
            }
            stream.write_all(&response).unwrap();
        });

        (url, handle)
    }

    fn downloader() -> ImageDownloader {
        ImageDownloader::new(
            reqwest::blocking::Client::builder()
                .no_proxy()
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_fetch_rejects_non_success_status() {
        let (url, server) = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        );

        let result = downloader().fetch(&url);
        server.join().unwrap();

        assert!(matches!(
            result,
            Err(DownloadError::Status { status: 404, url: failed }) if failed == url
        ));
    }

    #[test]
    fn test_fetch_returns_bytes_and_extension() {
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            PNG_MAGIC.len()
        )
        .into_bytes();
        response.extend_from_slice(PNG_MAGIC);
        let (url, server) = serve_once(response);

        let image = downloader().fetch(&url).unwrap();
        server.join().unwrap();

        assert_eq!(image.bytes, PNG_MAGIC);
        assert_eq!(image.extension, ".png");
    }

    #[test]
    fn test_extension_from_content_type() {
        let url = "https://static.inaturalist.org/photos/1/medium.jpg";
        assert_eq!(infer_extension(Some("image/png"), url, &[]), ".png");
        assert_eq!(infer_extension(Some("image/jpeg; charset=binary"), url, &[]), ".jpg");
        assert_eq!(infer_extension(Some("IMAGE/WEBP"), url, &[]), ".webp");
    }

    #[test]
    fn test_extension_from_url_suffix() {
        assert_eq!(
            infer_extension(
                Some("binary/octet-stream"),
                "https://inaturalist-open-data.s3.amazonaws.com/photos/1/medium.jpeg",
                &[]
            ),
            ".jpg"
        );
        assert_eq!(
            infer_extension(None, "https://static.inaturalist.org/photos/1/large.PNG?1545", &[]),
            ".png"
        );
    }

    #[test]
    fn test_extension_from_magic_bytes() {
        assert_eq!(
            infer_extension(None, "https://example.org/photos/1/original", PNG_MAGIC),
            ".png"
        );
    }

    #[test]
    fn test_extension_default() {
        assert_eq!(
            infer_extension(None, "https://example.org/photos/1/original", b"not an image"),
            DEFAULT_EXTENSION
        );
        assert_eq!(infer_extension(None, "not a url", &[]), DEFAULT_EXTENSION);
    }
}
