use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use url::Url;

/// Where an image comes from.
/// 影像來源的分類。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    Path(PathBuf),
    File(Url),
    Data(String),
    Remote(Url),
    Unsupported(String),
}

impl ImageReference {
    /// Classifies a raw reference taken from a deep link.
    ///
    /// Anything that does not parse as an absolute URI with a multi-letter scheme is a
    /// local path, so `C:\labels\a.png` stays a path.
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        match Url::parse(trimmed) {
            Ok(url) if url.scheme().len() > 1 => match url.scheme() {
                "file" => ImageReference::File(url),
                "data" => ImageReference::Data(trimmed.to_string()),
                "http" | "https" => ImageReference::Remote(url),
                other => ImageReference::Unsupported(other.to_string()),
            },
            _ => ImageReference::Path(PathBuf::from(trimmed)),
        }
    }

    /// Reads the raw image bytes. Errors carry a render-engine style description.
    /// 讀取影像位元組；錯誤以繪製引擎風格的描述回傳。
    pub fn fetch(&self) -> Result<Vec<u8>, String> {
        match self {
            ImageReference::Path(path) => read_local(path),
            ImageReference::File(url) => {
                let path = url
                    .to_file_path()
                    .map_err(|_| "net::ERR_INVALID_URL".to_string())?;
                read_local(&path)
            }
            ImageReference::Data(uri) => decode_data_uri(uri),
            ImageReference::Remote(url) => fetch_remote(url),
            ImageReference::Unsupported(_) => Err("net::ERR_UNKNOWN_URL_SCHEME".to_string()),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageReference::Path(path) => write!(f, "{}", path.display()),
            ImageReference::File(url) | ImageReference::Remote(url) => f.write_str(url.as_str()),
            ImageReference::Data(uri) => {
                let header = uri.split_once(',').map(|(head, _)| head).unwrap_or(uri);
                write!(f, "{header},…")
            }
            ImageReference::Unsupported(scheme) => write!(f, "{scheme}:…"),
        }
    }
}

fn read_local(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => "net::ERR_FILE_NOT_FOUND".to_string(),
        ErrorKind::PermissionDenied => "net::ERR_ACCESS_DENIED".to_string(),
        _ => "net::ERR_FAILED".to_string(),
    })
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>, String> {
    let body = uri.get("data:".len()..).unwrap_or_default();
    let (header, payload) = body
        .split_once(',')
        .ok_or_else(|| "net::ERR_INVALID_URL".to_string())?;
    let raw = urlencoding::decode_binary(payload.as_bytes());
    if header.to_ascii_lowercase().ends_with(";base64") {
        let compact: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|byte| !byte.is_ascii_whitespace())
            .collect();
        BASE64
            .decode(compact)
            .map_err(|_| "net::ERR_INVALID_URL".to_string())
    } else {
        Ok(raw.into_owned())
    }
}

fn fetch_remote(url: &Url) -> Result<Vec<u8>, String> {
    let response = reqwest::blocking::get(url.as_str())
        .map_err(|_| "net::ERR_CONNECTION_FAILED".to_string())?;
    if !response.status().is_success() {
        return Err("net::ERR_HTTP_RESPONSE_CODE_FAILURE".to_string());
    }
    response
        .bytes()
        .map(|bytes| bytes.to_vec())
        .map_err(|_| "net::ERR_FAILED".to_string())
}
