//! Core data models for the download front-end

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Number of description characters kept in a [`VideoRecord`]
pub const DESCRIPTION_EXCERPT_CHARS: usize = 200;

/// Body of `POST /download`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    pub url: Option<String>,
}

/// A completed download, as listed by the catalog

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub title: String,

    pub duration_seconds: u64,

    pub author: String,

    pub description_excerpt: String,

    pub file_size_bytes: u64,

    pub file_path: PathBuf,

    pub completed_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Build a record from resolved metadata and the final file on disk
    pub fn from_media(info: &MediaInfo, file_path: PathBuf, file_size_bytes: u64) -> Self {
        Self {
            title: info.title.clone(),
            duration_seconds: info.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            author: info
                .uploader
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            description_excerpt: description_excerpt(info.description.as_deref().unwrap_or("")),
            file_size_bytes,
            file_path,
            completed_at: Utc::now(),
        }
    }
}

/// Truncate a description to [`DESCRIPTION_EXCERPT_CHARS`] characters
pub fn description_excerpt(description: &str) -> String {
    let mut chars = description.chars();
    let excerpt: String = chars.by_ref().take(DESCRIPTION_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", excerpt)
    } else {
        excerpt
    }
}

/// Metadata returned by a metadata-only extraction

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub id: String,

    pub title: String,

    pub duration: Option<f64>,

    pub uploader: Option<String>,

    pub description: Option<String>,

    pub formats: Vec<MediaFormat>,

    pub webpage_url: Option<String>,
}

/// One downloadable format offered by the extractor

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFormat {
    pub format_id: String,

    pub ext: String,

    pub vcodec: Option<String>,

    pub acodec: Option<String>,

    pub height: Option<u32>,

    pub filesize: Option<u64>,
}

/// Proxy protocol schemes, in probing order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    /// SOCKS5 with DNS resolved by the proxy
    Socks5h,
    Socks5,
    Http,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socks5h => "socks5h",
            Self::Socks5 => "socks5",
            Self::Http => "http",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "socks5h" => Some(Self::Socks5h),
            "socks5" => Some(Self::Socks5),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified proxy endpoint

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub scheme: ProxyScheme,

    pub host: String,

    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Parse `scheme://host:port`; unknown schemes are rejected
    pub fn parse(value: &str) -> AppResult<Self> {
        let parsed = url::Url::parse(value)
            .map_err(|e| AppError::Config(format!("Invalid proxy URL {}: {}", value, e)))?;
        let scheme = ProxyScheme::parse(parsed.scheme()).ok_or_else(|| {
            AppError::Config(format!("Unsupported proxy scheme: {}", parsed.scheme()))
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AppError::Config(format!("Proxy URL has no host: {}", value)))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| AppError::Config(format!("Proxy URL has no port: {}", value)))?;

        Ok(Self::new(scheme, host, port))
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Application error types

#[derive(Debug, thiserror::Error)]

pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Extraction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cookie error: {0}")]
    Cookie(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("System error: {0}")]
    System(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Cookie(err.to_string())
    }
}

/// Result type alias for application operations

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn media(description: Option<&str>) -> MediaInfo {
        MediaInfo {
            id: "abc".to_string(),
            title: "Some Title".to_string(),
            duration: Some(212.4),
            uploader: None,
            description: description.map(str::to_string),
            formats: vec![],
            webpage_url: None,
        }
    }

    #[test]
    fn test_description_excerpt_truncates_by_characters() {
        let long = "é".repeat(250);
        let excerpt = description_excerpt(&long);
        assert_eq!(excerpt.chars().count(), DESCRIPTION_EXCERPT_CHARS + 3);
        assert!(excerpt.ends_with("..."));

        assert_eq!(description_excerpt("short"), "short");
        assert_eq!(description_excerpt(""), "");
    }

    #[test]
    fn test_record_from_media_defaults() {
        let record = VideoRecord::from_media(&media(None), PathBuf::from("downloads/a.mp4"), 42);
        assert_eq!(record.title, "Some Title");
        assert_eq!(record.duration_seconds, 212);
        assert_eq!(record.author, "Unknown");
        assert_eq!(record.description_excerpt, "");
        assert_eq!(record.file_size_bytes, 42);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = VideoRecord::from_media(&media(Some("d")), PathBuf::from("x.mp4"), 1);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("durationSeconds").is_some());
        assert!(json.get("descriptionExcerpt").is_some());
        assert!(json.get("fileSizeBytes").is_some());
        assert!(json.get("filePath").is_some());
        assert!(json.get("completedAt").is_some());
    }

    #[test]
    fn test_proxy_endpoint_parse() {
        let endpoint = ProxyEndpoint::parse("socks5h://127.0.0.1:1080").unwrap();
        assert_eq!(endpoint.scheme, ProxyScheme::Socks5h);
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 1080);
        assert_eq!(endpoint.url(), "socks5h://127.0.0.1:1080");

        assert!(ProxyEndpoint::parse("ftp://127.0.0.1:21").is_err());
        assert!(ProxyEndpoint::parse("socks5://127.0.0.1").is_err());
        assert_eq!(ProxyEndpoint::parse("http://proxy.local").unwrap().port, 80);
    }
}
