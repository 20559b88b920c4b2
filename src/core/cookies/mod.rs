//! Browser cookie harvesting
//!
//! Reads session cookies for one domain out of locally installed browser
//! profiles and writes them to a Netscape-format cookie jar that the
//! extraction tool understands. Browsers are tried in a fixed order and the
//! first one that yields any cookies wins.

pub mod chromium;
pub mod firefox;
pub mod safari;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::core::models::{AppError, AppResult};

pub use chromium::ChromiumSource;
pub use firefox::FirefoxSource;
pub use safari::SafariSource;

/// Supported browsers, in harvesting order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Chromium,
    Opera,
    Brave,
}

impl Browser {
    pub const ALL: [Browser; 7] = [
        Browser::Chrome,
        Browser::Firefox,
        Browser::Safari,
        Browser::Edge,
        Browser::Chromium,
        Browser::Opera,
        Browser::Brave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::Safari => "safari",
            Self::Edge => "edge",
            Self::Chromium => "chromium",
            Self::Opera => "opera",
            Self::Brave => "brave",
        }
    }

    /// Default store reader for this browser
    pub fn source(self) -> Box<dyn CookieSource> {
        match self {
            Self::Firefox => Box::new(FirefoxSource::new()),
            Self::Safari => Box::new(SafariSource::new()),
            chromium_family => Box::new(ChromiumSource::new(chromium_family)),
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cookie value as read from a store
#[derive(Debug, Clone, PartialEq)]
pub enum CookieValue {
    Plain(String),
    /// Stored encrypted with a scheme we cannot decrypt; carries the reason
    Undecryptable(String),
}

/// A cookie read from a browser store
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserCookie {
    pub host: String,
    pub name: String,
    pub value: CookieValue,
    pub path: String,
    /// Unix seconds, 0 for session cookies
    pub expires: i64,
    pub secure: bool,
    pub http_only: bool,
}

impl BrowserCookie {
    pub fn plain(host: &str, name: &str, value: &str) -> Self {
        Self {
            host: host.to_string(),
            name: name.to_string(),
            value: CookieValue::Plain(value.to_string()),
            path: "/".to_string(),
            expires: 0,
            secure: true,
            http_only: false,
        }
    }
}

/// True when `host` is `domain` or one of its subdomains
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_start_matches('.').to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
}

/// A local browser cookie store
pub trait CookieSource: Send + Sync {
    fn name(&self) -> &str;

    /// Cookies whose host matches `domain`
    fn load(&self, domain: &str) -> AppResult<Vec<BrowserCookie>>;
}

/// Reasons a cookie cannot become a jar entry
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CookieConversionError {
    #[error("cookie has no name")]
    MissingName,
    #[error("cookie {0} has no domain")]
    MissingDomain(String),
    #[error("cookie {0} contains a tab or newline")]
    InvalidCharacters(String),
    #[error("cookie {name} could not be decrypted: {reason}")]
    Undecryptable { name: String, reason: String },
}

/// One line of a Netscape cookie jar
#[derive(Debug, Clone, PartialEq)]
pub struct NetscapeCookie {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub expires: i64,
    pub name: String,
    pub value: String,
    pub http_only: bool,
}

impl TryFrom<&BrowserCookie> for NetscapeCookie {
    type Error = CookieConversionError;

    fn try_from(cookie: &BrowserCookie) -> Result<Self, Self::Error> {
        if cookie.name.is_empty() {
            return Err(CookieConversionError::MissingName);
        }
        if cookie.host.is_empty() {
            return Err(CookieConversionError::MissingDomain(cookie.name.clone()));
        }
        let value = match &cookie.value {
            CookieValue::Plain(value) => value.clone(),
            CookieValue::Undecryptable(reason) => {
                return Err(CookieConversionError::Undecryptable {
                    name: cookie.name.clone(),
                    reason: reason.clone(),
                })
            }
        };

        let fields = [cookie.host.as_str(), cookie.name.as_str(), cookie.path.as_str(), value.as_str()];
        if fields.iter().any(|f| f.contains(['\t', '\n', '\r'])) {
            return Err(CookieConversionError::InvalidCharacters(cookie.name.clone()));
        }

        Ok(Self {
            domain: cookie.host.clone(),
            include_subdomains: cookie.host.starts_with('.'),
            path: if cookie.path.is_empty() {
                "/".to_string()
            } else {
                cookie.path.clone()
            },
            secure: cookie.secure,
            expires: cookie.expires.max(0),
            name: cookie.name.clone(),
            value,
            http_only: cookie.http_only,
        })
    }
}

impl fmt::Display for NetscapeCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |b: bool| if b { "TRUE" } else { "FALSE" };
        let prefix = if self.http_only { "#HttpOnly_" } else { "" };
        write!(
            f,
            "{}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            prefix,
            self.domain,
            flag(self.include_subdomains),
            self.path,
            flag(self.secure),
            self.expires,
            self.name,
            self.value
        )
    }
}

pub const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

/// A cookie jar in a temporary file, removed by [`CookieBundle::remove`] or on drop
#[derive(Debug)]
pub struct CookieBundle {
    path: TempPath,
    source: String,
    written: usize,
    skipped: usize,
}

impl CookieBundle {
    /// Convert `cookies` and write them to a fresh temporary file.
    /// Cookies that fail conversion are logged and skipped.
    pub fn write(
        source: &str,
        cookies: &[BrowserCookie],
        temp_dir: Option<&Path>,
    ) -> AppResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ytfront-cookies-").suffix(".txt");
        let file = match temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let mut written = 0;
        let mut skipped = 0;
        {
            let mut out = BufWriter::new(file.as_file());
            writeln!(out, "{}", NETSCAPE_HEADER)?;
            writeln!(out)?;
            for cookie in cookies {
                match NetscapeCookie::try_from(cookie) {
                    Ok(entry) => {
                        writeln!(out, "{}", entry)?;
                        written += 1;
                    }
                    Err(e) => {
                        warn!("Failed to set cookie: {}", e);
                        skipped += 1;
                    }
                }
            }
            out.flush()?;
        }

        Ok(Self {
            path: file.into_temp_path(),
            source: source.to_string(),
            written,
            skipped,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Delete the jar, logging a warning if that fails
    pub fn remove(self) {
        let path: PathBuf = self.path.to_path_buf();
        match self.path.close() {
            Ok(()) => debug!("Cleaned up temporary cookie file {:?}", path),
            Err(e) => warn!("Failed to clean up cookie file {:?}: {}", path, e),
        }
    }
}

/// Tries each cookie source in order; first non-empty result wins
pub struct CookieHarvester {
    sources: Vec<Box<dyn CookieSource>>,
    temp_dir: Option<PathBuf>,
}

impl CookieHarvester {
    pub fn new(sources: Vec<Box<dyn CookieSource>>) -> Self {
        Self {
            sources,
            temp_dir: None,
        }
    }

    /// Harvester over the default stores of `browsers`, in the given order
    pub fn for_browsers(browsers: &[Browser]) -> Self {
        Self::new(browsers.iter().map(|b| b.source()).collect())
    }

    /// Harvester that never finds cookies
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    /// Write jars under `dir` instead of the system temp dir
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn harvest(&self, domain: &str) -> Option<CookieBundle> {
        for source in &self.sources {
            info!("Attempting to get cookies from {}", source.name());

            let cookies = match source.load(domain) {
                Ok(cookies) => cookies,
                Err(e) => {
                    warn!("Failed to get cookies from {}: {}", source.name(), e);
                    continue;
                }
            };

            if cookies.is_empty() {
                debug!("{} has no cookies for {}", source.name(), domain);
                continue;
            }

            match CookieBundle::write(source.name(), &cookies, self.temp_dir.as_deref()) {
                Ok(bundle) if bundle.written() == 0 => {
                    warn!(
                        "No usable cookies from {} ({} skipped)",
                        source.name(),
                        bundle.skipped()
                    );
                    bundle.remove();
                    continue;
                }
                Ok(bundle) => {
                    info!(
                        "🍪 Saved {} cookies from {} ({} skipped)",
                        bundle.written(),
                        source.name(),
                        bundle.skipped()
                    );
                    return Some(bundle);
                }
                Err(e) => {
                    warn!("Failed to save cookies from {}: {}", source.name(), e);
                    continue;
                }
            }
        }

        warn!("No cookies found from any browser");
        None
    }
}

/// Copy a possibly locked SQLite store (and its WAL) into a scratch directory
pub(crate) fn snapshot_store(db: &Path) -> AppResult<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let file_name = db
        .file_name()
        .ok_or_else(|| AppError::Cookie(format!("Invalid cookie store path: {:?}", db)))?;
    let copy = dir.path().join(file_name);
    std::fs::copy(db, &copy)?;

    for suffix in ["-wal", "-shm"] {
        let mut side = db.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            let mut target = copy.as_os_str().to_owned();
            target.push(suffix);
            if let Err(e) = std::fs::copy(&side, PathBuf::from(target)) {
                debug!("Could not copy {:?}: {}", side, e);
            }
        }
    }

    Ok((dir, copy))
}
