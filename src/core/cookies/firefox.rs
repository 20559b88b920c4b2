//! Firefox cookie store (`cookies.sqlite` in the profile directory)

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{host_matches_domain, snapshot_store, BrowserCookie, CookieSource, CookieValue};
use crate::core::models::{AppError, AppResult};

/// Expiry values above this are milliseconds
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

pub struct FirefoxSource {
    roots: Vec<PathBuf>,
}

impl FirefoxSource {
    pub fn new() -> Self {
        Self::with_roots(profile_roots())
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Profiles holding a cookie store, `*.default-release` first
    fn profiles(&self) -> Vec<PathBuf> {
        let mut profiles: Vec<PathBuf> = self
            .roots
            .iter()
            .filter_map(|root| std::fs::read_dir(root).ok())
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.join("cookies.sqlite").is_file())
            .collect();

        profiles.sort_by_key(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (!name.ends_with(".default-release"), name)
        });
        profiles
    }
}

impl Default for FirefoxSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieSource for FirefoxSource {
    fn name(&self) -> &str {
        "firefox"
    }

    fn load(&self, domain: &str) -> AppResult<Vec<BrowserCookie>> {
        let profile = self
            .profiles()
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Cookie("firefox profile not found".to_string()))?;
        debug!("Reading firefox cookies from {:?}", profile);

        read_store(&profile.join("cookies.sqlite"), domain)
    }
}

fn read_store(db: &Path, domain: &str) -> AppResult<Vec<BrowserCookie>> {
    let (_scratch, snapshot) = snapshot_store(db)?;
    let conn = Connection::open_with_flags(&snapshot, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let mut stmt = conn.prepare(
        "SELECT host, name, value, path, expiry, isSecure, isHttpOnly \
         FROM moz_cookies WHERE host LIKE ?1",
    )?;
    let pattern = format!("%{}", domain.trim_start_matches('.'));
    let rows = stmt.query_map([pattern], |row| {
        let expiry: i64 = row.get(4)?;
        Ok(BrowserCookie {
            host: row.get(0)?,
            name: row.get(1)?,
            value: CookieValue::Plain(row.get(2)?),
            path: row.get(3)?,
            expires: if expiry > MILLIS_THRESHOLD {
                expiry / 1000
            } else {
                expiry.max(0)
            },
            secure: row.get::<_, i64>(5)? != 0,
            http_only: row.get::<_, i64>(6)? != 0,
        })
    })?;

    let mut cookies = Vec::new();
    for row in rows {
        let cookie = row?;
        if host_matches_domain(&cookie.host, domain) {
            cookies.push(cookie);
        }
    }
    Ok(cookies)
}

fn profile_roots() -> Vec<PathBuf> {
    let Some(base) = directories::BaseDirs::new() else {
        return Vec::new();
    };

    if cfg!(target_os = "macos") {
        vec![base.config_dir().join("Firefox").join("Profiles")]
    } else if cfg!(target_os = "windows") {
        vec![base.config_dir().join("Mozilla").join("Firefox").join("Profiles")]
    } else {
        let home = base.home_dir();
        vec![
            home.join(".mozilla").join("firefox"),
            home.join("snap")
                .join("firefox")
                .join("common")
                .join(".mozilla")
                .join("firefox"),
        ]
    }
}
