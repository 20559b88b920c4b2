//! Chromium 系浏览器 Cookie 读取
//!
//! Chrome, Edge, Chromium, Opera and Brave share the same SQLite layout.
//! Values encrypted with the `v10` scheme and the fixed desktop-Linux key
//! are decrypted; anything else is reported as undecryptable.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use cbc::Decryptor;
use rusqlite::{Connection, OpenFlags};
use sha1::Sha1;
use std::path::PathBuf;
use tracing::debug;

use super::{host_matches_domain, snapshot_store, Browser, BrowserCookie, CookieSource, CookieValue};
use crate::core::models::{AppError, AppResult};

/// Seconds between 1601-01-01 and 1970-01-01
const WINDOWS_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

const V10_PASSWORD: &[u8] = b"peanuts";
const V10_SALT: &[u8] = b"saltysalt";
const V10_IV: [u8; 16] = [b' '; 16];

/// From this `meta.version` on, plaintext is prefixed with a SHA-256 of the host
const HOST_DIGEST_VERSION: i64 = 24;
const HOST_DIGEST_LEN: usize = 32;

pub struct ChromiumSource {
    browser: Browser,
    roots: Vec<PathBuf>,
}

impl ChromiumSource {
    pub fn new(browser: Browser) -> Self {
        Self::with_roots(browser, user_data_dirs(browser))
    }

    /// Look for profiles only under `roots`
    pub fn with_roots(browser: Browser, roots: Vec<PathBuf>) -> Self {
        Self { browser, roots }
    }

    fn cookie_db(&self) -> Option<PathBuf> {
        for root in &self.roots {
            let candidates = [
                root.join("Default").join("Network").join("Cookies"),
                root.join("Default").join("Cookies"),
                root.join("Network").join("Cookies"),
                root.join("Cookies"),
            ];
            if let Some(found) = candidates.into_iter().find(|p| p.is_file()) {
                return Some(found);
            }
        }
        None
    }
}

impl CookieSource for ChromiumSource {
    fn name(&self) -> &str {
        self.browser.as_str()
    }

    fn load(&self, domain: &str) -> AppResult<Vec<BrowserCookie>> {
        let db = self.cookie_db().ok_or_else(|| {
            AppError::Cookie(format!("{} cookie store not found", self.browser))
        })?;
        debug!("Reading {} cookies from {:?}", self.browser, db);

        let (_scratch, snapshot) = snapshot_store(&db)?;
        let conn = Connection::open_with_flags(&snapshot, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let version: i64 = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                row.get::<_, String>(0)
            })
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let strip_digest = version >= HOST_DIGEST_VERSION;
        let key = v10_key();

        let mut stmt = conn.prepare(
            "SELECT host_key, name, value, encrypted_value, path, expires_utc, is_secure, is_httponly \
             FROM cookies WHERE host_key LIKE ?1",
        )?;
        let pattern = format!("%{}", domain.trim_start_matches('.'));
        let rows = stmt.query_map([pattern], |row| {
            let host: String = row.get(0)?;
            let name: String = row.get(1)?;
            let value: String = row.get(2)?;
            let encrypted: Vec<u8> = row.get(3)?;
            let path: String = row.get(4)?;
            let expires_utc: i64 = row.get(5)?;
            let secure: i64 = row.get(6)?;
            let http_only: i64 = row.get(7)?;

            Ok(BrowserCookie {
                host,
                name,
                value: if value.is_empty() {
                    decrypt_value(&encrypted, &key, strip_digest)
                } else {
                    CookieValue::Plain(value)
                },
                path,
                expires: chrome_time_to_unix(expires_utc),
                secure: secure != 0,
                http_only: http_only != 0,
            })
        })?;

        let mut cookies = Vec::new();
        for row in rows {
            let cookie = row?;
            if host_matches_domain(&cookie.host, domain) {
                cookies.push(cookie);
            }
        }
        debug!("{}: {} cookies for {}", self.browser, cookies.len(), domain);
        Ok(cookies)
    }
}

/// Microseconds since 1601 to unix seconds; 0 stays 0
pub fn chrome_time_to_unix(micros: i64) -> i64 {
    if micros <= 0 {
        return 0;
    }
    (micros / 1_000_000 - WINDOWS_EPOCH_OFFSET_SECS).max(0)
}

pub fn decrypt_value(encrypted: &[u8], key: &[u8; 16], strip_digest: bool) -> CookieValue {
    if encrypted.is_empty() {
        return CookieValue::Plain(String::new());
    }
    let Some(ciphertext) = encrypted.strip_prefix(b"v10") else {
        let prefix = String::from_utf8_lossy(&encrypted[..encrypted.len().min(3)]).into_owned();
        return CookieValue::Undecryptable(format!("unsupported encryption prefix {:?}", prefix));
    };

    let decryptor = match Decryptor::<Aes128>::new_from_slices(key, &V10_IV) {
        Ok(d) => d,
        Err(e) => return CookieValue::Undecryptable(e.to_string()),
    };
    let mut plaintext = match decryptor.decrypt_padded_vec_mut::<Pkcs7>(ciphertext) {
        Ok(p) => p,
        Err(_) => return CookieValue::Undecryptable("bad padding".to_string()),
    };

    if strip_digest && plaintext.len() >= HOST_DIGEST_LEN {
        plaintext.drain(..HOST_DIGEST_LEN);
    }

    match String::from_utf8(plaintext) {
        Ok(value) => CookieValue::Plain(value),
        Err(_) => CookieValue::Undecryptable("value is not UTF-8".to_string()),
    }
}

/// Key used by desktop Linux builds without a keyring
pub fn v10_key() -> [u8; 16] {
    let mut key = [0u8; 16];
    pbkdf2::pbkdf2_hmac::<Sha1>(V10_PASSWORD, V10_SALT, 1, &mut key);
    key
}

fn user_data_dirs(browser: Browser) -> Vec<PathBuf> {
    let Some(base) = directories::BaseDirs::new() else {
        return Vec::new();
    };

    let relative: &[&str] = if cfg!(target_os = "macos") {
        match browser {
            Browser::Chrome => &["Google/Chrome"],
            Browser::Edge => &["Microsoft Edge"],
            Browser::Chromium => &["Chromium"],
            Browser::Opera => &["com.operasoftware.Opera"],
            Browser::Brave => &["BraveSoftware/Brave-Browser"],
            _ => &[],
        }
    } else if cfg!(target_os = "windows") {
        match browser {
            Browser::Chrome => &["Google/Chrome/User Data"],
            Browser::Edge => &["Microsoft/Edge/User Data"],
            Browser::Chromium => &["Chromium/User Data"],
            Browser::Brave => &["BraveSoftware/Brave-Browser/User Data"],
            _ => &[],
        }
    } else {
        match browser {
            Browser::Chrome => &["google-chrome", "google-chrome-beta"],
            Browser::Edge => &["microsoft-edge"],
            Browser::Chromium => &["chromium"],
            Browser::Opera => &["opera"],
            Browser::Brave => &["BraveSoftware/Brave-Browser"],
            _ => &[],
        }
    };

    let root = if cfg!(target_os = "windows") {
        base.data_local_dir()
    } else {
        base.config_dir()
    };
    let mut dirs: Vec<PathBuf> = relative.iter().map(|r| root.join(r)).collect();

    // Windows 下 Opera 的配置在 Roaming 目录
    if cfg!(target_os = "windows") && browser == Browser::Opera {
        dirs.push(base.data_dir().join("Opera Software").join("Opera Stable"));
    }
    dirs
}
