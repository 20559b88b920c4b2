//! Safari `Cookies.binarycookies` reader

use std::path::PathBuf;
use tracing::debug;

use super::{host_matches_domain, BrowserCookie, CookieSource, CookieValue};
use crate::core::models::{AppError, AppResult};

/// Seconds between 1970-01-01 and 2001-01-01 (Core Foundation epoch)
const MAC_EPOCH_OFFSET_SECS: f64 = 978_307_200.0;

const FLAG_SECURE: u32 = 0x1;
const FLAG_HTTP_ONLY: u32 = 0x4;

pub struct SafariSource {
    candidates: Vec<PathBuf>,
}

impl SafariSource {
    pub fn new() -> Self {
        let candidates = directories::BaseDirs::new()
            .map(|base| {
                let home = base.home_dir();
                vec![
                    home.join("Library/Containers/com.apple.Safari/Data/Library/Cookies/Cookies.binarycookies"),
                    home.join("Library/Cookies/Cookies.binarycookies"),
                ]
            })
            .unwrap_or_default();
        Self::with_candidates(candidates)
    }

    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }
}

impl Default for SafariSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieSource for SafariSource {
    fn name(&self) -> &str {
        "safari"
    }

    fn load(&self, domain: &str) -> AppResult<Vec<BrowserCookie>> {
        let file = self
            .candidates
            .iter()
            .find(|p| p.is_file())
            .ok_or_else(|| AppError::Cookie("safari cookie store not found".to_string()))?;
        debug!("Reading safari cookies from {:?}", file);

        let data = std::fs::read(file)?;
        let cookies = parse_binary_cookies(&data)?
            .into_iter()
            .filter(|c| host_matches_domain(&c.host, domain))
            .collect();
        Ok(cookies)
    }
}

fn malformed(what: &str) -> AppError {
    AppError::Cookie(format!("malformed binarycookies file: {}", what))
}

fn slice<'a>(data: &'a [u8], offset: usize, len: usize) -> AppResult<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| malformed("unexpected end of data"))
}

fn be_u32(data: &[u8], offset: usize) -> AppResult<u32> {
    let bytes = slice(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn le_u32(data: &[u8], offset: usize) -> AppResult<u32> {
    let bytes = slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn le_f64(data: &[u8], offset: usize) -> AppResult<f64> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice(data, offset, 8)?);
    Ok(f64::from_le_bytes(buf))
}

fn c_string(data: &[u8], offset: usize) -> AppResult<String> {
    let rest = data.get(offset..).ok_or_else(|| malformed("string offset"))?;
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| malformed("unterminated string"))?;
    Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// Parse every cookie in a binarycookies file
pub fn parse_binary_cookies(data: &[u8]) -> AppResult<Vec<BrowserCookie>> {
    if slice(data, 0, 4)? != b"cook" {
        return Err(malformed("bad magic"));
    }

    let page_count = be_u32(data, 4)? as usize;
    let mut page_sizes = Vec::with_capacity(page_count.min(1024));
    for i in 0..page_count {
        page_sizes.push(be_u32(data, 8 + i * 4)? as usize);
    }

    let mut offset = 8 + page_count * 4;
    let mut cookies = Vec::new();
    for size in page_sizes {
        let page = slice(data, offset, size)?;
        cookies.extend(parse_page(page)?);
        offset += size;
    }
    Ok(cookies)
}

fn parse_page(page: &[u8]) -> AppResult<Vec<BrowserCookie>> {
    if be_u32(page, 0)? != 0x0000_0100 {
        return Err(malformed("bad page header"));
    }

    let count = le_u32(page, 4)? as usize;
    let mut cookies = Vec::with_capacity(count.min(1024));
    for i in 0..count {
        let start = le_u32(page, 8 + i * 4)? as usize;
        let size = le_u32(page, start)? as usize;
        cookies.push(parse_cookie(slice(page, start, size)?)?);
    }
    Ok(cookies)
}

fn parse_cookie(record: &[u8]) -> AppResult<BrowserCookie> {
    let flags = le_u32(record, 8)?;
    let host = c_string(record, le_u32(record, 16)? as usize)?;
    let name = c_string(record, le_u32(record, 20)? as usize)?;
    let path = c_string(record, le_u32(record, 24)? as usize)?;
    let value = c_string(record, le_u32(record, 28)? as usize)?;
    let expiry = le_f64(record, 40)?;

    Ok(BrowserCookie {
        host,
        name,
        value: CookieValue::Plain(value),
        path,
        expires: (expiry + MAC_EPOCH_OFFSET_SECS).max(0.0) as i64,
        secure: flags & FLAG_SECURE != 0,
        http_only: flags & FLAG_HTTP_ONLY != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cookie_record(host: &str, name: &str, path: &str, value: &str, flags: u32, expiry: f64) -> Vec<u8> {
        const STRINGS_AT: usize = 56;
        let strings = [host, name, path, value];
        let mut offsets = Vec::new();
        let mut body = Vec::new();
        for s in strings {
            offsets.push((STRINGS_AT + body.len()) as u32);
            body.extend_from_slice(s.as_bytes());
            body.push(0);
        }

        let size = (STRINGS_AT + body.len()) as u32;
        let mut record = Vec::new();
        record.extend_from_slice(&size.to_le_bytes());
        record.extend_from_slice(&0u32.to_le_bytes());
        record.extend_from_slice(&flags.to_le_bytes());
        record.extend_from_slice(&0u32.to_le_bytes());
        for off in offsets {
            record.extend_from_slice(&off.to_le_bytes());
        }
        record.extend_from_slice(&[0u8; 8]);
        record.extend_from_slice(&expiry.to_le_bytes());
        record.extend_from_slice(&0f64.to_le_bytes());
        record.extend_from_slice(&body);
        record
    }

    fn binary_cookies(records: &[Vec<u8>]) -> Vec<u8> {
        let header_len = 8 + records.len() * 4 + 4;
        let mut page = Vec::new();
        page.extend_from_slice(&0x0000_0100u32.to_be_bytes());
        page.extend_from_slice(&(records.len() as u32).to_le_bytes());
        let mut next = header_len;
        for r in records {
            page.extend_from_slice(&(next as u32).to_le_bytes());
            next += r.len();
        }
        page.extend_from_slice(&0u32.to_le_bytes());
        for r in records {
            page.extend_from_slice(r);
        }

        let mut file = b"cook".to_vec();
        file.extend_from_slice(&1u32.to_be_bytes());
        file.extend_from_slice(&(page.len() as u32).to_be_bytes());
        file.extend_from_slice(&page);
        file
    }

    #[test]
    fn test_parse_binary_cookies() {
        let data = binary_cookies(&[
            cookie_record(".youtube.com", "SID", "/", "abc", FLAG_SECURE | FLAG_HTTP_ONLY, 1000.0),
            cookie_record("example.com", "X", "/a", "y", 0, 0.0),
        ]);

        let cookies = parse_binary_cookies(&data).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].host, ".youtube.com");
        assert_eq!(cookies[0].name, "SID");
        assert_eq!(cookies[0].value, CookieValue::Plain("abc".to_string()));
        assert!(cookies[0].secure);
        assert!(cookies[0].http_only);
        assert_eq!(cookies[0].expires, 978_308_200);
        assert_eq!(cookies[1].path, "/a");
        assert!(!cookies[1].secure);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(parse_binary_cookies(b"nope").is_err());
        assert!(parse_binary_cookies(b"cook\x00\x00\x00\x05").is_err());

        let mut data = binary_cookies(&[cookie_record("a.com", "n", "/", "v", 0, 0.0)]);
        data.truncate(data.len() - 10);
        assert!(parse_binary_cookies(&data).is_err());
    }

    #[test]
    fn test_load_filters_domain() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("Cookies.binarycookies");
        std::fs::write(
            &file,
            binary_cookies(&[
                cookie_record("www.youtube.com", "PREF", "/", "1", 0, 0.0),
                cookie_record("example.com", "X", "/", "y", 0, 0.0),
            ]),
        )
        .unwrap();

        let source = SafariSource::with_candidates(vec![dir.path().join("missing"), file]);
        let cookies = source.load(".youtube.com").unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "PREF");
    }
}
