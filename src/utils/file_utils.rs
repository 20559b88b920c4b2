//! File system utilities

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Ensure directory exists
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", path.display(), e))?;
    }
    Ok(())
}

/// First entry of `dir` (by file name) whose name contains `needle`
pub fn find_file_containing(dir: &Path, needle: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| entry.file_name().to_string_lossy().contains(needle))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Convert bytes to a human readable size using decimal units
pub fn humanize_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["Bytes", "kB", "MB", "GB", "TB", "PB"];
    const THRESHOLD: f64 = 1000.0;

    if bytes == 1 {
        return "1 Byte".to_string();
    }
    if (bytes as f64) < THRESHOLD {
        return format!("{} Bytes", bytes);
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Format seconds as `H:MM:SS`
pub fn format_duration(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_humanize_bytes() {
        assert_eq!(humanize_bytes(0), "0 Bytes");
        assert_eq!(humanize_bytes(1), "1 Byte");
        assert_eq!(humanize_bytes(999), "999 Bytes");
        assert_eq!(humanize_bytes(1_000), "1.0 kB");
        assert_eq!(humanize_bytes(3_500_000), "3.5 MB");
        assert_eq!(humanize_bytes(2_000_000_000), "2.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(212), "0:03:32");
        assert_eq!(format_duration(3_725), "1:02:05");
    }

    #[test]
    fn test_find_file_containing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b - My Clip.webm"), b"x").unwrap();
        fs::write(dir.path().join("a - My Clip.mp4"), b"x").unwrap();
        fs::write(dir.path().join("other.mp4"), b"x").unwrap();

        let found = find_file_containing(dir.path(), "My Clip").unwrap();
        assert_eq!(found, dir.path().join("a - My Clip.mp4"));
        assert!(find_file_containing(dir.path(), "missing").is_none());
        assert!(find_file_containing(&dir.path().join("nope"), "My Clip").is_none());
    }

    #[test]
    fn test_ensure_dir_exists() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir_exists(&nested).unwrap();
    }
}
