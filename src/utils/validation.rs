//! URL and input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Accepted YouTube URL shape: optional scheme and `www.`, then a youtube host and a path
pub const YOUTUBE_URL_PATTERN: &str = r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+$";

fn youtube_regex() -> &'static Regex {
    static YOUTUBE_REGEX: OnceLock<Regex> = OnceLock::new();
    YOUTUBE_REGEX.get_or_init(|| Regex::new(YOUTUBE_URL_PATTERN).expect("valid YouTube URL regex"))
}

/// Check if URL points at youtube.com or youtu.be
pub fn is_valid_youtube_url(url: &str) -> bool {
    youtube_regex().is_match(url)
}
