//! Media extraction via the yt-dlp command-line tool
//!
//! Metadata lookups run `yt-dlp --dump-single-json`; downloads run the tool
//! with a progress template so progress can be logged, and `--print
//! after_move:filepath` so the final output path is known.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::config::DownloadConfig;
use crate::core::models::{AppError, AppResult, MediaFormat, MediaInfo, ProxyEndpoint};
use crate::utils::file_utils::{format_duration, humanize_bytes};

pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

const PROGRESS_PREFIX: &str = "[progress]";
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s";

/// Options passed to every extraction tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    pub format: String,
    pub output_dir: PathBuf,
    pub output_template: String,
    pub socket_timeout_secs: u64,
    pub retries: u32,
    pub fragment_retries: u32,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub no_check_certificate: bool,
    pub merge_output_format: String,
    pub cookie_file: Option<PathBuf>,
}

impl DownloadOptions {
    pub fn from_config(config: &DownloadConfig, download_dir: &Path) -> Self {
        Self {
            format: config.format.clone(),
            output_dir: download_dir.to_path_buf(),
            output_template: OUTPUT_TEMPLATE.to_string(),
            socket_timeout_secs: config.socket_timeout_secs,
            retries: config.retries,
            fragment_retries: config.fragment_retries,
            user_agent: config.user_agent.clone(),
            proxy: config.proxy.clone(),
            no_check_certificate: config.no_check_certificate,
            merge_output_format: config.merge_output_format.clone(),
            cookie_file: None,
        }
    }

    pub fn with_proxy(mut self, endpoint: &ProxyEndpoint) -> Self {
        self.proxy = Some(endpoint.url());
        self
    }

    /// Per-request copy using `cookie_file`; `self` is left untouched
    pub fn with_cookie_file(&self, cookie_file: &Path) -> Self {
        let mut options = self.clone();
        options.cookie_file = Some(cookie_file.to_path_buf());
        options
    }

    pub fn output_path_template(&self) -> PathBuf {
        self.output_dir.join(&self.output_template)
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-color".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--user-agent".to_string(),
            self.user_agent.clone(),
        ];
        if let Some(ref proxy) = self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        if self.no_check_certificate {
            args.push("--no-check-certificates".to_string());
        }
        if let Some(ref cookie_file) = self.cookie_file {
            args.push("--cookies".to_string());
            args.push(cookie_file.to_string_lossy().into_owned());
        }
        args
    }

    pub fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["--dump-single-json".to_string(), "--no-warnings".to_string()];
        args.extend(self.common_args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    pub fn download_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            self.output_path_template().to_string_lossy().into_owned(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--fragment-retries".to_string(),
            self.fragment_retries.to_string(),
            "--merge-output-format".to_string(),
            self.merge_output_format.clone(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--no-simulate".to_string(),
            "--progress".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
        ];
        args.extend(self.common_args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

/// Resolves metadata and downloads media for a URL
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Metadata only; `Ok(None)` when the tool produced nothing
    async fn extract_info(&self, url: &str, options: &DownloadOptions) -> AppResult<Option<MediaInfo>>;

    /// Download the media; returns the final path when the tool reports one
    async fn download(&self, url: &str, options: &DownloadOptions) -> AppResult<Option<PathBuf>>;
}

pub struct YtDlpExtractor {
    binary: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, options: &DownloadOptions) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        if let Some(ref proxy) = options.proxy {
            cmd.env("HTTP_PROXY", proxy)
                .env("HTTPS_PROXY", proxy)
                .env_remove("ALL_PROXY")
                .env_remove("all_proxy");
        }
        cmd
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract_info(&self, url: &str, options: &DownloadOptions) -> AppResult<Option<MediaInfo>> {
        info!("Extracting video info for {}", url);

        let output = self
            .command(options)
            .args(options.metadata_args(url))
            .output()
            .await
            .map_err(|e| AppError::System(format!("Failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Extraction(last_error_line(&stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(None);
        }

        let json: Value = serde_json::from_str(stdout)
            .map_err(|e| AppError::Extraction(format!("Failed to parse yt-dlp output: {}", e)))?;
        Ok(parse_media_info(&json))
    }

    async fn download(&self, url: &str, options: &DownloadOptions) -> AppResult<Option<PathBuf>> {
        let mut child = self
            .command(options)
            .args(options.download_args(url))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::System(format!("Failed to run yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::System("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::System("yt-dlp stderr unavailable".to_string()))?;

        let progress = Mutex::new(ProgressLogger::default());
        let (out_lines, err_lines) = tokio::join!(
            collect_output(stdout, &progress),
            collect_output(stderr, &progress)
        );
        let status = child.wait().await?;

        if !status.success() {
            let reason = err_lines
                .iter()
                .rev()
                .find(|l| l.contains("ERROR"))
                .or_else(|| err_lines.last())
                .cloned()
                .unwrap_or_else(|| status.to_string());
            return Err(AppError::Download(reason));
        }

        Ok(out_lines.last().map(|line| PathBuf::from(line.trim())))
    }
}

fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "yt-dlp failed without output".to_string())
}

/// Read a tool stream to its end; progress lines feed `progress`, other non-empty lines are returned
async fn collect_output<R>(reader: R, progress: &Mutex<ProgressLogger>) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut kept = Vec::new();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(update) = ProgressUpdate::parse(&line) {
                    progress.lock().observe(&update);
                } else if !line.trim().is_empty() {
                    debug!("yt-dlp: {}", line);
                    kept.push(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read yt-dlp output: {}", e);
                break;
            }
        }
    }

    kept
}

/// Build [`MediaInfo`] from `--dump-single-json` output; `null` gives `None`
pub fn parse_media_info(json: &Value) -> Option<MediaInfo> {
    if !json.is_object() {
        return None;
    }

    let formats = json["formats"]
        .as_array()
        .map(|formats| formats.iter().map(parse_format).collect())
        .unwrap_or_default();

    Some(MediaInfo {
        id: json["id"].as_str().unwrap_or_default().to_string(),
        title: json["title"].as_str().unwrap_or("Unknown Title").to_string(),
        duration: json["duration"].as_f64(),
        uploader: json["uploader"]
            .as_str()
            .or_else(|| json["channel"].as_str())
            .map(str::to_string),
        description: json["description"].as_str().map(str::to_string),
        formats,
        webpage_url: json["webpage_url"].as_str().map(str::to_string),
    })
}

fn parse_format(json: &Value) -> MediaFormat {
    MediaFormat {
        format_id: json["format_id"].as_str().unwrap_or("unknown").to_string(),
        ext: json["ext"].as_str().unwrap_or("mp4").to_string(),
        vcodec: json["vcodec"].as_str().map(str::to_string),
        acodec: json["acodec"].as_str().map(str::to_string),
        height: json["height"].as_u64().map(|h| h as u32),
        filesize: json["filesize"]
            .as_u64()
            .or_else(|| json["filesize_approx"].as_u64()),
    }
}

/// One progress line emitted through [`PROGRESS_TEMPLATE`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed: Option<f64>,
    pub eta_secs: Option<u64>,
}

impl ProgressUpdate {
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() != 5 {
            return None;
        }

        let number = |s: &str| s.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0);

        Some(Self {
            downloaded_bytes: number(fields[0])? as u64,
            total_bytes: number(fields[1])
                .or_else(|| number(fields[2]))
                .map(|v| v as u64)
                .filter(|v| *v > 0),
            speed: number(fields[3]),
            eta_secs: number(fields[4]).map(|v| v as u64),
        })
    }

    pub fn percent(&self) -> Option<f64> {
        self.total_bytes
            .map(|total| (self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0))
    }
}

/// Logs download progress at most once per 10% step
#[derive(Debug, Default)]
pub struct ProgressLogger {
    last_step: Option<u64>,
}

impl ProgressLogger {
    /// Returns true when the update was logged
    pub fn observe(&mut self, update: &ProgressUpdate) -> bool {
        let Some(percent) = update.percent() else {
            return false;
        };
        let step = (percent / 10.0).floor() as u64;
        if self.last_step.is_some_and(|last| step <= last) {
            return false;
        }
        self.last_step = Some(step);

        let speed = update
            .speed
            .map(|s| format!("{}/s", humanize_bytes(s as u64)))
            .unwrap_or_else(|| "unknown".to_string());
        let eta = update
            .eta_secs
            .map(format_duration)
            .unwrap_or_else(|| "unknown".to_string());
        info!("Download progress: {:.1}% Speed: {} ETA: {}", percent, speed, eta);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> DownloadOptions {
        DownloadOptions::from_config(&DownloadConfig::default(), Path::new("/srv/downloads"))
    }

    #[test]
    fn test_cookie_file_only_in_clone() {
        let base = options();
        let per_request = base.with_cookie_file(Path::new("/tmp/jar.txt"));

        assert!(base.cookie_file.is_none());
        assert!(!base.download_args("https://youtu.be/x").contains(&"--cookies".to_string()));
        assert_eq!(per_request.cookie_file, Some(PathBuf::from("/tmp/jar.txt")));
        let args = per_request.metadata_args("https://youtu.be/x");
        let pos = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[pos + 1], "/tmp/jar.txt");
    }

    #[test]
    fn test_download_args() {
        let endpoint = ProxyEndpoint::parse("socks5://127.0.0.1:1081").unwrap();
        let opts = options().with_proxy(&endpoint);
        let args = opts.download_args("https://www.youtube.com/watch?v=abc");

        let value_after = |flag: &str| {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };
        assert_eq!(value_after("-f"), "best");
        assert_eq!(value_after("-o"), "/srv/downloads/%(title)s.%(ext)s");
        assert_eq!(value_after("--retries"), "5");
        assert_eq!(value_after("--fragment-retries"), "5");
        assert_eq!(value_after("--socket-timeout"), "30");
        assert_eq!(value_after("--merge-output-format"), "mp4");
        assert_eq!(value_after("--proxy"), "socks5://127.0.0.1:1081");
        assert!(args.contains(&"--no-check-certificates".to_string()));
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_parse_media_info() {
        let json = json!({
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "duration": 212.0,
            "uploader": "Rick Astley",
            "description": "The official video",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "formats": [
                {"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 360, "filesize": 1000},
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "filesize_approx": 500}
            ]
        });

        let info = parse_media_info(&json).unwrap();
        assert_eq!(info.title, "Never Gonna Give You Up");
        assert_eq!(info.duration, Some(212.0));
        assert_eq!(info.uploader.as_deref(), Some("Rick Astley"));
        assert_eq!(info.formats.len(), 2);
        assert_eq!(info.formats[0].height, Some(360));
        assert_eq!(info.formats[1].filesize, Some(500));
    }

    #[test]
    fn test_parse_media_info_defaults() {
        assert!(parse_media_info(&Value::Null).is_none());

        let info = parse_media_info(&json!({"id": "x"})).unwrap();
        assert_eq!(info.title, "Unknown Title");
        assert!(info.formats.is_empty());
        assert!(info.duration.is_none());
    }

    #[test]
    fn test_progress_update_parse() {
        let update = ProgressUpdate::parse("[progress] 500 1000 NA 250.5 2").unwrap();
        assert_eq!(update.downloaded_bytes, 500);
        assert_eq!(update.total_bytes, Some(1000));
        assert_eq!(update.eta_secs, Some(2));
        assert_eq!(update.percent(), Some(50.0));

        let estimated = ProgressUpdate::parse("[progress] 10 NA 40.0 NA NA").unwrap();
        assert_eq!(estimated.total_bytes, Some(40));
        assert!(estimated.speed.is_none());

        assert!(ProgressUpdate::parse("[download] Destination: a.mp4").is_none());
        assert!(ProgressUpdate::parse("[progress] 1 2").is_none());
    }

    #[test]
    fn test_progress_logged_once_per_step() {
        let mut logger = ProgressLogger::default();
        let at = |done: u64| ProgressUpdate {
            downloaded_bytes: done,
            total_bytes: Some(100),
            speed: Some(1024.0),
            eta_secs: Some(3),
        };

        assert!(logger.observe(&at(1)));
        assert!(!logger.observe(&at(5)));
        assert!(logger.observe(&at(12)));
        assert!(!logger.observe(&at(19)));
        assert!(logger.observe(&at(100)));

        let unknown_total = ProgressUpdate {
            total_bytes: None,
            ..at(50)
        };
        assert!(!logger.observe(&unknown_total));
    }

    #[tokio::test]
    async fn test_collect_output_separates_progress() {
        let output: &[u8] = b"[progress] 10 100 NA 5 1\n\n/srv/downloads/Title.mp4\n[progress] 100 100 NA 5 0\n";
        let progress = Mutex::new(ProgressLogger::default());

        let lines = collect_output(output, &progress).await;
        assert_eq!(lines, vec!["/srv/downloads/Title.mp4".to_string()]);
        assert_eq!(progress.lock().last_step, Some(10));
    }

    #[test]
    fn test_last_error_line() {
        let stderr = "WARNING: slow\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(last_error_line(stderr), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(last_error_line(""), "yt-dlp failed without output");
    }
}
