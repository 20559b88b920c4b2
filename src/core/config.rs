//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::cookies::Browser;
use super::models::{ProxyEndpoint, ProxyScheme};
use crate::utils::network::BROWSER_USER_AGENT;

/// Environment variable marking a serverless deployment with a read-only app root
pub const CLOUD_ENV_VAR: &str = "VERCEL";

/// Main application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub proxy: ProxyConfig,
    pub download: DownloadConfig,
    pub cookies: CookieConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub enable_cors: bool,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub download_dir: PathBuf,
    pub static_dir: PathBuf,
    pub templates_dir: PathBuf,
}

/// Local proxy probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub probe_on_startup: bool,
    pub host: String,
    pub port: u16,
    /// Ports scanned by `ytfront probe` when `port` is closed
    pub candidate_ports: Vec<u16>,
    pub schemes: Vec<ProxyScheme>,
    pub test_urls: Vec<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

/// Extraction tool and job retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub ytdlp_path: PathBuf,
    pub format: String,
    pub merge_output_format: String,
    pub socket_timeout_secs: u64,
    /// Retries performed inside the extraction tool itself
    pub retries: u32,
    pub fragment_retries: u32,
    pub user_agent: String,
    /// Proxy used before (or without) a successful probe
    pub proxy: Option<String>,
    pub no_check_certificate: bool,
    /// Whole-download attempts made by a background job
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

/// Browser cookie harvesting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub enabled: bool,
    pub domain: String,
    pub browsers: Vec<Browser>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            enable_cors: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::rooted_at(Path::new(""))
    }
}

impl PathsConfig {
    /// All directories under `root`
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            download_dir: root.join("downloads"),
            static_dir: root.join("static"),
            templates_dir: root.join("templates"),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            probe_on_startup: true,
            host: "127.0.0.1".to_string(),
            port: 1080,
            candidate_ports: vec![1080, 1081, 1082, 10808],
            schemes: vec![ProxyScheme::Socks5h, ProxyScheme::Socks5, ProxyScheme::Http],
            test_urls: vec![
                "https://api.ipify.org?format=json".to_string(),
                "https://www.youtube.com/favicon.ico".to_string(),
                "https://www.google.com/generate_204".to_string(),
            ],
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
        }
    }
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            format: "best".to_string(),
            merge_output_format: "mp4".to_string(),
            socket_timeout_secs: 30,
            retries: 5,
            fragment_retries: 5,
            user_agent: BROWSER_USER_AGENT.to_string(),
            proxy: Some("socks5h://127.0.0.1:1080".to_string()),
            no_check_certificate: true,
            max_attempts: 3,
            retry_delay_secs: 2,
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            domain: ".youtube.com".to_string(),
            browsers: Browser::ALL.to_vec(),
        }
    }
}

impl AppConfig {
    /// Load configuration: explicit file, else the platform config file if present, else defaults.
    /// Environment overrides are applied and the result validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::get_config_path() {
                Ok(path) if path.exists() => Self::load_from_file(&path)?,
                _ => {
                    tracing::debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AppConfig =
            serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;

        tracing::info!("Loaded configuration from: {:?}", path);
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Saved configuration to: {:?}", path);
        Ok(())
    }

    /// Get the path to the platform configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "ytfront", "ytfront")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Apply environment overrides read through `var`
    pub fn apply_env_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if var(CLOUD_ENV_VAR).is_some() {
            self.paths = PathsConfig::rooted_at(&std::env::temp_dir());
            tracing::info!(
                "Cloud deployment detected, using temp directory root: {:?}",
                std::env::temp_dir()
            );
        }

        if let Some(bind) = var("BIND_ADDRESS") {
            self.server.bind_address = bind;
        }
        if let Some(dir) = var("YTFRONT_DOWNLOAD_DIR") {
            self.paths.download_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("YTDLP_PATH") {
            self.download.ytdlp_path = PathBuf::from(path);
        }

        let env_proxy = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"]
            .iter()
            .find_map(|key| var(key).filter(|value| !value.trim().is_empty()));
        if let Some(proxy) = env_proxy {
            match ProxyEndpoint::parse(proxy.trim()) {
                Ok(endpoint) => {
                    self.proxy.host = endpoint.host.clone();
                    self.proxy.port = endpoint.port;
                    self.download.proxy = Some(endpoint.url());
                }
                Err(e) => tracing::warn!("Ignoring proxy from environment: {}", e),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind_address))?;

        if self.proxy.port == 0 {
            anyhow::bail!("Proxy port must be greater than 0");
        }
        if self.proxy.schemes.is_empty() {
            anyhow::bail!("At least one proxy scheme is required");
        }
        if self.proxy.test_urls.is_empty() {
            anyhow::bail!("At least one proxy test URL is required");
        }
        if self.proxy.request_timeout_secs == 0 {
            anyhow::bail!("Proxy request timeout must be greater than 0");
        }

        if self.download.max_attempts == 0 {
            anyhow::bail!("Download attempts must be greater than 0");
        }
        if self.download.format.trim().is_empty() {
            anyhow::bail!("Download format must not be empty");
        }
        if let Some(ref proxy) = self.download.proxy {
            ProxyEndpoint::parse(proxy).with_context(|| "Invalid download proxy")?;
        }

        if self.cookies.enabled && self.cookies.domain.trim_start_matches('.').is_empty() {
            anyhow::bail!("Cookie domain must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.download.max_attempts, 3);
        assert_eq!(config.download.retry_delay_secs, 2);
        assert_eq!(config.proxy.port, 1080);
        assert_eq!(config.paths.download_dir, PathBuf::from("downloads"));
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = AppConfig::default();
        config.download.max_attempts = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.proxy.schemes.clear();
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.server.bind_address = "not an address".to_string();
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.download.proxy = Some("ftp://127.0.0.1:21".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.server.bind_address = "127.0.0.1:9000".to_string();
        config.cookies.browsers = vec![Browser::Firefox];
        config.save(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.bind_address, "127.0.0.1:9000");
        assert_eq!(loaded.cookies.browsers, vec![Browser::Firefox]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"download": {"max_attempts": 5}}"#).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.download.max_attempts, 5);
        assert_eq!(loaded.download.format, "best");
        assert_eq!(loaded.proxy.test_urls.len(), 3);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("BIND_ADDRESS", "127.0.0.1:8080"),
            ("HTTPS_PROXY", "http://10.0.0.2:3128"),
            ("YTDLP_PATH", "/opt/bin/yt-dlp"),
        ]));

        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.proxy.host, "10.0.0.2");
        assert_eq!(config.proxy.port, 3128);
        assert_eq!(config.download.proxy.as_deref(), Some("http://10.0.0.2:3128"));
        assert_eq!(config.download.ytdlp_path, PathBuf::from("/opt/bin/yt-dlp"));
    }

    #[test]
    fn test_invalid_env_proxy_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[("HTTP_PROXY", "garbage")]));
        assert_eq!(config.proxy.port, 1080);
        assert_eq!(
            config.download.proxy.as_deref(),
            Some("socks5h://127.0.0.1:1080")
        );
    }

    #[test]
    fn test_cloud_env_uses_temp_root() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[(CLOUD_ENV_VAR, "1")]));
        assert_eq!(
            config.paths.download_dir,
            std::env::temp_dir().join("downloads")
        );
        assert_eq!(config.paths.static_dir, std::env::temp_dir().join("static"));
    }
}
