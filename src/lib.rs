//! ytfront - Core Library
//!
//! HTTP front-end for YouTube downloads through the yt-dlp tool: proxy
//! probing, browser cookie harvesting, background download jobs and an
//! in-memory catalog of finished videos.

pub mod api;
pub mod core;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{
    catalog::Catalog,
    config::AppConfig,
    cookies::{Browser, CookieHarvester},
    extractor::{DownloadOptions, Extractor, YtDlpExtractor},
    models::{AppError, AppResult, MediaInfo, ProxyEndpoint, VideoRecord},
    orchestrator::{JobOrchestrator, RetryPolicy, Submission},
    proxy_prober::ProxyProber,
};

use std::sync::Arc;

use crate::utils::file_utils::ensure_dir_exists;

/// Application state shared between HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub proxy: Option<ProxyEndpoint>,
}

impl AppState {
    /// Build the production service: yt-dlp extractor, browser cookie
    /// harvester and the probed proxy (if any) applied to download options.
    pub fn new(config: AppConfig, proxy: Option<ProxyEndpoint>) -> anyhow::Result<Self> {
        ensure_dir_exists(&config.paths.download_dir)?;
        ensure_dir_exists(&config.paths.static_dir)?;

        let mut options = DownloadOptions::from_config(&config.download, &config.paths.download_dir);
        if let Some(ref endpoint) = proxy {
            options = options.with_proxy(endpoint);
        }

        let harvester = if config.cookies.enabled {
            CookieHarvester::for_browsers(&config.cookies.browsers)
        } else {
            CookieHarvester::disabled()
        };

        let extractor = Arc::new(YtDlpExtractor::new(&config.download.ytdlp_path));
        let orchestrator = JobOrchestrator::new(extractor, harvester, Catalog::new(), options)
            .with_retry_policy(RetryPolicy::from_config(&config.download))
            .with_cookie_domain(config.cookies.domain.clone());

        tracing::info!(
            "🚀 Service ready (download dir: {:?}, proxy: {})",
            config.paths.download_dir,
            proxy
                .as_ref()
                .map(|p| p.url())
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(Self::with_orchestrator(config, orchestrator, proxy))
    }

    pub fn with_orchestrator(
        config: AppConfig,
        orchestrator: JobOrchestrator,
        proxy: Option<ProxyEndpoint>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            proxy,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        self.orchestrator.catalog()
    }
}
