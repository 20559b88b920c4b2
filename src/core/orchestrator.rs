//! Download job orchestration
//!
//! A submission is validated and its metadata resolved while the caller
//! waits; the download itself runs as a detached task tracked by
//! [`JobRegistry`]. Finished downloads land in the [`Catalog`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::catalog::Catalog;
use crate::core::config::DownloadConfig;
use crate::core::cookies::{CookieBundle, CookieHarvester};
use crate::core::extractor::{DownloadOptions, Extractor};
use crate::core::models::{AppError, AppResult, MediaInfo, VideoRecord};
use crate::utils::file_utils::find_file_containing;
use crate::utils::validation::is_valid_youtube_url;

/// Fixed-delay retry for background downloads
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

/// Result of an accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub job_id: Uuid,
    pub title: String,
}

/// Handles of background download jobs
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job_id: Uuid, handle: JoinHandle<()>) {
        let mut jobs = self.jobs.lock();
        jobs.retain(|_, h| !h.is_finished());
        jobs.insert(job_id, handle);
    }

    /// Jobs still running
    pub fn active(&self) -> usize {
        self.jobs.lock().values().filter(|h| !h.is_finished()).count()
    }

    /// Wait for one job; false when the id is unknown or already pruned
    pub async fn wait(&self, job_id: Uuid) -> bool {
        let handle = self.jobs.lock().remove(&job_id);
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Job {} panicked: {}", job_id, e);
                }
                true
            }
            None => false,
        }
    }

    /// Wait for every registered job
    pub async fn wait_all(&self) {
        let handles: Vec<(Uuid, JoinHandle<()>)> = self.jobs.lock().drain().collect();
        for (job_id, handle) in handles {
            if let Err(e) = handle.await {
                error!("Job {} panicked: {}", job_id, e);
            }
        }
    }
}

pub struct JobOrchestrator {
    extractor: Arc<dyn Extractor>,
    harvester: Arc<CookieHarvester>,
    catalog: Catalog,
    registry: JobRegistry,
    base_options: Arc<DownloadOptions>,
    cookie_domain: String,
    retry: RetryPolicy,
}

impl JobOrchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        harvester: CookieHarvester,
        catalog: Catalog,
        base_options: DownloadOptions,
    ) -> Self {
        Self {
            extractor,
            harvester: Arc::new(harvester),
            catalog,
            registry: JobRegistry::new(),
            base_options: Arc::new(base_options),
            cookie_domain: ".youtube.com".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = domain.into();
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn base_options(&self) -> &DownloadOptions {
        &self.base_options
    }

    /// Validate, resolve metadata and start the download in the background
    pub async fn submit(&self, url: &str) -> AppResult<Submission> {
        if url.is_empty() {
            return Err(AppError::InvalidInput("URL is required".to_string()));
        }
        if !is_valid_youtube_url(url) {
            warn!("Invalid URL format: {}", url);
            return Err(AppError::InvalidInput("Invalid YouTube URL".to_string()));
        }
        info!("Processing URL: {}", url);

        let cookies = self.harvest_cookies().await;
        let options = match cookies {
            Some(ref bundle) => {
                info!("Using cookies from {}", bundle.source());
                self.base_options.with_cookie_file(bundle.path())
            }
            None => {
                warn!("No browser cookies found, trying without cookies");
                self.base_options.as_ref().clone()
            }
        };

        let info = match self.resolve_metadata(url, &options).await {
            Ok(info) => info,
            Err(e) => {
                error!("Error during video info extraction: {}", e);
                if let Some(bundle) = cookies {
                    bundle.remove();
                }
                return Err(e);
            }
        };

        let job_id = Uuid::new_v4();
        let title = info.title.clone();
        let job = DownloadJob {
            job_id,
            url: url.to_string(),
            info,
            options,
            cookies,
            extractor: Arc::clone(&self.extractor),
            catalog: self.catalog.clone(),
            retry: self.retry.clone(),
        };

        self.registry.insert(job_id, tokio::spawn(job.run()));
        info!("📥 Download job {} started: {}", job_id, title);

        Ok(Submission { job_id, title })
    }

    async fn harvest_cookies(&self) -> Option<CookieBundle> {
        let harvester = Arc::clone(&self.harvester);
        let domain = self.cookie_domain.clone();
        match tokio::task::spawn_blocking(move || harvester.harvest(&domain)).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("Cookie harvesting task failed: {}", e);
                None
            }
        }
    }

    async fn resolve_metadata(&self, url: &str, options: &DownloadOptions) -> AppResult<MediaInfo> {
        let info = self
            .extractor
            .extract_info(url, options)
            .await?
            .ok_or_else(|| AppError::Extraction("Failed to extract video information".to_string()))?;

        if info.formats.is_empty() {
            return Err(AppError::Extraction(
                "No available formats found for this video".to_string(),
            ));
        }
        debug!("Resolved {} formats for {}", info.formats.len(), info.title);
        Ok(info)
    }
}

struct DownloadJob {
    job_id: Uuid,
    url: String,
    info: MediaInfo,
    options: DownloadOptions,
    cookies: Option<CookieBundle>,
    extractor: Arc<dyn Extractor>,
    catalog: Catalog,
    retry: RetryPolicy,
}

impl DownloadJob {
    async fn run(mut self) {
        match self.download_with_retry().await {
            Ok(reported) => self.record_output(reported).await,
            Err(e) => error!(
                "Download task error for {} ({}): {}",
                self.info.title, self.job_id, e
            ),
        }

        if let Some(bundle) = self.cookies.take() {
            bundle.remove();
        }
    }

    async fn download_with_retry(&self) -> AppResult<Option<PathBuf>> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            info!("Download attempt {} of {}", attempt, max_attempts);
            match self.extractor.download(&self.url, &self.options).await {
                Ok(reported) => return Ok(reported),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "Download failed, retrying ({}/{}): {}",
                        attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.retry.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reported path, then `<dir>/<title>.mp4`, then any entry containing the title
    fn resolve_output(&self, reported: Option<PathBuf>) -> Option<PathBuf> {
        if let Some(path) = reported {
            if path.is_file() {
                return Some(path);
            }
            debug!("Reported output {:?} does not exist", path);
        }

        let exact = self
            .options
            .output_dir
            .join(format!("{}.mp4", self.info.title));
        if exact.is_file() {
            return Some(exact);
        }

        find_file_containing(&self.options.output_dir, &self.info.title)
    }

    async fn record_output(&self, reported: Option<PathBuf>) {
        let Some(path) = self.resolve_output(reported) else {
            error!("Downloaded file not found for: {}", self.info.title);
            return;
        };

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                error!("Failed to stat {:?}: {}", path, e);
                return;
            }
        };

        self.catalog
            .append(VideoRecord::from_media(&self.info, path.clone(), size));
        info!("✅ Download completed: {} -> {:?}", self.info.title, path);
    }
}
