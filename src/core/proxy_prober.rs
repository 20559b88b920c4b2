//! Local proxy discovery and verification
//!
//! Startup checks that something listens on the configured proxy port, then
//! tries each scheme against a few well-known URLs until one answers.

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::ProxyConfig;
use crate::core::models::{AppResult, ProxyEndpoint, ProxyScheme};
use crate::utils::network::{is_port_open, BROWSER_USER_AGENT};

/// Connect timeout used while scanning candidate ports
pub const DISCOVERY_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// One HTTP request through a proxy
#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    /// `Ok(true)` when `test_url` answered 200 or 204 through `endpoint`
    async fn check(&self, endpoint: &ProxyEndpoint, test_url: &str) -> AppResult<bool>;
}

pub struct ReqwestConnectivityCheck {
    timeout: Duration,
}

impl ReqwestConnectivityCheck {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ConnectivityCheck for ReqwestConnectivityCheck {
    async fn check(&self, endpoint: &ProxyEndpoint, test_url: &str) -> AppResult<bool> {
        let client = Client::builder()
            .proxy(Proxy::all(endpoint.url())?)
            .danger_accept_invalid_certs(true)
            .timeout(self.timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        let response = client.get(test_url).send().await?;
        let status = response.status().as_u16();
        debug!("{} via {} -> {}", test_url, endpoint, status);
        Ok(matches!(status, 200 | 204))
    }
}

pub struct ProxyProber {
    host: String,
    port: u16,
    schemes: Vec<ProxyScheme>,
    test_urls: Vec<String>,
    connect_timeout: Duration,
    check: Arc<dyn ConnectivityCheck>,
}

impl ProxyProber {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            schemes: config.schemes.clone(),
            test_urls: config.test_urls.clone(),
            connect_timeout: config.connect_timeout(),
            check: Arc::new(ReqwestConnectivityCheck::new(config.request_timeout())),
        }
    }

    pub fn with_check(mut self, check: Arc<dyn ConnectivityCheck>) -> Self {
        self.check = check;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// First working endpoint, or `None` when the port is closed or nothing answers
    pub async fn probe(&self) -> Option<ProxyEndpoint> {
        info!("🔍 Probing proxy at {}:{}", self.host, self.port);

        if !is_port_open(&self.host, self.port, self.connect_timeout).await {
            warn!("Proxy port {}:{} is not open", self.host, self.port);
            return None;
        }

        for scheme in &self.schemes {
            let endpoint = ProxyEndpoint::new(*scheme, self.host.clone(), self.port);
            for test_url in &self.test_urls {
                match self.check.check(&endpoint, test_url).await {
                    Ok(true) => {
                        info!("✅ Proxy {} works (verified with {})", endpoint, test_url);
                        return Some(endpoint);
                    }
                    Ok(false) => debug!("{} via {}: unexpected status", test_url, endpoint),
                    Err(e) => debug!("{} via {} failed: {}", test_url, endpoint, e),
                }
            }
        }

        warn!("No working proxy configuration found at {}:{}", self.host, self.port);
        None
    }
}

/// First of `candidates` accepting TCP connections on `host`
pub async fn discover_port(host: &str, candidates: &[u16]) -> Option<u16> {
    for &port in candidates {
        if is_port_open(host, port, DISCOVERY_CONNECT_TIMEOUT).await {
            info!("Found open proxy port {}:{}", host, port);
            return Some(port);
        }
    }
    None
}
