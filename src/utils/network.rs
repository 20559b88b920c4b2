//! Network utilities and helpers

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Browser User-Agent sent by the extraction tool
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Check whether something accepts TCP connections on `host:port`
pub async fn is_port_open(host: &str, port: u16, connect_timeout: Duration) -> bool {
    match timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            tracing::debug!("Connect to {}:{} failed: {}", host, port, e);
            false
        }
        Err(_) => {
            tracing::debug!("Connect to {}:{} timed out", host, port);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_open("127.0.0.1", port, Duration::from_secs(1)).await);

        drop(listener);
        assert!(!is_port_open("127.0.0.1", port, Duration::from_secs(1)).await);
    }
}
