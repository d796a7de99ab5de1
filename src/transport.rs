//! Network transport - how batches leave the node
//!
//! The uploader only needs two things from the network: "is the collector
//! reachable right now?" and "POST this body". [`HttpTransport`] does both
//! with reqwest and a bounded TCP probe.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// what the collector answered
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport: Send + Sync {
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: String,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

pub struct HttpTransport {
    client: reqwest::Client,
    host: String,
    port: u16,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: &str, request_timeout: Duration, probe_timeout: Duration) -> Result<Self, TransportError> {
        let url = reqwest::Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("{}: missing host", endpoint)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("{}: missing port", endpoint)))?;
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, host, port, probe_timeout })
    }
}

impl Transport for HttpTransport {
    async fn is_connected(&self) -> bool {
        let connect = tokio::net::TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.probe_timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(host = %self.host, port = self.port, "collector unreachable: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!(host = %self.host, port = self.port, "collector probe timed out");
                false
            }
        }
    }

    async fn post(&self, url: &str, content_type: &str, body: String) -> Result<Response, TransportError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(endpoint: &str) -> Result<HttpTransport, TransportError> {
        HttpTransport::new(endpoint, Duration::from_secs(1), Duration::from_millis(200))
    }

    #[test]
    fn test_endpoint_parsing() {
        let t = transport("http://micr0.dev:8080/data").unwrap();
        assert_eq!(t.host, "micr0.dev");
        assert_eq!(t.port, 8080);

        let t = transport("https://collector.example/data").unwrap();
        assert_eq!(t.port, 443);
    }

    #[test]
    fn test_bad_endpoint() {
        assert!(matches!(transport("not a url"), Err(TransportError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_success_range() {
        assert!(Response { status: 200, body: String::new() }.is_success());
        assert!(!Response { status: 500, body: String::new() }.is_success());
    }

    #[tokio::test]
    async fn test_probe_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let t = transport(&format!("http://127.0.0.1:{}/data", port)).unwrap();
        assert!(t.is_connected().await);

        drop(listener);
        assert!(!t.is_connected().await);
    }
}
