// Diagnostic HTTP readiness check

use crate::{ProbeError, ProbeResult, ProbeTarget, ReadinessCheck};
use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Endpoint fetched on the diagnostics port
pub const DEFAULT_DIAGNOSTIC_PATH: &str = "/debug/pprof/heap";

/// Fetches a diagnostic endpoint and drains the body.
///
/// Any response counts as success: the status code is not inspected, only
/// that the server accepted the connection and produced a complete reply.
#[derive(Debug, Clone)]
pub struct DiagnosticHttpCheck {
    path: String,
    timeout: Duration,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl DiagnosticHttpCheck {
    pub fn new(check_timeout: Duration) -> Self {
        Self {
            path: DEFAULT_DIAGNOSTIC_PATH.to_string(),
            timeout: check_timeout,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn endpoint(&self, target: &ProbeTarget) -> String {
        format!("http://{}:{}{}", target.host, target.http_port, self.path)
    }

    async fn fetch(&self, endpoint: &str) -> ProbeResult<(u16, usize)> {
        let uri: Uri = endpoint.parse().map_err(|e| ProbeError::InvalidResponse {
            id: endpoint.to_string(),
            response: format!("Invalid URI: {}", e),
        })?;

        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("User-Agent", "benchvisor/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::InvalidResponse {
                id: endpoint.to_string(),
                response: format!("Failed to build request: {}", e),
            })?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProbeError::ConnectionFailed {
                id: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProbeError::InvalidResponse {
                id: endpoint.to_string(),
                response: format!("Failed to read body: {}", e),
            })?
            .to_bytes();

        Ok((status, body.len()))
    }
}

#[async_trait]
impl ReadinessCheck for DiagnosticHttpCheck {
    fn name(&self) -> &'static str {
        "diagnostic-http"
    }

    async fn check(&self, target: &ProbeTarget) -> ProbeResult<()> {
        let endpoint = self.endpoint(target);
        let start_time = std::time::Instant::now();

        match timeout(self.timeout, self.fetch(&endpoint)).await {
            Ok(Ok((status, body_len))) => {
                debug!(
                    "Diagnostic check complete: {} - status={} bytes={} time={}ms",
                    endpoint,
                    status,
                    body_len,
                    start_time.elapsed().as_millis()
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProbeError::Timeout { id: endpoint }),
        }
    }
}
