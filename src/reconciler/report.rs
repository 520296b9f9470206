//! Outcome callback to the control plane.
//!
//! Delivery is best-effort: the job store already holds the outcome, so a
//! failed POST is logged by the caller and never retried.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{ArtifactRef, ErrorKind, ExecOutcome, RunStatus};
use crate::error::{Result, RunnerError};

/// Path of the callback endpoint under the control-plane base URL.
pub const REPORT_PATH: &str = "/api/runner/report";

/// JSON document POSTed for every finished execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeReport {
    pub run_id: String,
    pub status: RunStatus,
    pub error_kind: ErrorKind,
    pub summary: String,
    pub artifacts: Vec<ArtifactRef>,
}

impl OutcomeReport {
    pub fn new(run_id: impl Into<String>, outcome: &ExecOutcome) -> Self {
        Self {
            run_id: run_id.into(),
            status: outcome.status,
            error_kind: outcome.error_kind,
            summary: outcome.summary.clone(),
            artifacts: outcome.artifacts.clone(),
        }
    }
}

/// Sink for outcome reports.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, report: &OutcomeReport) -> Result<()>;
}

/// Reporter that POSTs to `{base_url}/api/runner/report`.
pub struct HttpReporter {
    client: Client,
    endpoint: String,
}

impl HttpReporter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RunnerError::Report(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), REPORT_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn report(&self, report: &OutcomeReport) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(report)
            .send()
            .await
            .map_err(|e| RunnerError::Report(format!("POST {}: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RunnerError::Report(format!("POST {} returned {}", self.endpoint, status)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArtifactKind;
    use crate::testing::{request_body, serve_once};
    use tokio::net::TcpListener;

    fn sample() -> OutcomeReport {
        let outcome = ExecOutcome::failed(
            ErrorKind::TestFailed,
            "exit status 1",
            vec![ArtifactRef::new(ArtifactKind::Log, "run-1/log.txt")],
        );
        OutcomeReport::new("run-1", &outcome)
    }

    #[test]
    fn test_report_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "run_id": "run-1",
                "status": "failed",
                "error_kind": "test_failed",
                "summary": "exit status 1",
                "artifacts": [{"type": "log", "uri": "run-1/log.txt"}]
            })
        );
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let reporter = HttpReporter::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(reporter.endpoint(), "http://localhost:3000/api/runner/report");
    }

    #[tokio::test]
    async fn test_posts_json_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 200 OK"));

        let reporter = HttpReporter::new(&base, Duration::from_secs(5)).unwrap();
        reporter.report(&sample()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/runner/report HTTP/1.1"));
        let body: OutcomeReport = serde_json::from_value(request_body(&request)).unwrap();
        assert_eq!(body, sample());
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 500 Internal Server Error"));

        let reporter = HttpReporter::new(&base, Duration::from_secs(5)).unwrap();
        let err = reporter.report(&sample()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Report(_)));
        assert!(err.to_string().contains("500"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let reporter = HttpReporter::new(&base, Duration::from_secs(2)).unwrap();
        assert!(reporter.report(&sample()).await.is_err());
    }
}
