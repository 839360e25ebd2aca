//! Application performance monitoring export.
//!
//! Timings are shipped to an external ingest endpoint as JSON, fire and
//! forget. A slow or absent APM backend must never slow a request down,
//! so sends happen on a spawned task and failures only log.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

/// Timeout for APM posts; generous would defeat the purpose.
const APM_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct TimingSample<'a> {
    operation: &'a str,
    duration_ms: u128,
    status: Option<u16>,
}

/// Ships timing samples to an APM ingest endpoint.
#[derive(Clone)]
pub struct ApmService {
    http: reqwest::Client,
    endpoint: String,
}

impl ApmService {
    pub fn new(endpoint: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(APM_TIMEOUT)
            .build()
            .context("failed to build APM HTTP client")?;

        Ok(Self { http, endpoint })
    }

    /// Record one operation timing. Returns immediately; the post runs
    /// in the background.
    pub fn record_timing(&self, operation: &str, duration_ms: u128, status: Option<u16>) {
        let sample = TimingSample {
            operation,
            duration_ms,
            status,
        };

        let body = match serde_json::to_string(&sample) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to serialize APM sample");
                return;
            }
        };

        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let operation = operation.to_string();

        tokio::spawn(async move {
            match http
                .post(&endpoint)
                .header("content-type", "application/json")
                .body(body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    debug!(operation = %operation, "APM sample shipped");
                }
                Ok(response) => {
                    warn!(operation = %operation, status = %response.status(), "APM ingest rejected sample");
                }
                Err(e) => {
                    warn!(operation = %operation, error = %e, "APM sample failed to send");
                }
            }
        });
    }
}

impl std::fmt::Debug for ApmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApmService")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
