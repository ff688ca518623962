//! HTTP client for starting an analysis job and receiving its event stream.

use anyhow::Context;
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use super::aggregator::{consume_until, AnalysisRunState};
use crate::types::PipelineError;

const QUOTA_PHRASE: &str = "limit reached";

pub struct AnalysisClient {
    http: Client,
    endpoint: String,
}

impl AnalysisClient {
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> anyhow::Result<Self> {
        // No overall timeout: a card analysis streams for minutes.
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("mafs/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build analysis HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST the job payload and return the response body as a byte stream.
    pub async fn start<P: Serialize + ?Sized>(
        &self,
        payload: &P,
    ) -> Result<impl Stream<Item = Result<Vec<u8>, reqwest::Error>>, PipelineError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| PipelineError::FatalStream(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_rejection(status, &body));
        }

        info!(endpoint = %self.endpoint, "Analysis stream opened");
        Ok(response.bytes_stream().map(|r| r.map(|b| b.to_vec())))
    }

    /// Start a job and consume its stream until done or `shutdown` fires.
    pub async fn run<P, F>(&self, payload: &P, shutdown: F) -> Result<AnalysisRunState, PipelineError>
    where
        P: Serialize + ?Sized,
        F: std::future::Future<Output = ()>,
    {
        let stream = self.start(payload).await?;
        Ok(consume_until(stream, shutdown).await)
    }
}

/// Map a non-2xx job response onto the error taxonomy.
pub fn classify_rejection(status: StatusCode, body: &str) -> PipelineError {
    if status == StatusCode::PAYMENT_REQUIRED || body.to_lowercase().contains(QUOTA_PHRASE) {
        warn!(%status, "Analysis rejected: usage limit");
        return PipelineError::QuotaExceeded(first_line(body, status));
    }
    warn!(%status, body, "Analysis rejected");
    PipelineError::FatalStream(format!("HTTP {status}: {}", first_line(body, status)))
}

fn first_line(body: &str, status: StatusCode) -> String {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}
