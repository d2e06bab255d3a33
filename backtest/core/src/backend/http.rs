//! HTTP Backend Implementation
//!
//! Client for the remote backtest service. One [`BacktestService`] serves
//! both collaborators of the core:
//!
//! - `POST /{version}/backtest` - submit a configuration, returns `{ "jobId": ... }`
//! - `POST /{version}/train` - submit a training request
//! - `GET /{version}/stream?jobId=...&t=...` - server-sent events for a job
//!
//! The stream request carries no total timeout (it is expected to stay open
//! for the whole run); only connection establishment is bounded.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::traits::{ApiError, EventTransport, JobSubmitter, StreamSignal, TransportError};
use crate::config::ClientConfig;
use crate::job::JobId;
use crate::strategy::StrategyConfig;
use crate::streaming::SseDecoder;

/// Default capacity of the per-stream signal channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// HTTP client for the backtest service
#[derive(Clone, Debug)]
pub struct BacktestService {
    /// Base URL, e.g. `http://localhost:8000`
    base_url: String,
    /// API version path segment (may be empty)
    version: String,
    /// Timeout for request/response calls
    request_timeout: Duration,
    /// Capacity of the signal channel handed to the session manager
    channel_capacity: usize,
    /// HTTP client
    http_client: reqwest::Client,
}

impl BacktestService {
    /// Create a client for the given base URL and API version
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        version: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(base_url, version, request_timeout, http_client))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_client(
        base_url: impl Into<String>,
        version: impl Into<String>,
        request_timeout: Duration,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            version: version.into(),
            request_timeout,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            http_client,
        }
    }

    /// Create from the loaded client configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut service = Self::new(
            config.api_base.clone(),
            config.api_version.clone(),
            config.request_timeout,
        )?;
        service.channel_capacity = config.stream.channel_capacity.max(1);
        Ok(service)
    }

    /// Set the signal channel capacity
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// URL of an endpoint below the versioned API root
    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let version = self.version.trim_matches('/');
        if version.is_empty() {
            format!("{base}/{path}")
        } else {
            format!("{base}/{version}/{path}")
        }
    }

    /// Stream URL for a job, with a cache-busting timestamp
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the base URL is not a valid URL.
    pub fn stream_url(&self, job_id: &JobId) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.endpoint("stream"))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("jobId", job_id.as_str())
            .append_pair("t", &chrono::Utc::now().timestamp_millis().to_string());
        Ok(url)
    }

    async fn post_json(&self, path: &str, config: &StrategyConfig) -> Result<String, ApiError> {
        let url = self.endpoint(path);
        debug!(url = %url, "POST");

        let response = self
            .http_client
            .post(&url)
            .header(CACHE_CONTROL, "no-store")
            .timeout(self.request_timeout)
            .json(config)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "Request rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl JobSubmitter for BacktestService {
    async fn submit_backtest(&self, config: &StrategyConfig) -> Result<JobId, ApiError> {
        let body = self.post_json("backtest", config).await?;
        let data: Value = serde_json::from_str(&body)?;
        let job_id = match data.get("jobId") {
            Some(Value::String(id)) => JobId::parse(id),
            Some(Value::Number(id)) => JobId::parse(&id.to_string()),
            _ => None,
        }
        .ok_or(ApiError::MissingJobId)?;

        info!(job_id = %job_id, "Backtest submitted");
        Ok(job_id)
    }

    async fn train(&self, config: &StrategyConfig) -> Result<Value, ApiError> {
        let body = self.post_json("train", config).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl EventTransport for BacktestService {
    fn name(&self) -> &'static str {
        "http-sse"
    }

    async fn connect(&self, job_id: &JobId) -> Result<mpsc::Receiver<StreamSignal>, TransportError> {
        let url = self.stream_url(job_id)?;
        debug!(job_id = %job_id, url = %url, "Opening event stream");

        let response = self
            .http_client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let mut stream = response.bytes_stream();
        let job_id = job_id.clone();

        // Spawn task to decode the body; dropping `stream` closes the connection
        tokio::spawn(async move {
            if tx.send(StreamSignal::Open).await.is_err() {
                return;
            }

            let mut decoder = SseDecoder::new();
            loop {
                let chunk = tokio::select! {
                    () = tx.closed() => {
                        debug!(job_id = %job_id, "Stream receiver dropped, releasing connection");
                        return;
                    }
                    chunk = stream.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        for frame in decoder.feed(&bytes) {
                            if tx.send(StreamSignal::Message(frame)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(StreamSignal::Error(e.to_string())).await;
                        return;
                    }
                    None => {
                        if let Some(frame) = decoder.finish() {
                            let _ = tx.send(StreamSignal::Message(frame)).await;
                        }
                        debug!(
                            job_id = %job_id,
                            bytes = decoder.bytes_received(),
                            "Event stream body ended"
                        );
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str, version: &str) -> BacktestService {
        BacktestService::new(base, version, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let svc = service("http://localhost:8000/", "/v1/");
        assert_eq!(svc.endpoint("backtest"), "http://localhost:8000/v1/backtest");

        let svc = service("http://localhost:8000", "");
        assert_eq!(svc.endpoint("train"), "http://localhost:8000/train");
    }

    #[test]
    fn test_stream_url_encodes_job_id() {
        let svc = service("http://example.com", "v2");
        let job = JobId::parse("job 1/&x").unwrap();
        let url = svc.stream_url(&job).unwrap();

        assert_eq!(url.path(), "/v2/stream");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("jobId".to_string(), "job 1/&x".to_string()));
        assert_eq!(pairs[1].0, "t");
        assert!(pairs[1].1.parse::<i64>().is_ok());
    }

    #[test]
    fn test_stream_url_rejects_bad_base() {
        let svc = service("not a url", "v1");
        let job = JobId::parse("a").unwrap();
        assert!(matches!(
            svc.stream_url(&job),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let mut config = ClientConfig::default();
        config.api_base = "http://backtest.internal:9000".to_string();
        config.api_version = "v3".to_string();
        config.stream.channel_capacity = 0;

        let svc = BacktestService::from_config(&config).unwrap();
        assert_eq!(svc.endpoint("stream"), "http://backtest.internal:9000/v3/stream");
        assert_eq!(svc.channel_capacity, 1);
        assert_eq!(svc.name(), "http-sse");
    }
}
