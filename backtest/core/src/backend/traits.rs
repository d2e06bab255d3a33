//! Backend Traits
//!
//! Trait definitions for the two remote collaborators of the core: the
//! server-push event stream for a job, and job submission. The session
//! manager and the run controller only see these traits, so they can be
//! driven by scripted in-memory implementations in tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::job::JobId;
use crate::strategy::StrategyConfig;
use crate::streaming::SseFrame;

/// Signals delivered by an event transport
///
/// The receiver ending (all senders dropped) means the transport itself
/// terminated the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamSignal {
    /// The connection is established
    Open,
    /// A named event arrived
    Message(SseFrame),
    /// The transport reported an error; the connection may still be alive
    Error(String),
}

/// Errors establishing a stream connection
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be sent or the connection failed
    #[error("stream request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server refused the stream
    #[error("stream endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Stream URL could not be built
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),

    /// Transport-specific failure
    #[error("{0}")]
    Other(String),
}

/// Errors from job submission and other request/response calls
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not be sent or the body could not be read
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Response body was not the expected JSON
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Submission succeeded but no usable job id came back
    #[error("response did not contain a job id")]
    MissingJobId,
}

/// Server-push event stream for a job
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Transport name for diagnostics
    fn name(&self) -> &'static str;

    /// Open a stream for a job
    ///
    /// Returns a receiver of [`StreamSignal`]s. Dropping the receiver must
    /// release the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the connection cannot be established.
    async fn connect(&self, job_id: &JobId) -> Result<mpsc::Receiver<StreamSignal>, TransportError>;
}

/// Job submission endpoint
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Submit a backtest and return the job id to stream
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the request fails or no job id is returned.
    async fn submit_backtest(&self, config: &StrategyConfig) -> Result<JobId, ApiError>;

    /// Submit a training request and return the service's response body
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the request fails.
    async fn train(&self, config: &StrategyConfig) -> Result<serde_json::Value, ApiError>;
}
