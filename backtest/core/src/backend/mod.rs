//! Backtest Service Integration
//!
//! This module provides access to the remote backtest service through two
//! trait seams: [`EventTransport`] (server-push result stream for a job)
//! and [`JobSubmitter`] (backtest and training submission).
//!
//! # Available Backends
//!
//! - **HTTP**: [`BacktestService`], JSON over HTTP plus server-sent events
//!
//! # Usage
//!
//! ```ignore
//! use backtest_core::backend::{BacktestService, JobSubmitter};
//!
//! let service = BacktestService::from_config(&client_config)?;
//! let job_id = service.submit_backtest(&strategy).await?;
//! ```

mod http;
mod traits;

pub use http::{BacktestService, DEFAULT_CHANNEL_CAPACITY};
pub use traits::{ApiError, EventTransport, JobSubmitter, StreamSignal, TransportError};
