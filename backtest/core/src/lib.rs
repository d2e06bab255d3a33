//! Backtest Core - Incremental Result Streams for Remote Backtests
//!
//! This crate follows a backtest job running on a remote service and folds
//! its server-push event stream into a consistent, growing result snapshot.
//! It has no UI dependencies; the `backtest` CLI is one consumer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          BacktestRun                              │
//! │   start(config) ──► JobSubmitter::submit_backtest() ──► JobId      │
//! │                                                          │        │
//! │  ┌───────────────────────────────────────────────────────┼──────┐ │
//! │  │                StreamSessionManager                    ▼      │ │
//! │  │   EventTransport::connect(job) ──► StreamSignal stream        │ │
//! │  │            │                                                  │ │
//! │  │   StreamEvent::from_frame()  (trade | progress | result | done)│ │
//! │  │            │                                                  │ │
//! │  │   ResultSink::apply(|prev| reduce_owned(prev, &event))        │ │
//! │  └────────────┼──────────────────────────────────────────────────┘ │
//! │               ▼                                                   │
//! │        SnapshotStore ──► observe() ──► HistoryStore               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`StreamSessionManager`]: one live subscription per job, clean switches
//! - [`reducer::reduce`]: pure `(snapshot, event) -> snapshot` merge policy
//! - [`StreamEvent`]: classified stream events
//! - [`ResultSnapshot`]: accumulated run results
//! - [`SnapshotStore`]: latest-value sink readers can watch
//! - [`BacktestService`]: HTTP submission and server-sent events transport
//! - [`BacktestRun`]: submit, follow and record one run at a time
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use backtest_core::{load_config, BacktestRun, BacktestService, StrategyConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let service = Arc::new(BacktestService::from_config(&config)?);
//!     let mut run = BacktestRun::from_service(service, (&config).into());
//!
//!     run.start(StrategyConfig::with_defaults()).await?;
//!     run.follow(|snapshot| println!("{} trades", snapshot.trade_count())).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: service traits and the HTTP implementation
//! - [`chart`]: equity chart series
//! - [`config`]: layered client configuration
//! - [`events`]: event classification and parsing
//! - [`format`]: display formatting
//! - [`history`]: saved runs
//! - [`job`]: job identifiers
//! - [`reducer`]: merge policy
//! - [`result`]: trades and snapshots
//! - [`run`]: run controller
//! - [`sink`]: snapshot sinks
//! - [`strategy`]: strategy configuration submitted with a job
//! - [`streaming`]: session manager and SSE decoding

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod chart;
pub mod config;
pub mod events;
pub mod format;
pub mod history;
pub mod job;
pub mod reducer;
pub mod result;
pub mod run;
pub mod sink;
pub mod strategy;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    ApiError, BacktestService, EventTransport, JobSubmitter, StreamSignal, TransportError,
};
pub use events::{EventKind, EventParseError, StreamEvent};
pub use job::JobId;
pub use result::{ResultPatch, ResultSnapshot, Trade, TradeLedger};
pub use run::{BacktestRun, RunStatus};
pub use sink::{ResultSink, SnapshotStore, SnapshotUpdate};

// Streaming exports
pub use streaming::{
    CloseReason, SessionStats, SseDecoder, SseFrame, StreamSessionConfig, StreamSessionManager,
    SubscribeOutcome, SubscriptionHandle, SubscriptionState,
};

// History exports
pub use history::{HistoryError, HistoryStore, RunRecord, RunSummary};

// Strategy exports
pub use strategy::{StrategyConfig, StrategyConfigError};

// Config exports
pub use config::{
    default_config_path, default_history_path, load_config, load_config_from_path, ClientConfig,
    ClientToml, ConfigError, ConfigOverrides, ConfigSource,
};
