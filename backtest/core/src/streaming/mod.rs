//! Streaming Infrastructure for Job Result Streams
//!
//! This module turns a job's server-push event stream into snapshot
//! updates. The [`StreamSessionManager`] owns the connection lifecycle;
//! the [`SseDecoder`] frames raw `text/event-stream` bytes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     StreamSessionManager                          │
//! │                                                                   │
//! │   subscribe(job) ──► pump task ──► EventTransport::connect()      │
//! │                          │                                        │
//! │            StreamSignal::{Open, Error, Message}                   │
//! │                          │                                        │
//! │                 StreamEvent::from_frame()                         │
//! │                          │                                        │
//! │              ResultSink::apply(|prev| reduce_owned(prev, &event)) │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **One subscription per job**: repeated subscribes for a live job reuse it
//! - **Clean switches**: a new job closes the old subscription, late events are dropped
//! - **Scoped release**: closing or dropping the manager releases the connection
//!
//! # Example
//!
//! ```ignore
//! use backtest_core::streaming::StreamSessionManager;
//! use backtest_core::{BacktestService, JobId, SnapshotStore};
//!
//! let service = Arc::new(BacktestService::from_config(&config)?);
//! let mut manager = StreamSessionManager::new(service);
//! let store = SnapshotStore::new();
//!
//! manager.subscribe(JobId::parse("job-42").as_ref(), store.clone());
//! let reason = manager.handle().unwrap().wait_closed().await;
//! println!("closed: {reason}, trades: {:?}", store.latest().map(|s| s.trade_count()));
//! ```

mod session_manager;
mod sse;

pub use session_manager::{
    CloseReason, SessionStats, StreamSessionConfig, StreamSessionManager, SubscribeOutcome,
    SubscriptionHandle, SubscriptionState,
};
pub use sse::{SseDecoder, SseFrame};
