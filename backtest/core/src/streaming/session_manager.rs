//! Stream Session Manager Implementation
//!
//! Keeps at most one live subscription per manager, keyed by job id.
//! Each subscription runs a pump task that reads transport signals,
//! classifies messages and hands reducer updates to the caller's sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{EventTransport, StreamSignal};
use crate::config::ClientConfig;
use crate::events::StreamEvent;
use crate::job::JobId;
use crate::reducer::reduce_owned;
use crate::sink::ResultSink;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the session manager
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamSessionConfig {
    /// Close a subscription when no transport signal arrives for this long.
    /// `None` disables the watchdog: a stalled stream stays open.
    pub idle_timeout: Option<Duration>,
}

impl From<&ClientConfig> for StreamSessionConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            idle_timeout: config.stream.idle_timeout,
        }
    }
}

// ============================================================================
// Subscription State
// ============================================================================

/// Why a subscription closed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The terminal `done` event arrived
    Terminal,
    /// The transport failed to connect or ended the connection
    TransportError,
    /// The caller switched job or disposed the manager
    Caller,
    /// The idle watchdog fired
    IdleTimeout,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Terminal => "done",
            Self::TransportError => "transport error",
            Self::Caller => "closed by caller",
            Self::IdleTimeout => "idle timeout",
        };
        f.write_str(text)
    }
}

/// Connection state of a subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Connection requested, not yet open
    Connecting,
    /// Connection open, events flowing
    Open,
    /// The transport reported an error but did not end the connection
    Degraded,
    /// Closed; no further events will be applied
    Closed(CloseReason),
}

impl SubscriptionState {
    /// Whether the subscription has reached a terminal state
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Result of a [`StreamSessionManager::subscribe`] call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// No job id, or the job already finished in this manager
    Ignored,
    /// A live subscription for the same job already exists
    Reused,
    /// A new subscription was opened
    Opened,
    /// A live subscription for another job was closed and a new one opened
    Replaced {
        /// The job whose subscription was closed
        previous: JobId,
    },
}

/// Per-subscription counters
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    /// Messages received from the transport
    pub events_received: u64,
    /// Events handed to the sink
    pub events_applied: u64,
    /// Messages dropped (malformed body, or arrived after close)
    pub events_dropped: u64,
    /// Messages with an unrecognised event name
    pub events_ignored: u64,
    /// Error signals reported by the transport
    pub transport_errors: u64,
    /// When the subscription was opened
    pub started_at: Option<Instant>,
    /// When the last message arrived
    pub last_event_at: Option<Instant>,
}

// ============================================================================
// Shared Subscription Record
// ============================================================================

/// State shared between the manager, handles and the pump task
#[derive(Debug)]
struct SubscriptionShared {
    job_id: JobId,
    state: watch::Sender<SubscriptionState>,
    /// Set once on close; checked under the lock before every sink update
    closed: Mutex<bool>,
    stats: Mutex<SessionStats>,
}

impl SubscriptionShared {
    fn new(job_id: JobId) -> Self {
        let (state, _rx) = watch::channel(SubscriptionState::Connecting);
        Self {
            job_id,
            state,
            closed: Mutex::new(false),
            stats: Mutex::new(SessionStats {
                started_at: Some(Instant::now()),
                ..SessionStats::default()
            }),
        }
    }

    fn current_state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Move between non-terminal states; ignored once closed
    fn transition(&self, next: SubscriptionState) {
        let closed = self.closed.lock();
        if *closed {
            return;
        }
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Close the subscription. Returns `false` if it was already closed.
    fn finish(&self, reason: CloseReason) -> bool {
        let mut closed = self.closed.lock();
        if *closed {
            return false;
        }
        *closed = true;
        self.state.send_replace(SubscriptionState::Closed(reason));
        drop(closed);

        info!(job_id = %self.job_id, reason = %reason, "Stream subscription closed");
        true
    }

    /// Hand one event to the sink unless the subscription is closed.
    ///
    /// A terminal event closes the subscription under the same lock, so a
    /// concurrent close can never interleave between the merge and the close.
    /// Returns `true` while the pump should keep reading.
    fn deliver(&self, sink: &dyn ResultSink, event: StreamEvent) -> bool {
        let mut closed = self.closed.lock();
        if *closed {
            self.stats.lock().events_dropped += 1;
            return false;
        }

        let terminal = event.is_terminal();
        let kind = event.kind();
        sink.apply(Box::new(move |prev| reduce_owned(prev, &event)));
        self.stats.lock().events_applied += 1;
        debug!(job_id = %self.job_id, kind = %kind, "Event applied");

        if terminal {
            *closed = true;
            self.state
                .send_replace(SubscriptionState::Closed(CloseReason::Terminal));
            drop(closed);
            info!(job_id = %self.job_id, "Stream completed");
            return false;
        }
        true
    }
}

// ============================================================================
// Subscription Handle
// ============================================================================

/// Read-only view of a subscription
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    shared: Arc<SubscriptionShared>,
}

impl SubscriptionHandle {
    /// Job this subscription streams
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.shared.job_id
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.shared.current_state()
    }

    /// Whether the subscription has closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Snapshot of the subscription counters
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.shared.stats.lock().clone()
    }

    /// Watch state transitions
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the subscription closes and return why
    pub async fn wait_closed(&self) -> CloseReason {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(|state| state.is_closed()).await {
            Ok(state) => *state,
            // The sender lives in `shared`, which this handle keeps alive
            Err(_) => return CloseReason::Caller,
        };
        match state {
            SubscriptionState::Closed(reason) => reason,
            _ => CloseReason::Caller,
        }
    }
}

// ============================================================================
// Stream Session Manager
// ============================================================================

/// Live subscription owned by the manager
struct ActiveSubscription {
    shared: Arc<SubscriptionShared>,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    fn is_live(&self) -> bool {
        !self.shared.current_state().is_closed()
    }

    fn close(&self, reason: CloseReason) {
        self.shared.finish(reason);
        self.task.abort();
    }
}

/// Owns at most one stream subscription at a time
///
/// Dropping the manager closes the active subscription.
pub struct StreamSessionManager {
    transport: Arc<dyn EventTransport>,
    config: StreamSessionConfig,
    current: Option<ActiveSubscription>,
    /// Lifetime count of subscriptions opened
    total_opened: u64,
}

impl StreamSessionManager {
    /// Create a manager over a transport
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self::with_config(transport, StreamSessionConfig::default())
    }

    /// Create a manager with custom configuration
    pub fn with_config(transport: Arc<dyn EventTransport>, config: StreamSessionConfig) -> Self {
        Self {
            transport,
            config,
            current: None,
            total_opened: 0,
        }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &StreamSessionConfig {
        &self.config
    }

    /// Subscribe to a job's event stream, delivering updates to `sink`.
    ///
    /// - `None` is a no-op.
    /// - A live subscription for the same job is reused; no second
    ///   connection is opened while one is connecting or open.
    /// - A live subscription for another job is closed first. Events still
    ///   in flight for it are dropped, never merged.
    /// - A job that already completed (terminal event) in this manager is
    ///   not re-opened. Any other closure allows a fresh subscription.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(
        &mut self,
        job_id: Option<&JobId>,
        sink: impl ResultSink,
    ) -> SubscribeOutcome {
        let Some(job_id) = job_id else {
            return SubscribeOutcome::Ignored;
        };

        let mut previous = None;
        if let Some(current) = self.current.take() {
            if current.shared.job_id == *job_id {
                match current.shared.current_state() {
                    SubscriptionState::Closed(CloseReason::Terminal) => {
                        debug!(job_id = %job_id, "Job already completed, not re-subscribing");
                        self.current = Some(current);
                        return SubscribeOutcome::Ignored;
                    }
                    SubscriptionState::Closed(_) => {}
                    _ => {
                        self.current = Some(current);
                        return SubscribeOutcome::Reused;
                    }
                }
            } else if current.is_live() {
                info!(
                    previous = %current.shared.job_id,
                    job_id = %job_id,
                    "Switching stream subscription"
                );
                current.close(CloseReason::Caller);
                previous = Some(current.shared.job_id.clone());
            }
        }

        self.current = Some(self.open(job_id.clone(), Arc::new(sink)));
        match previous {
            Some(previous) => SubscribeOutcome::Replaced { previous },
            None => SubscribeOutcome::Opened,
        }
    }

    fn open(&mut self, job_id: JobId, sink: Arc<dyn ResultSink>) -> ActiveSubscription {
        info!(job_id = %job_id, transport = self.transport.name(), "Opening stream subscription");

        let shared = Arc::new(SubscriptionShared::new(job_id));
        let task = tokio::spawn(pump(
            Arc::clone(&shared),
            Arc::clone(&self.transport),
            sink,
            self.config.idle_timeout,
        ));
        self.total_opened += 1;

        ActiveSubscription { shared, task }
    }

    /// Close the current subscription, if any. Idempotent.
    pub fn close(&mut self) {
        if let Some(current) = &self.current {
            current.close(CloseReason::Caller);
        }
    }

    /// Close the current subscription and forget it
    pub fn dispose(&mut self) {
        if let Some(current) = self.current.take() {
            current.close(CloseReason::Caller);
        }
    }

    /// Handle for the current (possibly closed) subscription
    #[must_use]
    pub fn handle(&self) -> Option<SubscriptionHandle> {
        self.current.as_ref().map(|current| SubscriptionHandle {
            shared: Arc::clone(&current.shared),
        })
    }

    /// Job id of the live subscription, if any
    #[must_use]
    pub fn active_job(&self) -> Option<&JobId> {
        self.current
            .as_ref()
            .filter(|current| current.is_live())
            .map(|current| &current.shared.job_id)
    }

    /// Whether a live subscription exists
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_job().is_some()
    }

    /// Lifetime count of subscriptions opened
    #[must_use]
    pub fn total_opened(&self) -> u64 {
        self.total_opened
    }
}

impl Drop for StreamSessionManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for StreamSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSessionManager")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .field("active_job", &self.active_job())
            .field("total_opened", &self.total_opened)
            .finish()
    }
}

// ============================================================================
// Pump Task
// ============================================================================

async fn pump(
    shared: Arc<SubscriptionShared>,
    transport: Arc<dyn EventTransport>,
    sink: Arc<dyn ResultSink>,
    idle_timeout: Option<Duration>,
) {
    let mut rx = match transport.connect(&shared.job_id).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(job_id = %shared.job_id, error = %e, "Stream connection failed");
            shared.finish(CloseReason::TransportError);
            return;
        }
    };

    loop {
        let signal = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx.recv()).await {
                Ok(signal) => signal,
                Err(_) => {
                    warn!(job_id = %shared.job_id, timeout = ?limit, "Stream idle, closing");
                    shared.finish(CloseReason::IdleTimeout);
                    return;
                }
            },
            None => rx.recv().await,
        };

        let Some(signal) = signal else {
            if shared.finish(CloseReason::TransportError) {
                warn!(job_id = %shared.job_id, "Stream ended without a done event");
            }
            return;
        };

        match signal {
            StreamSignal::Open => {
                debug!(job_id = %shared.job_id, "Stream open");
                shared.transition(SubscriptionState::Open);
            }
            StreamSignal::Error(error) => {
                shared.stats.lock().transport_errors += 1;
                warn!(job_id = %shared.job_id, error = %error, "Stream transport error");
                shared.transition(SubscriptionState::Degraded);
            }
            StreamSignal::Message(frame) => {
                {
                    let mut stats = shared.stats.lock();
                    stats.events_received += 1;
                    stats.last_event_at = Some(Instant::now());
                }

                match StreamEvent::from_frame(&frame) {
                    Ok(Some(event)) => {
                        if !shared.deliver(sink.as_ref(), event) {
                            return;
                        }
                    }
                    Ok(None) => {
                        shared.stats.lock().events_ignored += 1;
                        debug!(job_id = %shared.job_id, event = %frame.event, "Ignoring unknown event");
                    }
                    Err(e) => {
                        shared.stats.lock().events_dropped += 1;
                        warn!(job_id = %shared.job_id, error = %e, "Dropping malformed event");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TransportError;
    use crate::sink::SnapshotStore;
    use crate::streaming::SseFrame;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Transport whose connections are fed by the test
    #[derive(Default)]
    struct ChannelTransport {
        senders: Mutex<Vec<(JobId, mpsc::Sender<StreamSignal>)>>,
    }

    impl ChannelTransport {
        fn sender(&self, index: usize) -> mpsc::Sender<StreamSignal> {
            self.senders.lock()[index].1.clone()
        }

        fn connections(&self) -> usize {
            self.senders.lock().len()
        }
    }

    #[async_trait]
    impl EventTransport for ChannelTransport {
        fn name(&self) -> &'static str {
            "channel"
        }

        async fn connect(
            &self,
            job_id: &JobId,
        ) -> Result<mpsc::Receiver<StreamSignal>, TransportError> {
            let (tx, rx) = mpsc::channel(16);
            self.senders.lock().push((job_id.clone(), tx));
            Ok(rx)
        }
    }

    fn job(id: &str) -> JobId {
        JobId::parse(id).unwrap()
    }

    fn message(event: &str, data: &str) -> StreamSignal {
        StreamSignal::Message(SseFrame::new(event, data))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_state_is_closed() {
        assert!(!SubscriptionState::Connecting.is_closed());
        assert!(!SubscriptionState::Degraded.is_closed());
        assert!(SubscriptionState::Closed(CloseReason::Caller).is_closed());
        assert_eq!(CloseReason::Terminal.to_string(), "done");
    }

    #[test]
    fn test_config_from_client_config() {
        let mut client = ClientConfig::default();
        client.stream.idle_timeout = Some(Duration::from_secs(9));
        let config = StreamSessionConfig::from(&client);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(9)));
        assert_eq!(StreamSessionConfig::default().idle_timeout, None);
    }

    #[tokio::test]
    async fn test_absent_job_is_ignored() {
        let transport = Arc::new(ChannelTransport::default());
        let mut manager = StreamSessionManager::new(transport.clone());

        let outcome = manager.subscribe(None, SnapshotStore::new());
        assert_eq!(outcome, SubscribeOutcome::Ignored);
        settle().await;
        assert_eq!(transport.connections(), 0);
        assert!(manager.handle().is_none());
    }

    #[tokio::test]
    async fn test_events_flow_into_sink() {
        let transport = Arc::new(ChannelTransport::default());
        let mut manager = StreamSessionManager::new(transport.clone());
        let store = SnapshotStore::new();

        let outcome = manager.subscribe(Some(&job("a")), store.clone());
        assert_eq!(outcome, SubscribeOutcome::Opened);
        settle().await;

        let tx = transport.sender(0);
        tx.send(StreamSignal::Open).await.unwrap();
        tx.send(message("trade", r#"{"index":0,"side":"buy"}"#)).await.unwrap();
        tx.send(message("done", "")).await.unwrap();

        let handle = manager.handle().unwrap();
        assert_eq!(handle.wait_closed().await, CloseReason::Terminal);

        let snapshot = store.latest().unwrap();
        assert_eq!(snapshot.trade_count(), 1);
        assert!(snapshot.done);
        assert!(!manager.is_active());
        assert_eq!(handle.stats().events_applied, 2);
    }

    #[tokio::test]
    async fn test_transport_error_is_informational() {
        let transport = Arc::new(ChannelTransport::default());
        let mut manager = StreamSessionManager::new(transport.clone());
        let store = SnapshotStore::new();
        manager.subscribe(Some(&job("a")), store.clone());
        settle().await;

        let tx = transport.sender(0);
        tx.send(StreamSignal::Open).await.unwrap();
        tx.send(StreamSignal::Error("reset".into())).await.unwrap();
        settle().await;

        let handle = manager.handle().unwrap();
        assert_eq!(handle.state(), SubscriptionState::Degraded);
        assert_eq!(handle.stats().transport_errors, 1);

        tx.send(message("progress", r#"{"pct":40}"#)).await.unwrap();
        settle().await;
        assert!(store.latest().is_some());
        assert!(manager.is_active());
    }

    #[tokio::test]
    async fn test_transport_end_closes() {
        let transport = Arc::new(ChannelTransport::default());
        let mut manager = StreamSessionManager::new(transport.clone());
        manager.subscribe(Some(&job("a")), SnapshotStore::new());
        settle().await;

        transport.senders.lock().clear();
        let handle = manager.handle().unwrap();
        assert_eq!(handle.wait_closed().await, CloseReason::TransportError);
    }

    #[tokio::test]
    async fn test_idle_watchdog() {
        let transport = Arc::new(ChannelTransport::default());
        let config = StreamSessionConfig {
            idle_timeout: Some(Duration::from_millis(20)),
        };
        let mut manager = StreamSessionManager::with_config(transport.clone(), config);
        manager.subscribe(Some(&job("a")), SnapshotStore::new());

        let handle = manager.handle().unwrap();
        assert_eq!(handle.wait_closed().await, CloseReason::IdleTimeout);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = Arc::new(ChannelTransport::default());
        let mut manager = StreamSessionManager::new(transport.clone());
        manager.subscribe(Some(&job("a")), SnapshotStore::new());
        settle().await;

        manager.close();
        manager.close();
        let handle = manager.handle().unwrap();
        assert_eq!(handle.state(), SubscriptionState::Closed(CloseReason::Caller));

        // A caller close allows re-subscribing to the same job
        let outcome = manager.subscribe(Some(&job("a")), SnapshotStore::new());
        assert_eq!(outcome, SubscribeOutcome::Opened);
        assert_eq!(manager.total_opened(), 2);
    }

    #[tokio::test]
    async fn test_wait_closed_reports_caller_close() {
        let transport = Arc::new(ChannelTransport::default());
        let mut manager = StreamSessionManager::new(transport.clone());
        manager.subscribe(Some(&job("a")), SnapshotStore::new());
        let handle = manager.handle().unwrap();

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.wait_closed().await }
        });
        settle().await;
        manager.close();

        assert_eq!(waiter.await.unwrap(), CloseReason::Caller);
        // Already closed: returns without waiting
        assert_eq!(handle.wait_closed().await, CloseReason::Caller);
    }

    #[tokio::test]
    async fn test_drop_closes_subscription() {
        let transport = Arc::new(ChannelTransport::default());
        let mut manager = StreamSessionManager::new(transport.clone());
        manager.subscribe(Some(&job("a")), SnapshotStore::new());
        let handle = manager.handle().unwrap();

        drop(manager);
        assert_eq!(handle.state(), SubscriptionState::Closed(CloseReason::Caller));
    }
}
