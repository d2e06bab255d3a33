//! Backtest Run Controller
//!
//! Drives one user-facing run at a time: submit the configuration, follow
//! the returned job's stream into a [`SnapshotStore`], and save the run to
//! history once its summary arrives.
//!
//! Submission failures are returned to the caller and put the run back to
//! idle. Stream faults are never returned; the last good snapshot stays
//! visible.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{ApiError, BacktestService, JobSubmitter};
use crate::history::{HistoryError, HistoryStore, RunRecord};
use crate::job::JobId;
use crate::result::ResultSnapshot;
use crate::sink::SnapshotStore;
use crate::strategy::StrategyConfig;
use crate::streaming::{CloseReason, StreamSessionConfig, StreamSessionManager};

/// Run status as shown to the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunStatus {
    /// No run in flight, or the summary has arrived
    #[default]
    Idle,
    /// Submitted and waiting for the summary
    Running,
}

/// One backtest run at a time, from submission to saved history
pub struct BacktestRun {
    submitter: Arc<dyn JobSubmitter>,
    sessions: StreamSessionManager,
    store: SnapshotStore,
    history: Option<HistoryStore>,
    run_id: u64,
    status: RunStatus,
    job_id: Option<JobId>,
    run_config: Option<StrategyConfig>,
    history_saved: bool,
}

impl BacktestRun {
    /// Controller over a submitter and a session manager
    pub fn new(submitter: Arc<dyn JobSubmitter>, sessions: StreamSessionManager) -> Self {
        Self {
            submitter,
            sessions,
            store: SnapshotStore::new(),
            history: None,
            run_id: 0,
            status: RunStatus::Idle,
            job_id: None,
            run_config: None,
            history_saved: false,
        }
    }

    /// Controller using one HTTP service for submission and streaming
    pub fn from_service(service: Arc<BacktestService>, config: StreamSessionConfig) -> Self {
        let sessions = StreamSessionManager::with_config(service.clone(), config);
        Self::new(service, sessions)
    }

    /// Save finished runs to this history store
    #[must_use]
    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Number of runs started
    #[must_use]
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Job being followed
    #[must_use]
    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    /// Latest snapshot of the current run
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<ResultSnapshot>> {
        self.store.latest()
    }

    /// Snapshot storage, for watching updates
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Session manager, for inspecting the subscription
    #[must_use]
    pub fn sessions(&self) -> &StreamSessionManager {
        &self.sessions
    }

    /// Drop the previous run's stream and snapshot
    fn begin(&mut self, config: Option<StrategyConfig>) {
        self.sessions.close();
        self.store.reset();
        self.run_id += 1;
        self.status = RunStatus::Running;
        self.run_config = config;
        self.history_saved = false;
        self.job_id = None;
    }

    /// Submit a backtest and start following its stream
    ///
    /// # Errors
    ///
    /// Returns the submission error; the run is back to idle.
    pub async fn start(&mut self, config: StrategyConfig) -> Result<JobId, ApiError> {
        self.begin(Some(config.clone()));

        let job_id = match self.submitter.submit_backtest(&config).await {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!(run = self.run_id, error = %e, "Backtest submission failed");
                self.status = RunStatus::Idle;
                return Err(e);
            }
        };

        info!(run = self.run_id, job_id = %job_id, "Following backtest");
        self.sessions.subscribe(Some(&job_id), self.store.clone());
        self.job_id = Some(job_id.clone());
        Ok(job_id)
    }

    /// Follow a job submitted elsewhere. Nothing is saved to history
    /// because the configuration is unknown.
    pub fn watch(&mut self, job_id: JobId) {
        self.begin(None);
        info!(run = self.run_id, job_id = %job_id, "Watching job");
        self.sessions.subscribe(Some(&job_id), self.store.clone());
        self.job_id = Some(job_id);
    }

    /// Submit a training request
    ///
    /// # Errors
    ///
    /// Returns the submission error.
    pub async fn train(&self, config: &StrategyConfig) -> Result<serde_json::Value, ApiError> {
        self.submitter.train(config).await
    }

    /// React to the latest snapshot.
    ///
    /// Once the summary (`wins` or `endBalance`) is present the run goes
    /// idle and is saved to history, once per run. Returns `true` when this
    /// call saved the run.
    ///
    /// # Errors
    ///
    /// Returns an error if writing history fails. The run is not retried.
    pub async fn observe(&mut self) -> Result<bool, HistoryError> {
        let Some(snapshot) = self.store.latest() else {
            return Ok(false);
        };
        if !snapshot.has_summary() {
            return Ok(false);
        }

        self.status = RunStatus::Idle;
        if self.history_saved {
            return Ok(false);
        }
        self.history_saved = true;

        match (&self.history, &self.run_config) {
            (Some(history), Some(config)) => {
                history
                    .record(RunRecord::new(config.clone(), &snapshot))
                    .await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Follow the current subscription until it closes.
    ///
    /// `on_update` sees every snapshot change; [`observe`](Self::observe)
    /// runs after each one. Returns `None` when nothing is being followed.
    ///
    /// # Errors
    ///
    /// Returns an error if writing history fails.
    pub async fn follow<F>(&mut self, mut on_update: F) -> Result<Option<CloseReason>, HistoryError>
    where
        F: FnMut(&ResultSnapshot),
    {
        let Some(handle) = self.sessions.handle() else {
            return Ok(None);
        };
        let mut updates = self.store.watch();
        let current = updates.borrow_and_update().clone();
        if let Some(snapshot) = current {
            on_update(&snapshot);
            self.observe().await?;
        }

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                    let latest = updates.borrow_and_update().clone();
                    if let Some(snapshot) = latest {
                        on_update(&snapshot);
                    }
                    self.observe().await?;
                }
                reason = handle.wait_closed() => {
                    if updates.has_changed().unwrap_or(false) {
                        let latest = updates.borrow_and_update().clone();
                        if let Some(snapshot) = latest {
                            on_update(&snapshot);
                        }
                    }
                    self.observe().await?;
                    return Ok(Some(reason));
                }
            }
        }
    }

    /// Close the stream
    pub fn dispose(&mut self) {
        self.sessions.dispose();
    }
}

impl std::fmt::Debug for BacktestRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktestRun")
            .field("run_id", &self.run_id)
            .field("status", &self.status)
            .field("job_id", &self.job_id)
            .field("history_saved", &self.history_saved)
            .finish_non_exhaustive()
    }
}
