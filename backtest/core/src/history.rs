//! Run History
//!
//! Completed runs are kept in a JSON array on disk, newest first. Each
//! entry stores the configuration that was submitted and the summary
//! fields of the final snapshot.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::result::{ResultSnapshot, TradeLedger};
use crate::strategy::StrategyConfig;

/// Errors reading or writing the history file
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Filesystem failure
    #[error("history file {path}: {source}")]
    Io {
        /// History file path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// File exists but is not a run list
    #[error("history file {path} is not valid: {source}")]
    Corrupt {
        /// History file path
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },
}

/// Summary fields saved for a finished run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Winning trades
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wins: Option<u64>,
    /// Losing trades
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub losses: Option<u64>,
    /// Trades, detailed or a bare count
    #[serde(default)]
    pub trades: TradeLedger,
    /// Win rate in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    /// Gross profit over gross loss
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,
    /// Mean R per trade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_r: Option<f64>,
    /// Sum of R
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_r: Option<f64>,
    /// Largest drawdown in R
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_drawdown_r: Option<f64>,
    /// Balance at the start of the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_balance: Option<f64>,
    /// Balance at the end of the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_balance: Option<f64>,
}

impl From<&ResultSnapshot> for RunSummary {
    fn from(snapshot: &ResultSnapshot) -> Self {
        Self {
            wins: snapshot.wins,
            losses: snapshot.losses,
            trades: snapshot.trades.clone(),
            win_rate: snapshot.win_rate,
            profit_factor: snapshot.profit_factor,
            avg_r: snapshot.avg_r,
            total_r: snapshot.total_r,
            max_drawdown_r: snapshot.max_drawdown_r,
            start_balance: snapshot.start_balance,
            end_balance: snapshot.end_balance,
        }
    }
}

impl RunSummary {
    /// Number of trades recorded for the run
    #[must_use]
    pub fn trade_count(&self) -> u64 {
        self.trades.count()
    }
}

/// One saved run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    /// Configuration that was submitted
    pub config: StrategyConfig,
    /// Final summary
    pub result: RunSummary,
}

impl RunRecord {
    /// Record a run finishing now
    #[must_use]
    pub fn new(config: StrategyConfig, snapshot: &ResultSnapshot) -> Self {
        Self {
            timestamp: Utc::now(),
            config,
            result: RunSummary::from(snapshot),
        }
    }
}

/// JSON file of saved runs
#[derive(Clone, Debug)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File backing the store
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Saved runs, newest first. A missing file is an empty history.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not hold a run list.
    pub async fn load(&self) -> Result<Vec<RunRecord>, HistoryError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|source| HistoryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Prepend a run and persist the list
    ///
    /// # Errors
    ///
    /// Returns an error if the existing file is unreadable or the write fails.
    pub async fn record(&self, run: RunRecord) -> Result<(), HistoryError> {
        let mut runs = self.load().await?;
        runs.insert(0, run);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let body = serde_json::to_vec_pretty(&runs).map_err(|source| HistoryError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| self.io_error(e))?;

        info!(path = %self.path.display(), runs = runs.len(), "Run saved to history");
        Ok(())
    }

    /// Delete all saved runs
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<(), HistoryError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "History cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No history to clear");
                Ok(())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }
}
