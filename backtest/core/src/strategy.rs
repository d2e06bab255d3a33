//! Strategy Configuration
//!
//! The settings object submitted with a backtest or training job. The
//! service owns its meaning; this module only knows the shape, the
//! defaults and a few sanity checks. Wire names are camelCase.
//!
//! `trading` and `paper` are required. Every other section is optional and
//! is filled from [`StrategyConfig::with_defaults`] by
//! [`StrategyConfig::merged`]. Keys missing inside a provided section take
//! that section's defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or validating a strategy configuration
#[derive(Debug, Error)]
pub enum StrategyConfigError {
    /// File could not be read
    #[error("failed to read strategy config {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// TOML body did not match the schema
    #[error("invalid TOML strategy config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON body did not match the schema
    #[error("invalid JSON strategy config: {0}")]
    Json(#[from] serde_json::Error),

    /// Serializing to TOML failed
    #[error("failed to render strategy config: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("invalid strategy config: {0}")]
    Invalid(String),
}

// ============================================================================
// Enumerations
// ============================================================================

/// Moving average flavour
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MaType {
    /// Simple moving average
    Sma,
    /// Exponential moving average
    #[default]
    Ema,
    /// Service-defined blend
    Hybrid,
}

/// Stop placement mode for paper trading
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StopMode {
    /// Stop distance derived from ATR
    #[default]
    Atr,
    /// Fixed pip distance
    Pips,
}

/// Model trained server-side
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// Linear model trained with stochastic gradient descent
    #[default]
    #[serde(rename = "SGD")]
    Sgd,
    /// Decision tree
    Tree,
    /// Random forest
    #[serde(rename = "RF")]
    Rf,
}

// ============================================================================
// Sections
// ============================================================================

/// Instrument and signal settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TradingSettings {
    pub instrument: String,
    pub granularity: String,
    pub fast_sma: u32,
    pub slow_sma: u32,
    pub warmup: u32,
    pub max_spread_pips: f64,
    pub ma_type: MaType,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            instrument: "USD_JPY".to_string(),
            granularity: "M5".to_string(),
            fast_sma: 12,
            slow_sma: 48,
            warmup: 15,
            max_spread_pips: 1.2,
            ma_type: MaType::Ema,
        }
    }
}

/// Paper trading and position sizing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaperSettings {
    pub enabled: bool,
    pub mode: StopMode,
    pub atr_period: u32,
    pub pips: f64,
    /// Reward to risk ratio
    pub rr: f64,
    /// Risk per trade, percent of balance
    pub risk: f64,
    pub max_open_per_instrument: u32,
    pub leverage: u32,
    pub stop_atr_mult: f64,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: StopMode::Atr,
            atr_period: 14,
            pips: 10.0,
            rr: 2.0,
            risk: 1.0,
            max_open_per_instrument: 1,
            leverage: 50,
            stop_atr_mult: 10.0,
        }
    }
}

/// Account settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountSettings {
    /// Starting cash balance for P&L simulation
    pub starting_balance: f64,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            starting_balance: 10_000.0,
        }
    }
}

/// Training request settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainingSettings {
    /// Years of history to train on
    pub years: u32,
    /// Validation fraction (0.2 = 20%)
    pub val_split: f64,
    pub model: ModelKind,
    /// Label horizon in bars
    #[serde(rename = "labelH")]
    pub label_horizon: u32,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            years: 1,
            val_split: 0.2,
            model: ModelKind::Sgd,
            label_horizon: 10,
        }
    }
}

/// Market data settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketDataSettings {
    /// Extra candles beyond warmup
    pub lookback: u32,
    pub atr_mult: f64,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            lookback: 0,
            atr_mult: 2.0,
        }
    }
}

/// Execution simulation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionSettings {
    /// Minimum model confidence (0..=1)
    pub signal_threshold: f64,
    pub slippage_pips: f64,
    /// Per-side commission in pips
    pub commission_pips: f64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            signal_threshold: 0.55,
            slippage_pips: 0.2,
            commission_pips: 0.0,
        }
    }
}

/// Risk limits
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RiskSettings {
    pub max_daily_loss_r: f64,
    pub max_consec_losses: u32,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_daily_loss_r: 3.0,
            max_consec_losses: 5,
        }
    }
}

/// Entry filters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSettings {
    /// Probability margin added to 1/(1+RR)
    pub ev_margin: f64,
    /// Required expected value in R
    #[serde(rename = "evMarginR")]
    pub ev_margin_r: f64,
    pub atr_window: u32,
    /// ATR percentile threshold (0..=100)
    pub atr_percentile: f64,
    /// UTC session window, e.g. `13:00-17:00Z`
    pub session: String,
    pub rsi_long: f64,
    pub rsi_short: f64,
    /// At most one trade per UTC day
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_per_day: Option<bool>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            ev_margin: 0.12,
            ev_margin_r: 0.30,
            atr_window: 20,
            atr_percentile: 30.0,
            session: "08:00-18:00Z".to_string(),
            rsi_long: 60.0,
            rsi_short: 40.0,
            one_per_day: Some(true),
        }
    }
}

// ============================================================================
// Strategy Configuration
// ============================================================================

/// Full settings object forwarded to the service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    pub trading: TradingSettings,
    pub paper: PaperSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_data: Option<MarketDataSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSettings>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StrategyConfig {
    /// Every section present with its default values
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            trading: TradingSettings::default(),
            paper: PaperSettings::default(),
            account: Some(AccountSettings::default()),
            training: Some(TrainingSettings::default()),
            market_data: Some(MarketDataSettings::default()),
            execution: Some(ExecutionSettings::default()),
            risk: Some(RiskSettings::default()),
            filter: Some(FilterSettings::default()),
        }
    }

    /// Fill every absent optional section with its defaults
    #[must_use]
    pub fn merged(mut self) -> Self {
        self.account.get_or_insert_with(AccountSettings::default);
        self.training.get_or_insert_with(TrainingSettings::default);
        self.market_data.get_or_insert_with(MarketDataSettings::default);
        self.execution.get_or_insert_with(ExecutionSettings::default);
        self.risk.get_or_insert_with(RiskSettings::default);
        self.filter.get_or_insert_with(FilterSettings::default);
        self
    }

    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns [`StrategyConfigError::Toml`] when the document does not match.
    pub fn from_toml_str(text: &str) -> Result<Self, StrategyConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Parse a JSON document
    ///
    /// # Errors
    ///
    /// Returns [`StrategyConfigError::Json`] when the document does not match.
    pub fn from_json_str(text: &str) -> Result<Self, StrategyConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a `.json` file, or TOML for any other extension
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, StrategyConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StrategyConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }

    /// Render as pretty TOML
    ///
    /// # Errors
    ///
    /// Returns [`StrategyConfigError::Render`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, StrategyConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Range checks on values the service would reject or misuse
    ///
    /// # Errors
    ///
    /// Returns [`StrategyConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), StrategyConfigError> {
        let invalid = |msg: String| Err(StrategyConfigError::Invalid(msg));

        if self.trading.fast_sma == 0 || self.trading.fast_sma >= self.trading.slow_sma {
            return invalid(format!(
                "trading.fastSma ({}) must be positive and below trading.slowSma ({})",
                self.trading.fast_sma, self.trading.slow_sma
            ));
        }
        if self.paper.rr <= 0.0 {
            return invalid(format!("paper.rr must be positive, got {}", self.paper.rr));
        }
        if !(self.paper.risk > 0.0 && self.paper.risk <= 100.0) {
            return invalid(format!(
                "paper.risk must be in (0, 100], got {}",
                self.paper.risk
            ));
        }
        if let Some(training) = &self.training {
            if !(0.0..1.0).contains(&training.val_split) {
                return invalid(format!(
                    "training.valSplit must be in [0, 1), got {}",
                    training.val_split
                ));
            }
        }
        if let Some(execution) = &self.execution {
            if !(0.0..=1.0).contains(&execution.signal_threshold) {
                return invalid(format!(
                    "execution.signalThreshold must be in [0, 1], got {}",
                    execution.signal_threshold
                ));
            }
        }
        if let Some(filter) = &self.filter {
            if !(0.0..=100.0).contains(&filter.atr_percentile) {
                return invalid(format!(
                    "filter.atrPercentile must be in [0, 100], got {}",
                    filter.atr_percentile
                ));
            }
            if !is_session_window(&filter.session) {
                return invalid(format!(
                    "filter.session must look like HH:MM-HH:MMZ, got '{}'",
                    filter.session
                ));
            }
        }
        Ok(())
    }
}

/// `HH:MM-HH:MMZ`
fn is_session_window(text: &str) -> bool {
    let Some((start, end)) = text.strip_suffix('Z').and_then(|s| s.split_once('-')) else {
        return false;
    };
    let parse = |t: &str| chrono::NaiveTime::parse_from_str(t, "%H:%M").is_ok();
    parse(start) && parse(end)
}
