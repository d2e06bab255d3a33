//! Backtest Result Model
//!
//! Wire-compatible types for the data carried by the result stream:
//! individual trades, the trade ledger (detailed records or a bare count),
//! the accumulated [`ResultSnapshot`], and the partial [`ResultPatch`]
//! carried by `result` events.
//!
//! Field names follow the service's camelCase JSON. Absent fields and JSON
//! `null` both deserialize to `None`, which the reducer treats as "leave the
//! snapshot field alone".
//!
//! A `result` body is decoded field by field: a field of the wrong shape is
//! skipped and the rest of the patch still applies. Counts accept integral
//! floats (`3.0`).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

/// A single closed or open trade reported by the backtest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Monotonically increasing sequence index assigned by the service
    #[serde(deserialize_with = "de_count")]
    pub index: u64,
    /// Trade direction as reported (e.g. "long", "short"); empty when unknown
    #[serde(default, deserialize_with = "de_null_as_default")]
    pub side: String,
    /// Entry price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<f64>,
    /// Exit price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<f64>,
    /// Stop-loss price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<f64>,
    /// Take-profit price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    /// Realized R-multiple
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    /// Realized P/L in account currency
    #[serde(
        rename = "pnlUSD",
        alias = "pnlUsd",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pnl_usd: Option<f64>,
    /// Running equity in R after this trade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_r: Option<f64>,
    /// Running equity in account currency after this trade
    #[serde(
        rename = "equityUSD",
        alias = "equityUsd",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub equity_usd: Option<f64>,
    /// Timestamp as sent by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Status tag (e.g. "win", "loss", "open")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Exit type tag (e.g. "tp", "sl")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// The trades known for a run
///
/// Early in a stream the service may only report how many trades exist.
/// Once detailed records are known the ledger never goes back to a count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TradeLedger {
    /// Full trade records in arrival order
    Detailed(Vec<Trade>),
    /// Only the number of trades is known
    Count(u64),
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::Detailed(Vec::new())
    }
}

impl TradeLedger {
    /// Number of trades this ledger accounts for (detailed length or count)
    #[must_use]
    pub fn count(&self) -> u64 {
        match self {
            Self::Detailed(trades) => trades.len() as u64,
            Self::Count(n) => *n,
        }
    }

    /// Number of detailed records held (zero for a bare count)
    #[must_use]
    pub fn detailed_len(&self) -> usize {
        match self {
            Self::Detailed(trades) => trades.len(),
            Self::Count(_) => 0,
        }
    }

    /// Borrow the detailed records, if any
    #[must_use]
    pub fn as_detailed(&self) -> Option<&[Trade]> {
        match self {
            Self::Detailed(trades) => Some(trades),
            Self::Count(_) => None,
        }
    }
}

/// Accumulated result state for one job
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSnapshot {
    /// Trades received so far
    #[serde(default)]
    pub trades: TradeLedger,
    /// Equity curve in R, fully replaced on update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_curve: Option<Vec<f64>>,
    /// Equity curve in account currency, fully replaced on update
    #[serde(
        rename = "equityCurveUSD",
        alias = "equityCurveUsd",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub equity_curve_usd: Option<Vec<f64>>,
    /// Winning trades
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wins: Option<u64>,
    /// Losing trades
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub losses: Option<u64>,
    /// Win rate in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    /// Sum of R over all trades
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_r: Option<f64>,
    /// Mean R per trade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_r: Option<f64>,
    /// Gross profit over gross loss
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,
    /// Largest peak-to-trough drawdown in R
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_drawdown_r: Option<f64>,
    /// Account balance at the start of the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_balance: Option<f64>,
    /// Account balance at the end of the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_balance: Option<f64>,
    /// Last progress indicator (opaque)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    /// Whether the terminal event has been received
    #[serde(default)]
    pub done: bool,
}

impl ResultSnapshot {
    /// Number of trades accounted for by the ledger
    #[must_use]
    pub fn trade_count(&self) -> u64 {
        self.trades.count()
    }

    /// End balance minus start balance, when both are known
    #[must_use]
    pub fn total_pnl(&self) -> Option<f64> {
        match (self.start_balance, self.end_balance) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Whether the summary statistics of the run have arrived
    #[must_use]
    pub fn has_summary(&self) -> bool {
        self.wins.is_some() || self.end_balance.is_some()
    }
}

/// Payload of a `result` event: any subset of the snapshot fields
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPatch {
    /// Full trade list or bare count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trades: Option<TradeLedger>,
    /// Replacement equity curve in R
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equity_curve: Option<Vec<f64>>,
    /// Replacement equity curve in account currency
    #[serde(rename = "equityCurveUSD", skip_serializing_if = "Option::is_none")]
    pub equity_curve_usd: Option<Vec<f64>>,
    /// Winning trades
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wins: Option<u64>,
    /// Losing trades
    #[serde(skip_serializing_if = "Option::is_none")]
    pub losses: Option<u64>,
    /// Win rate in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    /// Sum of R
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_r: Option<f64>,
    /// Mean R per trade
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_r: Option<f64>,
    /// Gross profit over gross loss
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,
    /// Largest drawdown in R
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_drawdown_r: Option<f64>,
    /// Starting balance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_balance: Option<f64>,
    /// Ending balance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_balance: Option<f64>,
    /// Progress indicator, if the service folds one into a result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
}

impl ResultPatch {
    /// Decode every known field independently
    ///
    /// A field whose value has the wrong shape is left `None`. Inside a
    /// trade list, records that cannot be decoded are skipped.
    #[must_use]
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let get = |key: &str| fields.get(key).filter(|value| !value.is_null());
        let float = |key: &str| get(key).and_then(Value::as_f64);
        let count = |key: &str| match get(key) {
            Some(Value::Number(n)) => count_from_number(n),
            _ => None,
        };
        let curve = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| get(*key))
                .and_then(|value| Vec::<f64>::deserialize(value).ok())
        };

        Self {
            trades: get("trades").and_then(ledger_from_value),
            equity_curve: curve(&["equityCurve"]),
            equity_curve_usd: curve(&["equityCurveUSD", "equityCurveUsd"]),
            wins: count("wins"),
            losses: count("losses"),
            win_rate: float("winRate"),
            total_r: float("totalR"),
            avg_r: float("avgR"),
            profit_factor: float("profitFactor"),
            max_drawdown_r: float("maxDrawdownR"),
            start_balance: float("startBalance"),
            end_balance: float("endBalance"),
            progress: get("progress").cloned(),
        }
    }
}

/// Any JSON object is a valid patch; anything else is malformed
impl<'de> Deserialize<'de> for ResultPatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_fields(&fields))
    }
}

fn ledger_from_value(value: &Value) -> Option<TradeLedger> {
    match value {
        Value::Array(items) => Some(TradeLedger::Detailed(
            items
                .iter()
                .filter_map(|item| Trade::deserialize(item).ok())
                .collect(),
        )),
        Value::Number(n) => count_from_number(n).map(TradeLedger::Count),
        _ => None,
    }
}

// ============================================================================
// Lenient Decoding
// ============================================================================

/// Non-negative integer, accepting integral floats such as `3.0`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn count_from_number(n: &Number) -> Option<u64> {
    n.as_u64().or_else(|| {
        n.as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

fn de_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let n = Number::deserialize(deserializer)?;
    count_from_number(&n)
        .ok_or_else(|| D::Error::custom(format!("expected a non-negative integer, got {n}")))
}

fn de_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
