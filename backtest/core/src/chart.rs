//! Equity chart series derived from a snapshot.

use serde::Serialize;

use crate::result::ResultSnapshot;

/// One sample of the equity chart
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    /// Sample index
    #[serde(rename = "i")]
    pub index: usize,
    /// Equity in R
    pub equity_r: f64,
    /// Account balance at this sample, if the currency curve covers it
    pub balance: Option<f64>,
    /// Balance change since the previous sample
    pub pnl: f64,
}

/// Pair the R curve with the currency curve.
///
/// The R curve drives the length. `pnl` is zero for the first sample and
/// wherever either balance is missing.
#[must_use]
pub fn equity_points(snapshot: &ResultSnapshot) -> Vec<EquityPoint> {
    let Some(curve) = snapshot.equity_curve.as_deref() else {
        return Vec::new();
    };
    let balances = snapshot.equity_curve_usd.as_deref().unwrap_or_default();
    let balance_at = |i: usize| balances.get(i).copied();

    curve
        .iter()
        .enumerate()
        .map(|(i, &equity_r)| {
            let balance = balance_at(i);
            let previous = if i > 0 { balance_at(i - 1) } else { balance };
            let pnl = match (balance, previous) {
                (Some(now), Some(before)) => now - before,
                _ => 0.0,
            };
            EquityPoint {
                index: i,
                equity_r,
                balance,
                pnl,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_curve_no_points() {
        assert!(equity_points(&ResultSnapshot::default()).is_empty());
    }

    #[test]
    fn test_pnl_is_balance_delta() {
        let snapshot = ResultSnapshot {
            equity_curve: Some(vec![0.0, 1.0, -0.5]),
            equity_curve_usd: Some(vec![10_000.0, 10_100.0, 10_050.0]),
            ..ResultSnapshot::default()
        };
        let points = equity_points(&snapshot);

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].pnl, 0.0);
        assert_eq!(points[1].pnl, 100.0);
        assert_eq!(points[2].pnl, -50.0);
        assert_eq!(points[2].equity_r, -0.5);
    }

    #[test]
    fn test_short_currency_curve() {
        let snapshot = ResultSnapshot {
            equity_curve: Some(vec![0.0, 1.0]),
            equity_curve_usd: Some(vec![10_000.0]),
            ..ResultSnapshot::default()
        };
        let points = equity_points(&snapshot);
        assert_eq!(points[1].balance, None);
        assert_eq!(points[1].pnl, 0.0);

        let json = serde_json::to_value(&points[0]).unwrap();
        assert_eq!(json["i"], 0);
        assert_eq!(json["equityR"], 0.0);
    }
}
