//! Result Merge Reducer
//!
//! Deterministic fold of `(snapshot, event) -> snapshot`. [`reduce`] never
//! mutates its input: every call returns a successor snapshot, so readers
//! holding an earlier snapshot never observe a torn state. [`reduce_owned`]
//! applies the same policy to a snapshot nobody else can see.
//!
//! # Merge policy
//!
//! | Event      | Effect                                                              |
//! |------------|---------------------------------------------------------------------|
//! | `trade`    | append to detailed trades; a bare count is left untouched           |
//! | `progress` | overwrite `progress` only                                           |
//! | `result`   | overwrite every present field; replace trades only with a strictly  |
//! |            | longer detailed list; equity curves are replaced wholesale          |
//! | `done`     | set `done`; the payload body is ignored                             |
//!
//! The first event for a job seeds the snapshot from its own payload. Once
//! `done` is set the snapshot is frozen.

use crate::events::StreamEvent;
use crate::result::{ResultPatch, ResultSnapshot, TradeLedger};

/// Fold one event into the previous snapshot
///
/// `prev` is `None` until the first event for a job has been applied.
#[must_use]
pub fn reduce(prev: Option<&ResultSnapshot>, event: &StreamEvent) -> ResultSnapshot {
    reduce_owned(prev.cloned(), event)
}

/// Fold one event into a snapshot the caller owns
///
/// Same policy as [`reduce`], without copying the accumulated trades. Sinks
/// that hold the only reference to the previous snapshot use this to keep
/// each merge proportional to the event, not to the run so far.
#[must_use]
pub fn reduce_owned(prev: Option<ResultSnapshot>, event: &StreamEvent) -> ResultSnapshot {
    let Some(mut next) = prev else {
        return seed(event);
    };

    if next.done {
        return next;
    }

    match event {
        StreamEvent::Trade(trades) => {
            // A bare count is only ever superseded by a detailed `result`.
            if let TradeLedger::Detailed(existing) = &mut next.trades {
                existing.extend(trades.iter().cloned());
            }
        }
        StreamEvent::Progress(progress) => {
            next.progress = Some(progress.clone());
        }
        StreamEvent::Result(patch) => {
            overwrite_fields(&mut next, patch);
            if let Some(TradeLedger::Detailed(incoming)) = &patch.trades {
                if incoming.len() > next.trades.detailed_len() {
                    next.trades = TradeLedger::Detailed(incoming.clone());
                }
            }
        }
        StreamEvent::Done(_) => {
            next.done = true;
        }
    }
    next
}

/// Fold an ordered event sequence starting from an empty state
#[must_use]
pub fn replay<'a, I>(events: I) -> Option<ResultSnapshot>
where
    I: IntoIterator<Item = &'a StreamEvent>,
{
    events
        .into_iter()
        .fold(None, |acc, event| Some(reduce_owned(acc, event)))
}

fn seed(event: &StreamEvent) -> ResultSnapshot {
    let mut snapshot = ResultSnapshot::default();
    match event {
        StreamEvent::Trade(trades) => {
            snapshot.trades = TradeLedger::Detailed(trades.clone());
        }
        StreamEvent::Progress(progress) => {
            snapshot.progress = Some(progress.clone());
        }
        StreamEvent::Result(patch) => {
            overwrite_fields(&mut snapshot, patch);
            if let Some(trades) = &patch.trades {
                snapshot.trades = trades.clone();
            }
        }
        StreamEvent::Done(_) => {
            snapshot.done = true;
        }
    }
    snapshot
}

/// Overwrite every non-trade field the patch defines
fn overwrite_fields(snapshot: &mut ResultSnapshot, patch: &ResultPatch) {
    fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
        if let Some(value) = value {
            *slot = Some(value.clone());
        }
    }

    set(&mut snapshot.equity_curve, &patch.equity_curve);
    set(&mut snapshot.equity_curve_usd, &patch.equity_curve_usd);
    set(&mut snapshot.wins, &patch.wins);
    set(&mut snapshot.losses, &patch.losses);
    set(&mut snapshot.win_rate, &patch.win_rate);
    set(&mut snapshot.total_r, &patch.total_r);
    set(&mut snapshot.avg_r, &patch.avg_r);
    set(&mut snapshot.profit_factor, &patch.profit_factor);
    set(&mut snapshot.max_drawdown_r, &patch.max_drawdown_r);
    set(&mut snapshot.start_balance, &patch.start_balance);
    set(&mut snapshot.end_balance, &patch.end_balance);
    set(&mut snapshot.progress, &patch.progress);
}
