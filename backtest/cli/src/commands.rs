//! Subcommand implementations
//!
//! Each command builds what it needs from the client configuration:
//! - `run`/`watch`: a [`BacktestRun`] over one [`BacktestService`]
//! - `train`: the service alone
//! - `history`: the [`HistoryStore`]

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use backtest_core::chart::equity_points;
use backtest_core::format::{format_currency, format_percent, format_timestamp, MISSING};
use backtest_core::{
    BacktestRun, BacktestService, ClientConfig, CloseReason, HistoryStore, JobId, JobSubmitter,
    ResultSnapshot, RunRecord, StrategyConfig,
};

/// Strategy from a file merged with defaults, or the defaults alone
pub async fn load_strategy(path: Option<&Path>) -> Result<StrategyConfig> {
    let strategy = match path {
        Some(path) => StrategyConfig::load(path)
            .await
            .with_context(|| format!("Failed to load strategy from {}", path.display()))?
            .merged(),
        None => StrategyConfig::with_defaults(),
    };
    strategy.validate()?;
    Ok(strategy)
}

fn controller(client: &ClientConfig) -> Result<BacktestRun> {
    let service = Arc::new(BacktestService::from_config(client)?);
    let mut run = BacktestRun::from_service(service, client.into());
    if let Some(path) = client.history_path() {
        run = run.with_history(HistoryStore::new(path));
    }
    Ok(run)
}

/// `backtest run`
pub async fn run(client: &ClientConfig, strategy: StrategyConfig, follow: bool) -> Result<()> {
    let mut run = controller(client)?;
    let job_id = run
        .start(strategy)
        .await
        .context("Backtest submission failed")?;
    println!("Submitted job {job_id}");

    if !follow {
        run.dispose();
        return Ok(());
    }
    follow_to_end(&mut run).await
}

/// `backtest watch <job-id>`
pub async fn watch(client: &ClientConfig, job_id: &str) -> Result<()> {
    let Some(job_id) = JobId::parse(job_id) else {
        bail!("Job id must not be empty");
    };
    let mut run = controller(client)?;
    run.watch(job_id);
    follow_to_end(&mut run).await
}

/// `backtest train`
pub async fn train(client: &ClientConfig, strategy: &StrategyConfig) -> Result<()> {
    let service = BacktestService::from_config(client)?;
    let body = service
        .train(strategy)
        .await
        .context("Training request failed")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// `backtest history [--clear]`
pub async fn history(client: &ClientConfig, clear: bool) -> Result<()> {
    let Some(path) = client.history_path() else {
        bail!("Run history is disabled in the client configuration");
    };
    let store = HistoryStore::new(path);

    if clear {
        store.clear().await?;
        println!("History cleared");
        return Ok(());
    }

    let runs = store.load().await?;
    if runs.is_empty() {
        println!("No backtest runs saved yet.");
        return Ok(());
    }
    for record in &runs {
        println!("{}", history_line(record));
    }
    Ok(())
}

fn history_line(record: &RunRecord) -> String {
    let local = record.timestamp.with_timezone(&chrono::Local);
    let result = &record.result;
    format!(
        "{}  {} {}  trades {}  W/L {}/{}  win rate {}  end {}",
        format_timestamp(&local),
        record.config.trading.instrument,
        record.config.trading.granularity,
        result.trade_count(),
        opt(result.wins, |w| w.to_string()),
        opt(result.losses, |l| l.to_string()),
        format_percent(result.win_rate, 1),
        opt(result.end_balance, |b| format_currency(b, "USD")),
    )
}

/// Follow until the stream closes or Ctrl+C, then print the summary
async fn follow_to_end(run: &mut BacktestRun) -> Result<()> {
    let mut printer = ProgressPrinter::default();

    let reason = tokio::select! {
        result = run.follow(|snapshot| printer.update(snapshot)) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing stream");
            run.dispose();
            None
        }
    };

    match reason {
        Some(CloseReason::Terminal) => info!("Job finished"),
        Some(reason) => warn!(reason = %reason, "Stream closed before the job finished"),
        None => {}
    }

    match run.snapshot() {
        Some(snapshot) => print_summary(&snapshot),
        None => println!("No results received."),
    }
    Ok(())
}

/// Prints a line when the trade count or progress changes
#[derive(Default)]
struct ProgressPrinter {
    trades: u64,
    progress: Option<serde_json::Value>,
}

impl ProgressPrinter {
    fn update(&mut self, snapshot: &ResultSnapshot) {
        let trades = snapshot.trade_count();
        if trades == self.trades && snapshot.progress == self.progress {
            return;
        }
        self.trades = trades;
        self.progress.clone_from(&snapshot.progress);

        let progress = snapshot
            .progress
            .as_ref()
            .map_or_else(|| MISSING.to_string(), describe_progress);
        println!("trades {trades:>5}  progress {progress}");
    }
}

/// Percent fields are shown as such; anything else as compact JSON
fn describe_progress(value: &serde_json::Value) -> String {
    for key in ["pct", "percent", "progress"] {
        if let Some(pct) = value.get(key).and_then(serde_json::Value::as_f64) {
            return format_percent(Some(pct), 0);
        }
    }
    value.to_string()
}

fn opt<T>(value: Option<T>, show: impl FnOnce(T) -> String) -> String {
    value.map_or_else(|| MISSING.to_string(), show)
}

fn print_summary(snapshot: &ResultSnapshot) {
    let r = |v: Option<f64>| opt(v, |x| format!("{x:.2} R"));
    let usd = |v: Option<f64>| opt(v, |x| format_currency(x, "USD"));

    println!();
    println!("{:<16}{}", "Trades", snapshot.trade_count());
    println!("{:<16}{}", "Wins", opt(snapshot.wins, |w| w.to_string()));
    println!("{:<16}{}", "Losses", opt(snapshot.losses, |l| l.to_string()));
    println!("{:<16}{}", "Win rate", format_percent(snapshot.win_rate, 2));
    println!("{:<16}{}", "Total", r(snapshot.total_r));
    println!("{:<16}{}", "Average", r(snapshot.avg_r));
    println!(
        "{:<16}{}",
        "Profit factor",
        opt(snapshot.profit_factor, |p| format!("{p:.2}"))
    );
    println!("{:<16}{}", "Max drawdown", r(snapshot.max_drawdown_r));
    println!("{:<16}{}", "Start balance", usd(snapshot.start_balance));
    println!("{:<16}{}", "End balance", usd(snapshot.end_balance));
    println!("{:<16}{}", "Net P&L", usd(snapshot.total_pnl()));

    let points = equity_points(snapshot);
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        println!(
            "{:<16}{} samples, {:.2} R -> {:.2} R",
            "Equity curve",
            points.len(),
            first.equity_r,
            last.equity_r
        );
    }
    println!("{:<16}{}", "Status", if snapshot.done { "done" } else { "incomplete" });
}
