//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade tape and calibration buckets for external analysis tools
//! - **Markdown**: human-readable single-run report
//!
//! Unknown schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::calibration::CalibrationBucket;
use crate::runner::{BacktestResult, SCHEMA_VERSION};
use crate::trade::BacktestTrade;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const TRADES_CSV: &str = "trades.csv";
pub const CALIBRATION_CSV: &str = "calibration.csv";
pub const REPORT_MD: &str = "report.md";

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

pub fn export_trades_csv(trades: &[BacktestTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "signal_id",
        "market_id",
        "direction",
        "entered_at",
        "closed_at",
        "entry_price",
        "exit_price",
        "size",
        "fees",
        "slippage",
        "pnl",
        "predicted_edge",
        "actual_edge",
        "predicted_probability",
        "confidence",
        "won",
    ])?;
    for t in trades {
        wtr.write_record([
            t.signal_id.as_str(),
            t.market_id.as_str(),
            &t.direction.to_string(),
            &t.entered_at.to_rfc3339(),
            &t.closed_at.to_rfc3339(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.1}", t.exit_price),
            &format!("{:.2}", t.size),
            &format!("{:.4}", t.fees),
            &format!("{:.6}", t.slippage),
            &format!("{:.4}", t.pnl),
            &format!("{:.6}", t.predicted_edge),
            &format!("{:.6}", t.actual_edge),
            &format!("{:.6}", t.predicted_probability),
            &format!("{:.4}", t.confidence),
            if t.won { "true" } else { "false" },
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_calibration_csv(buckets: &[CalibrationBucket]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["lo", "hi", "predicted_avg", "actual_avg", "count"])?;
    for b in buckets {
        wtr.write_record([
            &format!("{:.1}", b.lo),
            &format!("{:.1}", b.hi),
            &format!("{:.4}", b.predicted_avg),
            &format!("{:.4}", b.actual_avg),
            &b.count.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set under `output_dir/{run_id prefix}_{timestamp}/`:
/// `manifest.json`, `trades.csv`, `calibration.csv`, `report.md`.
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let prefix: String = result.run_id.chars().take(12).collect();
    let dirname = format!("{}_{}", prefix, chrono::Utc::now().format("%Y%m%d_%H%M%S"));
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        (MANIFEST_FILE, export_json(result)?),
        (TRADES_CSV, export_trades_csv(&result.trades)?),
        (CALIBRATION_CSV, export_calibration_csv(&result.calibration.buckets)?),
        (REPORT_MD, generate_report(result)),
    ];
    for (name, contents) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(4096);

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run ID | {} |\n", result.run_id));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    md.push_str(&format!("| Initial Bankroll | ${:.2} |\n", result.initial_bankroll));
    md.push_str(&format!("| Final Bankroll | ${:.2} |\n", result.final_bankroll));
    md.push_str(&format!("| Skipped Candidates | {} |\n", result.skipped.len()));
    md.push('\n');

    let m = &result.metrics;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Trades | {} |\n", m.trade_count));
    md.push_str(&format!("| Total PnL | ${:.2} |\n", m.total_pnl));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Sharpe (per trade) | {:.3} |\n", m.sharpe));
    md.push_str(&format!("| Calmar | {:.3} |\n", m.calmar));
    md.push_str(&format!(
        "| Max Drawdown | ${:.2} ({:.2}%) |\n",
        m.max_drawdown,
        m.max_drawdown_pct * 100.0
    ));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", m.profit_factor));
    md.push_str(&format!("| Avg Win | ${:.2} |\n", m.avg_win));
    md.push_str(&format!("| Avg Loss | ${:.2} |\n", m.avg_loss));
    md.push_str(&format!("| Expectancy | ${:.2} |\n", m.expectancy));
    md.push_str(&format!("| Max Consecutive Losses | {} |\n", m.max_consecutive_losses));
    md.push_str(&format!("| Fees | ${:.2} |\n", m.total_fees));
    md.push('\n');

    let c = &result.calibration;
    md.push_str("## Calibration\n\n");
    md.push_str(&format!(
        "Brier {:.4}, ECE {:.4}, bias {:?} (mean deviation {:+.3})\n\n",
        c.brier_score, c.ece, c.bias, c.mean_deviation
    ));
    md.push_str("| Bucket | Predicted | Actual | Count |\n");
    md.push_str("| --- | --- | --- | --- |\n");
    for b in c.buckets.iter().filter(|b| b.count > 0) {
        md.push_str(&format!(
            "| {:.1}–{:.1} | {:.3} | {:.3} | {} |\n",
            b.lo, b.hi, b.predicted_avg, b.actual_avg, b.count
        ));
    }
    md.push('\n');

    if let Some(ref wf) = result.validation {
        md.push_str("## Walk-Forward Validation\n\n");
        md.push_str("| Fold | Train Sharpe | Test Sharpe | Train PnL/trade | Test PnL/trade | Test Trades |\n");
        md.push_str("| --- | --- | --- | --- | --- | --- |\n");
        for f in &wf.folds {
            md.push_str(&format!(
                "| {} | {:.3} | {:.3} | {:.2} | {:.2} | {} |\n",
                f.fold_index, f.train_sharpe, f.test_sharpe, f.train_pnl_per_trade, f.test_pnl_per_trade, f.test_trades
            ));
        }
        let ratio = wf
            .degradation_ratio
            .map_or_else(|| "n/a".to_string(), |r| format!("{r:.3}"));
        md.push_str(&format!(
            "\nDegradation {} ({:?}), divergence {:.2}{}\n\n",
            ratio,
            wf.degradation_flag,
            wf.divergence,
            if wf.overfit { ", **OVERFIT**" } else { "" }
        ));
    }

    if let Some(ref mc) = result.monte_carlo {
        md.push_str("## Monte Carlo\n\n");
        md.push_str(&format!(
            "{} simulations, {:.0}% intervals, P(profit) {:.1}%\n\n",
            mc.n_simulations,
            mc.confidence * 100.0,
            mc.probability_of_profit * 100.0
        ));
        md.push_str("| Quantity | Mean | Lower | Median | Upper |\n");
        md.push_str("| --- | --- | --- | --- | --- |\n");
        for (name, d) in [
            ("Total PnL", &mc.total_pnl),
            ("Max Drawdown", &mc.max_drawdown),
            ("Win Rate", &mc.win_rate),
        ] {
            md.push_str(&format!(
                "| {} | {:.3} | {:.3} | {:.3} | {:.3} |\n",
                name, d.mean, d.ci_lower, d.median, d.ci_upper
            ));
        }
        md.push('\n');
    }

    if let Some(ref r) = result.robustness {
        md.push_str(&format!("## Robustness\n\nScore {:.1} / 100, grade {:?}\n\n", r.score, r.grade));
    }

    let counts = result.skip_counts();
    if !counts.is_empty() || !result.warnings.is_empty() {
        md.push_str("## Skipped\n\n");
        for (reason, n) in counts {
            md.push_str(&format!("- {reason}: {n}\n"));
        }
        for w in &result.warnings {
            md.push_str(&format!("- {w}\n"));
        }
        md.push('\n');
    }

    md
}
