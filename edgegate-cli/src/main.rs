//! EdgeGate CLI — backtest, decision, runtime state and history commands.
//!
//! Commands:
//! - `backtest` — replay a dataset directory and save the artifact bundle
//! - `decide` — run one signal through sizing, gates and execution
//! - `run` — long-lived loop over JSONL signals on stdin, with the UTC
//!   midnight reset scheduled in the background
//! - `state show|kill|resume|reset|mode|audit` — operate on the persisted risk state
//! - `history` — query the JSONL trade history

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use edgegate_core::domain::{ExecutionMode, SignalInput};
use edgegate_core::execution::ExecutionController;
use edgegate_core::risk::{spawn_daily_reset, JsonFileStore, JsonlAuditSink, RiskStateHandle, SystemClock};
use edgegate_core::{DecisionEngine, Pipeline, TradingConfig};
use edgegate_runner::export::generate_report;
use edgegate_runner::{
    run_backtest_from_dir, save_artifacts, BacktestConfig, BacktestResult, BacktestTrade, HistoryQuery,
    TradeHistory,
};

const STATE_FILE: &str = "risk_state.json";
const AUDIT_FILE: &str = "audit.jsonl";

#[derive(Parser)]
#[command(name = "edgegate", about = "EdgeGate — sizing, risk gates and staged execution for prediction markets")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay historical signals and save metrics, calibration and validation.
    Backtest {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dataset directory with ticks.csv, markets.json and candidates.csv.
        #[arg(long)]
        data: PathBuf,

        /// Artifact output directory.
        #[arg(long, default_value = "artifacts")]
        output_dir: PathBuf,

        /// Also append the simulated trades to this JSONL history.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Print the Markdown report instead of the short summary.
        #[arg(long, default_value_t = false)]
        report: bool,
    },
    /// Size, gate and execute one signal read from a JSON file.
    Decide {
        /// SignalInput as JSON.
        #[arg(long)]
        signal: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Bankroll in USDC available to the sizer.
        #[arg(long)]
        bankroll: f64,

        /// Requested mode. Defaults to the persisted execution mode.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Decide only; never execute.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },
    /// Process SignalInput JSON lines from stdin until EOF or Ctrl-C.
    Run {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bankroll in USDC available to the sizer.
        #[arg(long)]
        bankroll: f64,

        /// Requested mode. Defaults to the persisted execution mode.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },
    /// Inspect or operate on the persisted runtime risk state.
    State {
        #[arg(long, default_value = "state", global = true)]
        state_dir: PathBuf,

        #[command(subcommand)]
        action: StateAction,
    },
    /// Query closed trades from a JSONL history.
    History {
        #[arg(long, default_value = "history.jsonl")]
        path: PathBuf,

        #[arg(long)]
        market: Option<String>,

        /// Earliest close date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Latest close date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum StateAction {
    /// Print the current state as JSON.
    Show,
    /// Activate the kill-switch.
    Kill {
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// Deactivate the kill-switch.
    Resume,
    /// Apply the UTC daily reset if the day has rolled.
    Reset,
    /// Change the persisted execution mode.
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
    /// Print the most recent audit entries.
    Audit {
        #[arg(long, default_value_t = 20)]
        last: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Paper,
    Shadow,
    Live,
}

impl From<ModeArg> for ExecutionMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Paper => ExecutionMode::Paper,
            ModeArg::Shadow => ExecutionMode::Shadow,
            ModeArg::Live => ExecutionMode::Live,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Backtest {
            config,
            data,
            output_dir,
            history,
            report,
        } => run_backtest_cmd(config, &data, &output_dir, history, report),
        Commands::Decide {
            signal,
            config,
            bankroll,
            mode,
            dry_run,
            state_dir,
        } => run_decide(&signal, config, bankroll, mode, dry_run, &state_dir),
        Commands::Run {
            config,
            bankroll,
            mode,
            state_dir,
        } => run_service(config, bankroll, mode, &state_dir),
        Commands::State { state_dir, action } => run_state(&state_dir, action),
        Commands::History { path, market, from, to } => run_history(
            &path,
            &HistoryQuery {
                market_id: market,
                closed_from: from,
                closed_to: to,
            },
        ),
    }
}

/// `RUST_LOG` wins; otherwise `info`. Logs go to stderr so stdout stays parseable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ─── backtest ────────────────────────────────────────────────────────

fn run_backtest_cmd(
    config_path: Option<PathBuf>,
    data_dir: &Path,
    output_dir: &Path,
    history: Option<PathBuf>,
    report: bool,
) -> Result<()> {
    let config = match config_path {
        Some(path) => BacktestConfig::from_file(&path)?,
        None => BacktestConfig::default(),
    };

    let result = run_backtest_from_dir(&config, data_dir)
        .with_context(|| format!("backtest failed for dataset {}", data_dir.display()))?;

    if report {
        println!("{}", generate_report(&result));
    } else {
        print_summary(&result);
    }

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    if let Some(path) = history {
        let history = TradeHistory::new(path);
        let written = history
            .append_all(&result.trades)
            .with_context(|| format!("failed to append to {}", history.path().display()))?;
        info!(written, path = %history.path().display(), "trade history updated");
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Run:            {}", &result.run_id[..12.min(result.run_id.len())]);
    println!("Trades:         {}", m.trade_count);
    println!("Skipped:        {}", result.skipped.len());
    println!(
        "Bankroll:       {:.2} -> {:.2}",
        result.initial_bankroll, result.final_bankroll
    );
    println!();
    println!("--- Performance ---");
    println!("Total PnL:      {:.2}", m.total_pnl);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Max Drawdown:   {:.2} ({:.2}%)", m.max_drawdown, m.max_drawdown_pct * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Expectancy:     {:.2}", m.expectancy);
    println!();
    println!("--- Calibration ---");
    println!("Brier:          {:.4}", result.calibration.brier_score);
    println!("ECE:            {:.4}", result.calibration.ece);
    println!("Bias:           {:?}", result.calibration.bias);
    if let Some(r) = &result.robustness {
        println!();
        println!("Robustness:     {:.1} ({:?})", r.score, r.grade);
    }
    for warn in &result.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}

// ─── decide ──────────────────────────────────────────────────────────

fn open_handle(state_dir: &Path, config: &TradingConfig) -> Result<RiskStateHandle> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("failed to create state dir {}", state_dir.display()))?;
    let handle = RiskStateHandle::open(
        Box::new(JsonFileStore::new(state_dir.join(STATE_FILE))),
        Arc::new(JsonlAuditSink::new(state_dir.join(AUDIT_FILE))),
        Arc::new(SystemClock),
        config.execution.default_mode,
        config.execution.failure_threshold,
    )
    .with_context(|| format!("failed to open risk state in {}", state_dir.display()))?;
    Ok(handle)
}

fn load_trading_config(path: Option<PathBuf>) -> Result<TradingConfig> {
    let config = match path {
        Some(path) => TradingConfig::from_file(&path)?,
        None => TradingConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// An explicit `--mode` wins; otherwise the mode persisted in the risk state.
fn resolve_mode(mode: Option<ModeArg>, handle: &RiskStateHandle) -> Result<ExecutionMode> {
    match mode {
        Some(m) => Ok(m.into()),
        None => Ok(handle.get_state()?.execution_mode),
    }
}

fn check_bankroll(bankroll: f64) -> Result<()> {
    if !(bankroll.is_finite() && bankroll > 0.0) {
        bail!("--bankroll must be positive, got {bankroll}");
    }
    Ok(())
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn run_decide(
    signal_path: &Path,
    config_path: Option<PathBuf>,
    bankroll: f64,
    mode: Option<ModeArg>,
    dry_run: bool,
    state_dir: &Path,
) -> Result<()> {
    check_bankroll(bankroll)?;
    let config = load_trading_config(config_path)?;
    let raw = std::fs::read_to_string(signal_path)
        .with_context(|| format!("failed to read signal {}", signal_path.display()))?;
    let signal: SignalInput =
        serde_json::from_str(&raw).with_context(|| format!("malformed signal in {}", signal_path.display()))?;

    let handle = open_handle(state_dir, &config)?;
    let engine = DecisionEngine::new(&config);

    if dry_run {
        let state = handle.get_state()?;
        let eval = engine.decide(&signal, bankroll, None, &state, handle.clock().now());
        println!("{}", serde_json::to_string_pretty(&eval.decision)?);
        return Ok(());
    }

    let requested = resolve_mode(mode, &handle)?;
    let controller = ExecutionController::new(config.execution.clone(), handle);
    let pipeline = Pipeline::new(engine, controller);

    let outcome = build_runtime()?.block_on(pipeline.process(&signal, bankroll, None, requested))?;

    println!("{}", serde_json::to_string_pretty(&outcome.decision)?);
    match outcome.execution {
        None => println!("Not executed: {}", outcome.decision.action),
        Some(Ok(record)) => println!("{}", serde_json::to_string_pretty(&record)?),
        Some(Err(failure)) => {
            println!("{}", serde_json::to_string_pretty(&failure.record)?);
            bail!("execution failed: {}", failure.error);
        }
    }
    Ok(())
}

// ─── run ─────────────────────────────────────────────────────────────

fn run_service(config_path: Option<PathBuf>, bankroll: f64, mode: Option<ModeArg>, state_dir: &Path) -> Result<()> {
    check_bankroll(bankroll)?;
    let config = load_trading_config(config_path)?;
    let handle = open_handle(state_dir, &config)?;
    let requested = resolve_mode(mode, &handle)?;
    let controller = ExecutionController::new(config.execution.clone(), handle.clone());
    let pipeline = Pipeline::new(DecisionEngine::new(&config), controller);

    build_runtime()?.block_on(async move {
        let reset = spawn_daily_reset(handle);
        info!(%requested, bankroll, "reading signals from stdin");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut processed = 0u64;
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("failed to read stdin")?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    None
                }
            };
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let signal: SignalInput = match serde_json::from_str(&line) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "skipping malformed signal line");
                    continue;
                }
            };
            let outcome = pipeline.process(&signal, bankroll, None, requested).await?;
            let execution = match &outcome.execution {
                None => serde_json::Value::Null,
                Some(Ok(record)) => serde_json::to_value(record)?,
                Some(Err(failure)) => serde_json::json!({
                    "record": failure.record,
                    "error": failure.error.to_string(),
                }),
            };
            println!(
                "{}",
                serde_json::json!({ "decision": outcome.decision, "execution": execution })
            );
            processed += 1;
        }
        reset.abort();
        info!(processed, "signal loop finished");
        Ok::<_, anyhow::Error>(())
    })
}

// ─── state ───────────────────────────────────────────────────────────

fn run_state(state_dir: &Path, action: StateAction) -> Result<()> {
    let handle = open_handle(state_dir, &TradingConfig::default())?;
    match action {
        StateAction::Show => {}
        StateAction::Kill { reason } => handle.activate_kill_switch(&reason)?,
        StateAction::Resume => handle.deactivate_kill_switch()?,
        StateAction::Reset => {
            let rolled = handle.reset_daily()?;
            println!("{}", if rolled { "Daily counters reset." } else { "Already current; nothing to reset." });
        }
        StateAction::Mode { mode } => handle.set_execution_mode(mode.into())?,
        StateAction::Audit { last } => {
            let entries = JsonlAuditSink::new(state_dir.join(AUDIT_FILE)).read_all()?;
            for entry in entries.iter().skip(entries.len().saturating_sub(last)) {
                println!("{}", serde_json::to_string(entry)?);
            }
            return Ok(());
        }
    }
    println!("{}", serde_json::to_string_pretty(&handle.get_state()?)?);
    Ok(())
}

// ─── history ─────────────────────────────────────────────────────────

fn run_history(path: &Path, query: &HistoryQuery) -> Result<()> {
    let trades = TradeHistory::new(path)
        .query(query)
        .with_context(|| format!("failed to read history {}", path.display()))?;
    println!(
        "{:<20} {:<16} {:<4} {:>8} {:>9} {:>10}  {}",
        "signal", "market", "side", "entry", "size", "pnl", "closed"
    );
    for t in &trades {
        print_history_row(t);
    }
    let total: f64 = trades.iter().map(|t| t.pnl).sum();
    println!("{} trades, total pnl {:.2}", trades.len(), total);
    Ok(())
}

fn print_history_row(t: &BacktestTrade) {
    println!(
        "{:<20} {:<16} {:<4} {:>8.4} {:>9.2} {:>10.2}  {}",
        t.signal_id,
        t.market_id,
        t.direction.to_string(),
        t.entry_price,
        t.size,
        t.pnl,
        t.closed_at.format("%Y-%m-%d %H:%M")
    );
}
