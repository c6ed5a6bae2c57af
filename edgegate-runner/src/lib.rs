//! EdgeGate Runner — offline replay of historical signals through the live decision path.
//!
//! This crate builds on `edgegate-core` to provide:
//! - Dataset loading (ticks, market resolutions, signal candidates)
//! - Two-phase simulation: per-market feature prep in parallel, then a
//!   sequential bankroll ledger driving the core `DecisionEngine`
//! - Performance metrics and probability calibration
//! - Walk-forward validation and Monte Carlo resampling, folded into a
//!   robustness grade
//! - JSON / CSV / Markdown artifacts and a JSONL trade history

pub mod calibration;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod history;
pub mod metrics;
pub mod monte_carlo;
pub mod rng;
pub mod robustness;
pub mod runner;
pub mod simulator;
pub mod trade;
pub mod walk_forward;

pub use calibration::{CalibrationBias, CalibrationBucket, CalibrationReport};
pub use config::{BacktestConfig, RunId, SimulationConfig};
pub use data_loader::{load_dataset, BacktestData, Candidate, LoadError, MarketRecord, Resolution, Tick};
pub use export::{load_artifacts, save_artifacts};
pub use history::{HistoryQuery, TradeHistory};
pub use metrics::PerformanceMetrics;
pub use monte_carlo::{run_monte_carlo, MonteCarloConfig, MonteCarloError, MonteCarloResult};
pub use robustness::{robustness_score, RobustnessGrade, RobustnessScore};
pub use runner::{run_backtest, run_backtest_from_dir, BacktestResult, RunError};
pub use simulator::{EdgeModel, FairValueModel, SimulationOutput, Simulator, SkipReason, SkippedCandidate};
pub use trade::BacktestTrade;
pub use walk_forward::{run_walk_forward, DegradationFlag, WalkForwardConfig, WalkForwardError, WalkForwardResult};
