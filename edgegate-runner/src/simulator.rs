//! Backtest simulator — the offline counterpart of the execution controller.
//!
//! Two phases:
//!
//! 1. **Per market, in parallel.** Ticks are sorted by timestamp. For each
//!    candidate the feature window holds only ticks at or before
//!    `created_at`; the edge model and market quality are computed from that
//!    window alone. The fill price is the VWAP of the next `vwap_ticks` ticks
//!    strictly after `created_at` (and before resolution).
//! 2. **Sequential ledger.** Candidates replay in `created_at` order through
//!    the same [`DecisionEngine`] as the live path, against a local
//!    [`RuntimeRiskState`]. Positions settle when their market resolves,
//!    which feeds daily PnL, bankroll and adaptive scaling for later
//!    candidates.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use edgegate_core::domain::{DecisionAction, ExecutionMode, MarketQuality, SignalInput};
use edgegate_core::risk::RuntimeRiskState;
use edgegate_core::sizers::AdaptiveState;
use edgegate_core::DecisionEngine;

use crate::config::BacktestConfig;
use crate::data_loader::{BacktestData, Candidate, MarketRecord, Resolution, Tick};
use crate::trade::BacktestTrade;

/// Prices of the traded side are kept strictly inside (0, 1).
const PRICE_EPSILON: f64 = 0.001;

// ─── Feature window and edge model ───────────────────────────────────

/// Ticks at or before the decision time, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct FeatureWindow<'a> {
    ticks: &'a [Tick],
}

impl<'a> FeatureWindow<'a> {
    pub fn new(ticks: &'a [Tick]) -> Self {
        Self { ticks }
    }

    pub fn ticks(&self) -> &'a [Tick] {
        self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Last traded YES price, 0.5 for an empty window.
    pub fn last_price(&self) -> f64 {
        self.ticks.last().map_or(0.5, |t| t.price)
    }

    /// Traded notional in the window, used as the liquidity estimate.
    pub fn notional(&self) -> f64 {
        self.ticks.iter().map(|t| t.price * t.size).sum()
    }

    /// Realized volatility: root of summed squared tick-to-tick changes.
    pub fn realized_volatility(&self) -> f64 {
        self.ticks
            .windows(2)
            .map(|w| (w[1].price - w[0].price).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeEstimate {
    pub edge: f64,
    pub confidence: f64,
}

/// Turns a historical candidate plus its look-ahead-free window into an edge.
pub trait EdgeModel: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, candidate: &Candidate, window: &FeatureWindow<'_>) -> EdgeEstimate;
}

/// Edge = the signal's fair probability minus the last traded price, both
/// for the chosen side.
#[derive(Debug, Clone, Copy, Default)]
pub struct FairValueModel;

impl EdgeModel for FairValueModel {
    fn name(&self) -> &str {
        "fair_value"
    }

    fn estimate(&self, candidate: &Candidate, window: &FeatureWindow<'_>) -> EdgeEstimate {
        let side = candidate.direction;
        EdgeEstimate {
            edge: side.price_from_yes(candidate.fair_probability) - side.price_from_yes(window.last_price()),
            confidence: candidate.confidence,
        }
    }
}

// ─── Output types ────────────────────────────────────────────────────

/// Why a candidate produced no trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    UnknownMarket,
    Unresolved,
    /// The market had already resolved when the signal fired.
    ResolvedBeforeSignal,
    InsufficientHistory { ticks: usize, required: usize },
    NoFillTicks,
    NoEdge,
    BelowThreshold { action: DecisionAction },
    GateRejected { gates: Vec<String> },
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnknownMarket => "unknown_market",
            Self::Unresolved => "unresolved",
            Self::ResolvedBeforeSignal => "resolved_before_signal",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::NoFillTicks => "no_fill_ticks",
            Self::NoEdge => "no_edge",
            Self::BelowThreshold { .. } => "below_threshold",
            Self::GateRejected { .. } => "gate_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub signal_id: String,
    pub market_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutput {
    /// Ordered by close time.
    pub trades: Vec<BacktestTrade>,
    pub skipped: Vec<SkippedCandidate>,
    pub final_bankroll: f64,
    pub peak_bankroll: f64,
}

// ─── Phase 1: per-market preparation ─────────────────────────────────

#[derive(Debug, Clone)]
struct Prepared {
    candidate: Candidate,
    signal: SignalInput,
    /// VWAP of the fill ticks, YES price.
    vwap_yes: f64,
    resolution: Resolution,
}

type Staged = Result<Prepared, SkippedCandidate>;

fn skipped(candidate: &Candidate, reason: SkipReason) -> SkippedCandidate {
    SkippedCandidate {
        signal_id: candidate.signal_id.clone(),
        market_id: candidate.market_id.clone(),
        created_at: candidate.created_at,
        reason,
    }
}

/// VWAP over the given ticks; plain mean when no size traded.
pub fn vwap(ticks: &[Tick]) -> Option<f64> {
    if ticks.is_empty() {
        return None;
    }
    let volume: f64 = ticks.iter().map(|t| t.size).sum();
    if volume > 0.0 {
        Some(ticks.iter().map(|t| t.price * t.size).sum::<f64>() / volume)
    } else {
        Some(ticks.iter().map(|t| t.price).sum::<f64>() / ticks.len() as f64)
    }
}

fn prepare_market(
    market: Option<&MarketRecord>,
    ticks: &[Tick],
    candidates: &[&Candidate],
    config: &BacktestConfig,
    model: &dyn EdgeModel,
) -> Vec<Staged> {
    let sim = &config.simulation;
    let required = sim.min_feature_ticks.max(1);

    candidates
        .iter()
        .map(|&c| -> Staged {
            let market = market.ok_or_else(|| skipped(c, SkipReason::UnknownMarket))?;
            let resolution = market.resolution.ok_or_else(|| skipped(c, SkipReason::Unresolved))?;
            if resolution.resolved_at <= c.created_at {
                return Err(skipped(c, SkipReason::ResolvedBeforeSignal));
            }

            let cut = ticks.partition_point(|t| t.timestamp <= c.created_at);
            let window = FeatureWindow::new(&ticks[cut.saturating_sub(sim.feature_lookback)..cut]);
            if window.len() < required {
                return Err(skipped(
                    c,
                    SkipReason::InsufficientHistory {
                        ticks: window.len(),
                        required,
                    },
                ));
            }

            let fill_end = cut + ticks[cut..].partition_point(|t| t.timestamp < resolution.resolved_at);
            let fill_ticks = &ticks[cut..fill_end.min(cut + sim.vwap_ticks)];
            let vwap_yes = vwap(fill_ticks).ok_or_else(|| skipped(c, SkipReason::NoFillTicks))?;

            let estimate = model.estimate(c, &window);
            let expiry = market.end_date.unwrap_or(resolution.resolved_at);
            let days_to_expiry = ((expiry - c.created_at).num_seconds() as f64 / 86_400.0).max(0.0);
            let quality = MarketQuality::new(
                window.notional(),
                market.spread.unwrap_or(sim.default_spread),
                window.realized_volatility(),
                days_to_expiry,
            );
            let price = c.direction.price_from_yes(window.last_price());

            Ok(Prepared {
                candidate: c.clone(),
                signal: SignalInput {
                    signal_id: c.signal_id.clone(),
                    market_id: c.market_id.clone(),
                    direction: c.direction,
                    predicted_edge: estimate.edge,
                    confidence: estimate.confidence,
                    price,
                    quality,
                    alpha_type: c.alpha_type.clone(),
                },
                vwap_yes,
                resolution,
            })
        })
        .collect()
}

// ─── Phase 2: chronological ledger ───────────────────────────────────

#[derive(Debug)]
struct Ledger {
    cash: f64,
    peak_equity: f64,
    state: RuntimeRiskState,
    open: Vec<BacktestTrade>,
    recent: VecDeque<bool>,
    recent_window: usize,
    baseline_win_rate: f64,
    consecutive_losses: u32,
    closed: Vec<BacktestTrade>,
}

impl Ledger {
    fn new(config: &BacktestConfig, start: DateTime<Utc>) -> Self {
        let bankroll = config.simulation.initial_bankroll;
        Self {
            cash: bankroll,
            peak_equity: bankroll,
            state: RuntimeRiskState::new(ExecutionMode::Paper, start.date_naive()),
            open: Vec::new(),
            recent: VecDeque::new(),
            recent_window: config.simulation.recent_win_window.max(1),
            baseline_win_rate: config.sizing.baseline_win_rate,
            consecutive_losses: 0,
            closed: Vec::new(),
        }
    }

    fn equity(&self) -> f64 {
        self.cash + self.open.iter().map(|t| t.size).sum::<f64>()
    }

    fn adaptive(&self) -> AdaptiveState {
        let equity = self.equity();
        let drawdown_pct = if self.peak_equity > 0.0 {
            ((self.peak_equity - equity) / self.peak_equity).max(0.0)
        } else {
            0.0
        };
        let recent_win_rate = if self.recent.is_empty() {
            self.baseline_win_rate
        } else {
            self.recent.iter().filter(|&&w| w).count() as f64 / self.recent.len() as f64
        };
        AdaptiveState {
            consecutive_losses: self.consecutive_losses,
            drawdown_pct,
            recent_win_rate,
        }
    }

    /// Settle every open trade whose market resolved at or before `now`.
    fn settle_until(&mut self, now: Option<DateTime<Utc>>) {
        let (mut due, still_open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.open)
            .into_iter()
            .partition(|t| now.map_or(true, |n| t.closed_at <= n));
        self.open = still_open;
        due.sort_by(|a, b| {
            (a.closed_at, a.entered_at, &a.signal_id).cmp(&(b.closed_at, b.entered_at, &b.signal_id))
        });

        for trade in due {
            self.state.roll_day(trade.closed_at.date_naive());
            let payout = if trade.won { trade.size / trade.entry_price } else { 0.0 };
            self.cash += payout;
            self.state.settle_position(&trade.market_id, trade.pnl);

            if trade.is_winner() {
                self.consecutive_losses = 0;
            } else {
                self.consecutive_losses += 1;
            }
            self.recent.push_back(trade.is_winner());
            while self.recent.len() > self.recent_window {
                self.recent.pop_front();
            }
            self.peak_equity = self.peak_equity.max(self.equity());
            debug!(
                signal_id = %trade.signal_id,
                market_id = %trade.market_id,
                pnl = trade.pnl,
                "position settled"
            );
            self.closed.push(trade);
        }
    }
}

// ─── Simulator ───────────────────────────────────────────────────────

pub struct Simulator {
    config: BacktestConfig,
    engine: DecisionEngine,
    model: Arc<dyn EdgeModel>,
}

impl Simulator {
    pub fn new(config: BacktestConfig) -> Self {
        Self::with_model(config, Arc::new(FairValueModel))
    }

    pub fn with_model(config: BacktestConfig, model: Arc<dyn EdgeModel>) -> Self {
        let engine = DecisionEngine::new(&config.trading());
        Self { config, engine, model }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(&self, data: &BacktestData) -> SimulationOutput {
        let staged = self.prepare(data);
        self.replay(staged)
    }

    fn prepare(&self, data: &BacktestData) -> Vec<Staged> {
        let mut ticks_by_market: HashMap<&str, Vec<Tick>> = HashMap::new();
        for t in &data.ticks {
            ticks_by_market.entry(t.market_id.as_str()).or_default().push(t.clone());
        }
        let mut candidates_by_market: HashMap<&str, Vec<&Candidate>> = HashMap::new();
        for c in &data.candidates {
            candidates_by_market.entry(c.market_id.as_str()).or_default().push(c);
        }
        let mut markets: Vec<(&str, Vec<&Candidate>)> = candidates_by_market.into_iter().collect();
        markets.sort_by(|a, b| a.0.cmp(b.0));

        let model = self.model.as_ref();
        let mut staged: Vec<Staged> = markets
            .into_par_iter()
            .flat_map_iter(|(market_id, candidates)| {
                let mut ticks = ticks_by_market.get(market_id).cloned().unwrap_or_default();
                ticks.sort_by_key(|t| t.timestamp);
                prepare_market(data.markets.get(market_id), &ticks, &candidates, &self.config, model)
            })
            .collect();

        staged.sort_by(|a, b| {
            let key = |s: &Staged| match s {
                Ok(p) => (p.candidate.created_at, p.candidate.signal_id.clone()),
                Err(s) => (s.created_at, s.signal_id.clone()),
            };
            key(a).cmp(&key(b))
        });
        staged
    }

    fn replay(&self, staged: Vec<Staged>) -> SimulationOutput {
        let sim = &self.config.simulation;
        let start = staged
            .iter()
            .map(|s| match s {
                Ok(p) => p.candidate.created_at,
                Err(s) => s.created_at,
            })
            .next()
            .unwrap_or_else(Utc::now);
        let mut ledger = Ledger::new(&self.config, start);
        let mut skips = Vec::new();

        for item in staged {
            let prepared = match item {
                Ok(p) => p,
                Err(skip) => {
                    debug!(signal_id = %skip.signal_id, reason = skip.reason.label(), "candidate skipped");
                    skips.push(skip);
                    continue;
                }
            };
            let c = &prepared.candidate;
            ledger.settle_until(Some(c.created_at));
            ledger.state.roll_day(c.created_at.date_naive());

            let adaptive = ledger.adaptive();
            let eval = self.engine.decide(
                &prepared.signal,
                ledger.cash,
                Some(&adaptive),
                &ledger.state,
                c.created_at,
            );
            let decision = &eval.decision;

            let reason = match decision.action {
                DecisionAction::Trade | DecisionAction::HighConviction => None,
                DecisionAction::Reject if !eval.gates.passed => Some(SkipReason::GateRejected {
                    gates: eval.gates.failed_gates().iter().map(|g| g.to_string()).collect(),
                }),
                DecisionAction::Reject => Some(SkipReason::NoEdge),
                action => Some(SkipReason::BelowThreshold { action }),
            };
            if let Some(reason) = reason {
                debug!(signal_id = %c.signal_id, reason = reason.label(), "candidate skipped");
                skips.push(skipped(c, reason));
                continue;
            }

            let size = decision.size_usdc;
            let side_vwap = c.direction.price_from_yes(prepared.vwap_yes);
            let entry_price = (side_vwap * (1.0 + sim.slippage_pct)).clamp(PRICE_EPSILON, 1.0 - PRICE_EPSILON);
            let fees = size * sim.fee_pct;
            let won = c.direction.wins(prepared.resolution.outcome_yes);
            let exit_price = if won { 1.0 } else { 0.0 };
            let payout = if won { size / entry_price } else { 0.0 };

            ledger.cash -= size + fees;
            ledger.state.apply_fill(&c.market_id, c.direction, size, entry_price);
            ledger.open.push(BacktestTrade {
                signal_id: c.signal_id.clone(),
                market_id: c.market_id.clone(),
                direction: c.direction,
                entry_price,
                exit_price,
                size,
                pnl: payout - size - fees,
                predicted_edge: prepared.signal.predicted_edge,
                actual_edge: exit_price - entry_price,
                slippage: entry_price - prepared.signal.price,
                fees,
                predicted_probability: eval.sizing.win_probability,
                confidence: prepared.signal.confidence,
                won,
                entered_at: c.created_at,
                closed_at: prepared.resolution.resolved_at,
            });
        }
        ledger.settle_until(None);

        info!(
            trades = ledger.closed.len(),
            skipped = skips.len(),
            final_bankroll = ledger.cash,
            "simulation complete"
        );
        SimulationOutput {
            trades: ledger.closed,
            skipped: skips,
            final_bankroll: ledger.cash,
            peak_bankroll: ledger.peak_equity,
        }
    }
}
