//! Monte Carlo resampling of closed-trade returns.
//!
//! Each path draws as many returns as there were trades, with replacement,
//! and compounds them from the initial capital. Across paths this gives
//! percentile equity curves, a 95% value at risk and the median of the
//! per-path max drawdowns. The generator is seeded, so the same inputs
//! always produce the same result.

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::backtest::BacktestResult;

pub const DEFAULT_SIMULATIONS: usize = 1000;
pub const DEFAULT_SEED: u64 = 42;
pub const MAX_SIMULATIONS: usize = 100_000;
/// Below this many trades the resampled spread is unreliable.
pub const MIN_RELIABLE_TRADES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonteCarloConfig {
    pub simulations: usize,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            simulations: DEFAULT_SIMULATIONS,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloResult {
    pub simulations: usize,
    pub trades: usize,
    /// Per-step percentiles of simulated equity. Index 0 is the initial capital.
    pub p5: Vec<f64>,
    pub p50: Vec<f64>,
    pub p95: Vec<f64>,
    pub p5_final: f64,
    /// Initial capital minus the 5th-percentile final equity.
    pub var_95: f64,
    /// Median of the per-path max drawdowns, as a positive fraction.
    pub median_drawdown: f64,
    /// Resampled returns below -100% that were capped at -100%.
    pub capped_losses: usize,
}

/// Return of each closed trade on the equity marked at the close before
/// its entry.
pub fn trade_returns(result: &BacktestResult) -> Vec<f64> {
    let curve = &result.equity_curve;
    result
        .closed_trades()
        .filter_map(|trade| {
            let entry = curve.partition_point(|p| p.date < trade.entry_date);
            let base = curve.get(entry.checked_sub(1)?)?.equity;
            let pnl = trade.realized_pnl?;
            (base > 0.0).then(|| pnl / base)
        })
        .collect()
}

/// Resamples the closed trades of a finished backtest.
pub fn from_backtest(
    result: &BacktestResult,
    initial_capital: f64,
    config: &MonteCarloConfig,
) -> Option<MonteCarloResult> {
    simulate(&trade_returns(result), initial_capital, config)
}

/// Runs `config.simulations` bootstrap paths over `returns`.
///
/// Returns `None` when there is nothing to resample.
pub fn simulate(
    returns: &[f64],
    initial_capital: f64,
    config: &MonteCarloConfig,
) -> Option<MonteCarloResult> {
    let n = returns.len();
    if n == 0 || config.simulations == 0 {
        return None;
    }
    if n < MIN_RELIABLE_TRADES {
        warn!("monte carlo: only {n} trades, the resampled spread may be unreliable");
    }
    let mut magnitudes: Vec<f64> = returns.iter().map(|r| r.abs()).collect();
    magnitudes.sort_by(f64::total_cmp);
    let mean_abs = magnitudes.iter().sum::<f64>() / n as f64;
    if mean_abs > 1.0 && percentile_sorted(&magnitudes, 95.0) > 0.5 {
        warn!("monte carlo: mean absolute trade return is {mean_abs:.2}; returns are read as fractions (1.0 = 100%)");
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut capped_losses = 0;
    let mut paths = Vec::with_capacity(config.simulations);
    for _ in 0..config.simulations {
        let mut equity = initial_capital;
        let mut path = Vec::with_capacity(n + 1);
        path.push(equity);
        for _ in 0..n {
            let mut r = returns[rng.gen_range(0..n)];
            if r < -1.0 {
                r = -1.0;
                capped_losses += 1;
            }
            equity *= 1.0 + r;
            path.push(equity);
        }
        paths.push(path);
    }

    let mut p5 = Vec::with_capacity(n + 1);
    let mut p50 = Vec::with_capacity(n + 1);
    let mut p95 = Vec::with_capacity(n + 1);
    let mut column = Vec::with_capacity(config.simulations);
    for step in 0..=n {
        column.clear();
        column.extend(paths.iter().map(|path| path[step]));
        column.sort_by(f64::total_cmp);
        p5.push(percentile_sorted(&column, 5.0));
        p50.push(percentile_sorted(&column, 50.0));
        p95.push(percentile_sorted(&column, 95.0));
    }

    let mut drawdowns: Vec<f64> = paths.iter().map(|path| max_drawdown(path)).collect();
    drawdowns.sort_by(f64::total_cmp);

    let p5_final = p5[n];
    Some(MonteCarloResult {
        simulations: config.simulations,
        trades: n,
        p5,
        p50,
        p95,
        p5_final,
        var_95: initial_capital - p5_final,
        median_drawdown: percentile_sorted(&drawdowns, 50.0),
        capped_losses,
    })
}

fn max_drawdown(path: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in path {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

/// Linear interpolation between closest ranks.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
