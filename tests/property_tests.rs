//! Property tests for look-ahead safety and engine invariants.
//!
//! Uses proptest to verify:
//! 1. Prefix invariance: signals over the first k bars never change when
//!    later bars are appended, for every built-in and a scripted strategy
//! 2. Safe indicators at T ignore the observation at T
//! 3. Sizer scalar and vector forms agree, and sizing is monotonic
//! 4. Engine bookkeeping: one open trade at most, no entry on the first
//!    bar, and equity = cash + position value at every point
//! 5. Fill sizing: quantity = target size * equity at the open / fill price
//! 6. Equity continuity: each bar's equity change is the mark-to-market
//!    move on the quantity held, less the costs of that bar's fills
//! 7. Security gate: spaced-out look-ahead forms are always rejected and
//!    non-negative lags always pass

mod common;

use common::*;
use chrono::NaiveDate;
use nextbar::domain::backtest::{EngineConfig, run_backtest};
use nextbar::domain::error::LoadErrorKind;
use nextbar::domain::execution::SlippageModel;
use nextbar::domain::indicator::{Aggregate, safe_ema, safe_pct_change, safe_rolling};
use nextbar::domain::loader::load_from_source;
use nextbar::domain::position::Trade;
use nextbar::domain::security;
use nextbar::domain::signal::SignalTable;
use nextbar::domain::sizing::{PositionSizer, SentimentSizer};
use nextbar::domain::strategies;
use nextbar::domain::strategy::StrategyParams;
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes(min: usize, max: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(50.0..150.0_f64, min..max)
        .prop_map(|v| v.into_iter().map(|p| (p * 100.0).round() / 100.0).collect())
}

fn arb_score() -> impl Strategy<Value = f64> {
    -1.0..1.0_f64
}

fn arb_signals(len: usize) -> impl Strategy<Value = (Vec<i8>, Vec<f64>)> {
    (
        prop::collection::vec(-1i8..=1, len),
        prop::collection::vec(0.0..1.0_f64, len),
    )
}

fn arb_sized_signals(len: usize) -> impl Strategy<Value = (Vec<i8>, Vec<f64>)> {
    (
        prop::collection::vec(-1i8..=1, len),
        prop::collection::vec(0.05..0.9_f64, len),
    )
}

fn arb_space() -> impl Strategy<Value = String> {
    "[ \t\n]{0,3}"
}

/// Signed quantity held at the close of `date`.
fn held_at(trades: &[Trade], date: NaiveDate) -> f64 {
    trades
        .iter()
        .filter(|t| t.entry_date <= date && t.exit_date.is_none_or(|exit| exit > date))
        .map(|t| t.quantity)
        .sum()
}

// ── 1. Prefix invariance ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn builtin_signals_are_prefix_invariant(closes in arb_closes(40, 90), cut in 5usize..40) {
        let full = table_from_closes(&closes);
        let prefix = full.head(cut);
        for descriptor in strategies::all() {
            let strategy = descriptor.instantiate(&StrategyParams::new()).unwrap();
            let long = strategy.generate_signals(&full).unwrap();
            let short = strategy.generate_signals(&prefix).unwrap();
            prop_assert_eq!(&long.signal[..cut], &short.signal[..], "{}", descriptor.name);
            if let (Some(a), Some(b)) = (&long.target_size, &short.target_size) {
                prop_assert_eq!(&a[..cut], &b[..], "{}", descriptor.name);
            }
        }
    }

    #[test]
    fn script_signals_are_prefix_invariant(closes in arb_closes(30, 60), cut in 5usize..30) {
        let full = table_from_closes(&closes);
        let strategy = load_from_source(MA_SCRIPT).unwrap().strategy;
        let long = strategy.generate_signals(&full).unwrap();
        let short = strategy.generate_signals(&full.head(cut)).unwrap();
        prop_assert_eq!(&long.signal[..cut], &short.signal[..]);
    }
}

// ── 2. Safe indicators skip the current bar ──────────────────────────

proptest! {
    #[test]
    fn safe_indicators_ignore_current_value(closes in arb_closes(30, 60), bump in 1.0..50.0_f64) {
        let last = closes.len() - 1;
        let mut moved = closes.clone();
        moved[last] += bump;

        prop_assert_eq!(
            safe_rolling(&closes, 5, Aggregate::Mean)[last],
            safe_rolling(&moved, 5, Aggregate::Mean)[last]
        );
        prop_assert_eq!(
            safe_rolling(&closes, 5, Aggregate::Std)[last],
            safe_rolling(&moved, 5, Aggregate::Std)[last]
        );
        prop_assert_eq!(safe_ema(&closes, 10)[last], safe_ema(&moved, 10)[last]);
        prop_assert_eq!(safe_pct_change(&closes, 3)[last], safe_pct_change(&moved, 3)[last]);
    }
}

// ── 3. Sizer ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn scalar_and_vector_sizing_agree(
        scores in prop::collection::vec(arb_score(), 1..50),
        threshold in -1.0..1.0_f64,
        base in 0.0..3.0_f64,
        leverage in any::<bool>(),
    ) {
        let sizer = SentimentSizer::new(base, threshold, 1.0, leverage).unwrap();
        let vector = sizer.get_target_weights(&scores);
        for (score, weight) in scores.iter().zip(&vector) {
            prop_assert_eq!(sizer.get_target_weight(*score).to_bits(), weight.to_bits());
        }
    }

    #[test]
    fn sizing_is_monotonic_and_bounded(a in arb_score(), b in arb_score()) {
        let sizer = SentimentSizer::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (w_lo, w_hi) = (sizer.get_target_weight(lo), sizer.get_target_weight(hi));
        prop_assert!(w_lo <= w_hi);
        prop_assert!((0.0..=1.0).contains(&w_hi));
        if lo < sizer.min_threshold() {
            prop_assert_eq!(w_lo, 0.0);
        }
    }
}

// ── 4. Engine bookkeeping ────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_keeps_one_position_and_consistent_equity(
        (closes, (signal, sizes)) in arb_closes(5, 60)
            .prop_flat_map(|c| { let n = c.len(); (Just(c), arb_signals(n)) }),
        allow_short in any::<bool>(),
        liquidate in any::<bool>(),
    ) {
        let table = table_from_closes(&closes);
        let signals = SignalTable::new(dates(closes.len()), signal).with_target_size(sizes);
        let config = EngineConfig {
            allow_short,
            force_liquidate_at_end: liquidate,
            ..EngineConfig::default()
        };
        let result = run_backtest(&table, &signals, &config).unwrap();

        prop_assert_eq!(result.equity_curve.len(), closes.len());
        for point in &result.equity_curve {
            prop_assert!((point.equity - (point.cash + point.position_value)).abs() < 1e-6);
        }

        let open: Vec<_> = result.trades.iter().filter(|t| t.is_open()).collect();
        prop_assert!(open.len() <= 1);
        if let Some(trade) = open.first() {
            prop_assert!(result.trades.last().unwrap().is_open());
            prop_assert!(!liquidate);
            prop_assert!(!trade.is_short() || allow_short);
        }
        for pair in result.trades.windows(2) {
            prop_assert!(pair[0].exit_date.unwrap() <= pair[1].entry_date);
        }
        for trade in &result.trades {
            prop_assert!(trade.entry_date > day(0));
            prop_assert!(allow_short || !trade.is_short());
        }

        let last = result.equity_curve.last().unwrap();
        prop_assert!((result.final_state.equity - last.equity).abs() < 1e-6);
    }
}

// ── 5. Fill sizing ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fills_are_sized_from_equity_at_the_open(
        (closes, (signal, sizes)) in arb_closes(5, 60)
            .prop_flat_map(|c| { let n = c.len(); (Just(c), arb_sized_signals(n)) }),
        allow_short in any::<bool>(),
        commission_rate in 0.0..0.01_f64,
        slippage in 0.0..0.01_f64,
    ) {
        let table = table_from_closes(&closes);
        let open = table.column("open").unwrap();
        let signals = SignalTable::new(dates(closes.len()), signal).with_target_size(sizes.clone());
        let config = EngineConfig {
            initial_capital: 10_000.0,
            commission_rate,
            min_commission: 0.0,
            slippage: SlippageModel::Proportional(slippage),
            allow_short,
            ..EngineConfig::default()
        };
        let result = run_backtest(&table, &signals, &config).unwrap();

        let entry_index = |trade: &Trade| {
            result.equity_curve.iter().position(|p| p.date == trade.entry_date).unwrap()
        };
        if let Some(first) = result.trades.first() {
            let expected = sizes[entry_index(first) - 1] * config.initial_capital;
            prop_assert!((first.quantity.abs() * first.entry_price - expected).abs() < 1e-6);
        }
        for trade in &result.trades {
            let t = entry_index(trade);
            prop_assert!(t > 0);
            let before = &result.equity_curve[t - 1];
            let held = before.position_value / closes[t - 1];
            let equity_at_fill = before.cash + held * open[t];
            let mut cash = before.cash;
            if let Some(closed) = result.trades.iter().find(|c| c.exit_date == Some(trade.entry_date)) {
                let exit_price = closed.exit_price.unwrap();
                let exit_commission = closed.quantity * (exit_price - closed.entry_price)
                    - closed.entry_commission
                    - closed.realized_pnl.unwrap();
                cash += closed.quantity * exit_price - exit_commission;
            }
            let mut notional = sizes[t - 1] * equity_at_fill;
            if trade.is_long() {
                notional = notional.min(cash / (1.0 + commission_rate));
            }
            let expected = notional / trade.entry_price;
            prop_assert!(
                (trade.quantity.abs() - expected).abs() <= 1e-9 * expected.max(1.0),
                "quantity {} expected {}", trade.quantity, expected
            );
            let side = if trade.is_long() { 1.0 + slippage } else { 1.0 - slippage };
            prop_assert!((trade.entry_price - open[t] * side).abs() < 1e-9);
        }
    }
}

// ── 6. Equity continuity ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn equity_moves_with_marks_and_fill_costs(
        (closes, (signal, sizes)) in arb_closes(5, 60)
            .prop_flat_map(|c| { let n = c.len(); (Just(c), arb_signals(n)) }),
        allow_short in any::<bool>(),
        commission_rate in 0.0..0.01_f64,
        min_commission in 0.0..5.0_f64,
        slippage in 0.0..0.01_f64,
    ) {
        let table = table_from_closes(&closes);
        let open = table.column("open").unwrap();
        let days = dates(closes.len());
        let signals = SignalTable::new(days.clone(), signal).with_target_size(sizes);
        let config = EngineConfig {
            commission_rate,
            min_commission,
            slippage: SlippageModel::Proportional(slippage),
            allow_short,
            halt_on_bankruptcy: false,
            ..EngineConfig::default()
        };
        let result = run_backtest(&table, &signals, &config).unwrap();
        let curve = &result.equity_curve;

        prop_assert!((curve[0].equity - config.initial_capital).abs() < 1e-9);
        for t in 1..closes.len() {
            let q_prev = held_at(&result.trades, days[t - 1]);
            let q_now = held_at(&result.trades, days[t]);
            let mut costs = 0.0;
            for trade in &result.trades {
                if trade.exit_date == Some(days[t]) {
                    let exit_price = trade.exit_price.unwrap();
                    let exit_commission = trade.quantity * (exit_price - trade.entry_price)
                        - trade.entry_commission
                        - trade.realized_pnl.unwrap();
                    costs += trade.quantity * (open[t] - exit_price) + exit_commission;
                }
                if trade.entry_date == days[t] {
                    costs += trade.quantity * (trade.entry_price - open[t]) + trade.entry_commission;
                }
            }
            let expected = q_prev * (open[t] - closes[t - 1]) + q_now * (closes[t] - open[t]) - costs;
            let actual = curve[t].equity - curve[t - 1].equity;
            prop_assert!(
                (actual - expected).abs() < 1e-6,
                "bar {}: equity moved {} expected {}", t, actual, expected
            );
        }
    }
}

// ── 7. Security gate ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn spaced_negative_shift_is_rejected(
        dot in any::<bool>(),
        (a, b, c, d) in (arb_space(), arb_space(), arb_space(), arb_space()),
        n in 1u32..500,
    ) {
        let text = format!(
            "x = {}shift{a}({b}-{c}{n}{d})",
            if dot { "df['close']." } else { "" }
        );
        let err = security::scan(&text).unwrap_err();
        prop_assert_eq!(err.kind(), LoadErrorKind::SecurityViolation);
    }

    #[test]
    fn spaced_forward_index_is_rejected(
        (a, b, c, d, e) in (arb_space(), arb_space(), arb_space(), arb_space(), arb_space()),
        n in 0u32..500,
    ) {
        let text = format!("y = df.iloc{a}[{b}i{c}+{d}{n}{e}]");
        let err = security::scan(&text).unwrap_err();
        prop_assert_eq!(err.kind(), LoadErrorKind::SecurityViolation);
    }

    #[test]
    fn spaced_forward_slice_is_rejected(
        (a, b, c, d) in (arb_space(), arb_space(), arb_space(), arb_space()),
        n in 0u32..500,
    ) {
        let text = format!("z = df.iloc{a}[{b}{n}{c}:{d}]");
        let err = security::scan(&text).unwrap_err();
        prop_assert_eq!(err.kind(), LoadErrorKind::SecurityViolation);
    }

    #[test]
    fn non_negative_shift_passes(
        dot in any::<bool>(),
        (a, b, c) in (arb_space(), arb_space(), arb_space()),
        n in 0u32..500,
    ) {
        let text = format!(
            "let prev = {}shift{a}({b}{n}{c});",
            if dot { "close." } else { "" }
        );
        prop_assert!(security::scan(&text).is_ok(), "{}", text);
    }
}
