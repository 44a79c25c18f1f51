//! Backtest engine: next-bar execution over a price and signal table.
//!
//! The signal observed at the close of bar T-1 is acted upon at the open of
//! bar T, never at T-1's own close. Equity is marked at every close.
//!
//! Inputs are validated in full before the first bar is simulated, so a
//! malformed run fails without producing a partial result.
//!
//! With `halt_on_bankruptcy` set, a close that marks equity at or below zero
//! ends the run: the position is closed at that close and the rest of the
//! equity curve reads zero.

use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

use super::error::ValidationError;
use super::execution::{Account, CostModel, EntryResult, SlippageModel};
use super::ohlcv::PriceTable;
use super::position::{EquityPoint, PositionState, Trade};
use super::signal::SignalTable;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;
pub const DEFAULT_COMMISSION_RATE: f64 = 0.001;
pub const DEFAULT_MIN_COMMISSION: f64 = 1.0;
pub const DEFAULT_SLIPPAGE: f64 = 0.0005;
pub const DEFAULT_MIN_EXPOSURE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub min_commission: f64,
    pub slippage: SlippageModel,
    pub allow_leverage: bool,
    pub allow_short: bool,
    pub force_liquidate_at_end: bool,
    /// Target sizes below this count as flat.
    pub min_exposure: f64,
    pub halt_on_bankruptcy: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            commission_rate: DEFAULT_COMMISSION_RATE,
            min_commission: DEFAULT_MIN_COMMISSION,
            slippage: SlippageModel::Proportional(DEFAULT_SLIPPAGE),
            allow_leverage: false,
            allow_short: false,
            force_liquidate_at_end: false,
            min_exposure: DEFAULT_MIN_EXPOSURE,
            halt_on_bankruptcy: true,
        }
    }
}

impl EngineConfig {
    /// No commission, no slippage.
    pub fn frictionless(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            commission_rate: 0.0,
            min_commission: 0.0,
            slippage: SlippageModel::Proportional(0.0),
            ..Self::default()
        }
    }

    pub fn costs(&self) -> CostModel {
        CostModel {
            commission_rate: self.commission_rate,
            min_commission: self.min_commission,
            slippage: self.slippage,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |key: &str, reason: String| ValidationError::InvalidConfig {
            key: key.to_string(),
            reason,
        };
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(invalid(
                "initial_capital",
                format!("must be positive, got {}", self.initial_capital),
            ));
        }
        for (key, value) in [
            ("commission_rate", self.commission_rate),
            ("min_commission", self.min_commission),
            ("slippage", self.slippage.amount()),
            ("min_exposure", self.min_exposure),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(key, format!("must be finite and non-negative, got {}", value)));
            }
        }
        if let SlippageModel::Proportional(rate) = self.slippage {
            if rate >= 1.0 {
                return Err(invalid("slippage", format!("proportional rate must be below 1, got {}", rate)));
            }
        }
        Ok(())
    }

    fn max_size(&self) -> f64 {
        if self.allow_leverage { f64::INFINITY } else { 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    /// Every trade in entry order; the last one may still be open.
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_state: PositionState,
    /// Date of the close that halted the run, if equity ran out.
    pub bankrupt_on: Option<NaiveDate>,
}

impl BacktestResult {
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| !t.is_open())
    }

    pub fn open_trade(&self) -> Option<&Trade> {
        self.trades.last().filter(|t| t.is_open())
    }
}

fn check_prices(prices: &PriceTable) -> Result<(), ValidationError> {
    if prices.is_empty() {
        return Err(ValidationError::Empty);
    }
    for required in ["open", "close"] {
        if !prices.has_column(required) {
            return Err(ValidationError::MissingColumn {
                column: required.to_string(),
            });
        }
    }
    for column in ["open", "close", "high", "low"] {
        let Some(values) = prices.column(column) else {
            continue;
        };
        if let Some((index, &value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v > 0.0))
        {
            return Err(ValidationError::NonPositivePrice {
                index,
                column: column.to_string(),
                value,
            });
        }
    }
    if let Some(index) = prices
        .dates()
        .windows(2)
        .position(|w| w[1] <= w[0])
    {
        return Err(ValidationError::NonMonotonicDates { index: index + 1 });
    }
    Ok(())
}

fn check_signals(
    prices: &PriceTable,
    signals: &SignalTable,
    config: &EngineConfig,
) -> Result<(), ValidationError> {
    if signals.len() != prices.len() || signals.signal.len() != prices.len() {
        return Err(ValidationError::LengthMismatch {
            prices: prices.len(),
            signals: signals.len().min(signals.signal.len()),
        });
    }
    if let Some((index, (price, signal))) = prices
        .dates()
        .iter()
        .zip(&signals.dates)
        .enumerate()
        .find(|(_, (p, s))| p != s)
    {
        return Err(ValidationError::DateMismatch {
            index,
            price: *price,
            signal: *signal,
        });
    }
    if let Some((index, &value)) = signals
        .signal
        .iter()
        .enumerate()
        .find(|(_, s)| !matches!(**s, -1..=1))
    {
        return Err(ValidationError::InvalidSignal { index, value });
    }
    if let Some(sizes) = &signals.target_size {
        if sizes.len() != prices.len() {
            return Err(ValidationError::LengthMismatch {
                prices: prices.len(),
                signals: sizes.len(),
            });
        }
        let max = config.max_size();
        if let Some((index, &value)) = sizes
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v >= 0.0 && **v <= max))
        {
            return Err(ValidationError::TargetSizeOutOfRange { index, value, max });
        }
    }
    Ok(())
}

/// Validates prices, signals and config without simulating anything.
pub fn validate(
    prices: &PriceTable,
    signals: &SignalTable,
    config: &EngineConfig,
) -> Result<(), ValidationError> {
    config.validate()?;
    check_prices(prices)?;
    check_signals(prices, signals, config)
}

/// Held or desired exposure: direction in {-1, 0, 1} and fraction of equity.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Exposure {
    direction: i8,
    size: f64,
}

impl Exposure {
    const FLAT: Exposure = Exposure {
        direction: 0,
        size: 0.0,
    };

    fn differs(&self, other: &Exposure) -> bool {
        self.direction != other.direction || (self.size - other.size).abs() > 1e-12
    }
}

/// What the signal at index `i` asks for, or `None` to hold.
fn desired_exposure(signals: &SignalTable, i: usize, config: &EngineConfig) -> Option<Exposure> {
    let explicit = signals.target_size.as_ref().map(|sizes| sizes[i]);
    let size = explicit.unwrap_or(1.0);
    let direction = match signals.signal[i] {
        1 => 1,
        -1 if config.allow_short => -1,
        -1 => 0,
        _ => match explicit {
            Some(s) if s < config.min_exposure => 0,
            _ => return None,
        },
    };
    if direction == 0 || size < config.min_exposure {
        return Some(Exposure::FLAT);
    }
    Some(Exposure { direction, size })
}

/// Runs one backtest.
pub fn run_backtest(
    prices: &PriceTable,
    signals: &SignalTable,
    config: &EngineConfig,
) -> Result<BacktestResult, ValidationError> {
    validate(prices, signals, config)?;

    let (Some(open), Some(close)) = (prices.column("open"), prices.column("close")) else {
        return Err(ValidationError::MissingColumn {
            column: "open".to_string(),
        });
    };
    let dates = prices.dates();
    let costs = config.costs();

    let mut account = Account::new(config.initial_capital);
    let mut held = Exposure::FLAT;
    let mut equity_curve = Vec::with_capacity(prices.len());
    let mut bankrupt_on = None;

    for t in 0..prices.len() {
        if t > 0 {
            if let Some(desired) = desired_exposure(signals, t - 1, config) {
                if desired.differs(&held) {
                    let equity = account.equity(open[t]);
                    account.exit(dates[t], open[t], &costs);
                    held = Exposure::FLAT;
                    if desired.direction != 0 {
                        match account.enter(
                            dates[t],
                            open[t],
                            desired.direction,
                            desired.size,
                            equity,
                            config.allow_leverage,
                            &costs,
                        ) {
                            EntryResult::Entered { .. } => held = desired,
                            EntryResult::InsufficientCapital => {
                                warn!("{}: skipped entry, insufficient capital", dates[t]);
                            }
                        }
                    }
                }
            }
        }

        let position_value = account.position_value(close[t]);
        let equity = account.cash + position_value;
        if config.halt_on_bankruptcy && equity <= 0.0 {
            warn!("{}: bankrupt (equity {:.2}), stopping backtest", dates[t], equity);
            account.exit(dates[t], close[t], &costs);
            account.cash = 0.0;
            equity_curve.extend(dates[t..].iter().map(|&date| EquityPoint::zero(date)));
            bankrupt_on = Some(dates[t]);
            break;
        }
        equity_curve.push(EquityPoint {
            date: dates[t],
            equity,
            cash: account.cash,
            position_value,
        });
    }

    let last = prices.len() - 1;
    if config.force_liquidate_at_end && account.open.is_some() {
        account.exit(dates[last], close[last], &costs);
        if let Some(point) = equity_curve.last_mut() {
            point.cash = account.cash;
            point.position_value = 0.0;
            point.equity = account.cash;
        }
    }

    let final_state = PositionState {
        cash: account.cash,
        quantity: account.quantity(),
        entry_price: account.open.as_ref().map(|t| t.entry_price),
        equity: if bankrupt_on.is_some() { 0.0 } else { account.equity(close[last]) },
    };
    let mut trades = account.trades;
    trades.extend(account.open);

    info!(
        "backtest: {} bars, {} trades, final equity {:.2}",
        prices.len(),
        trades.len(),
        final_state.equity
    );

    Ok(BacktestResult {
        trades,
        equity_curve,
        final_state,
        bankrupt_on,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64))
            .collect()
    }

    fn flat_prices(n: usize, price: f64) -> PriceTable {
        PriceTable::new(dates(n))
            .with_column("open", vec![price; n])
            .with_column("close", vec![price; n])
    }

    fn prices(open: &[f64], close: &[f64]) -> PriceTable {
        PriceTable::new(dates(open.len()))
            .with_column("open", open.to_vec())
            .with_column("close", close.to_vec())
    }

    #[test]
    fn half_size_buy_fills_next_open() {
        let mut signal = vec![0; 5];
        signal[0] = 1;
        let signals = SignalTable::new(dates(5), signal).with_target_size(vec![0.5; 5]);
        let result = run_backtest(&flat_prices(5, 100.0), &signals, &EngineConfig::frictionless(10_000.0)).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_date, dates(5)[1]);
        assert!((trade.entry_price - 100.0).abs() < f64::EPSILON);
        assert!((trade.quantity - 50.0).abs() < 1e-9);
        assert!(trade.is_open());
    }

    #[test]
    fn signal_on_last_bar_is_never_filled() {
        let mut signal = vec![0; 4];
        signal[3] = 1;
        let signals = SignalTable::new(dates(4), signal);
        let result = run_backtest(&flat_prices(4, 10.0), &signals, &EngineConfig::frictionless(1_000.0)).unwrap();
        assert!(result.trades.is_empty());
        assert!(result.final_state.is_flat());
    }

    #[test]
    fn zero_signal_holds() {
        let signals = SignalTable::new(dates(5), vec![1, 0, 0, 0, 0]);
        let result = run_backtest(&flat_prices(5, 10.0), &signals, &EngineConfig::frictionless(1_000.0)).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert!(result.open_trade().is_some());
    }

    #[test]
    fn explicit_zero_size_flattens() {
        let signals = SignalTable::new(dates(5), vec![1, 0, 0, 0, 0])
            .with_target_size(vec![1.0, 1.0, 0.0, 1.0, 1.0]);
        let result = run_backtest(&flat_prices(5, 10.0), &signals, &EngineConfig::frictionless(1_000.0)).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_date, Some(dates(5)[3]));
    }

    #[test]
    fn reversal_closes_then_opens_short() {
        let config = EngineConfig {
            allow_short: true,
            ..EngineConfig::frictionless(1_000.0)
        };
        let signals = SignalTable::new(dates(4), vec![1, -1, 0, 0]);
        let result = run_backtest(&prices(&[10.0, 10.0, 12.0, 11.0], &[10.0, 10.0, 12.0, 11.0]), &signals, &config).unwrap();

        assert_eq!(result.trades.len(), 2);
        let long = &result.trades[0];
        assert_eq!(long.realized_pnl, Some(200.0));
        let short = &result.trades[1];
        assert!(short.is_short());
        assert!((short.quantity + 100.0).abs() < 1e-9);
        assert!((result.final_state.equity - 1_300.0).abs() < 1e-9);
    }

    #[test]
    fn short_signal_without_shorting_goes_flat() {
        let signals = SignalTable::new(dates(4), vec![1, -1, 0, 0]);
        let result = run_backtest(&flat_prices(4, 10.0), &signals, &EngineConfig::frictionless(1_000.0)).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert!(!result.trades[0].is_open());
        assert!(result.final_state.is_flat());
    }

    #[test]
    fn repeated_signal_does_not_reenter() {
        let signals = SignalTable::new(dates(5), vec![1, 1, 1, 1, 1]);
        let result = run_backtest(&flat_prices(5, 10.0), &signals, &EngineConfig::default()).unwrap();
        assert_eq!(result.trades.len(), 1);
    }

    #[test]
    fn size_change_rebalances() {
        let signals = SignalTable::new(dates(4), vec![1, 1, 0, 0]).with_target_size(vec![1.0, 0.5, 0.5, 0.5]);
        let result = run_backtest(&flat_prices(4, 10.0), &signals, &EngineConfig::frictionless(1_000.0)).unwrap();
        assert_eq!(result.trades.len(), 2);
        assert!((result.trades[1].quantity - 50.0).abs() < 1e-9);
    }

    #[test]
    fn sizes_below_min_exposure_are_flat() {
        let signals = SignalTable::new(dates(3), vec![1, 0, 0]).with_target_size(vec![0.0005, 0.0, 0.0]);
        let result = run_backtest(&flat_prices(3, 10.0), &signals, &EngineConfig::frictionless(1_000.0)).unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn force_liquidation_closes_at_last_close() {
        let config = EngineConfig {
            force_liquidate_at_end: true,
            ..EngineConfig::frictionless(1_000.0)
        };
        let signals = SignalTable::new(dates(3), vec![1, 0, 0]);
        let result = run_backtest(&prices(&[10.0, 10.0, 10.0], &[10.0, 10.0, 15.0]), &signals, &config).unwrap();
        let trade = &result.trades[0];
        assert_eq!(trade.exit_price, Some(15.0));
        assert_eq!(trade.realized_pnl, Some(500.0));
        assert!(result.final_state.is_flat());
        assert!((result.equity_curve.last().unwrap().equity - 1_500.0).abs() < 1e-9);
    }

    #[test]
    fn equity_is_marked_at_close() {
        let signals = SignalTable::new(dates(3), vec![1, 0, 0]);
        let result = run_backtest(&prices(&[10.0, 10.0, 11.0], &[10.0, 12.0, 13.0]), &signals, &EngineConfig::frictionless(1_000.0)).unwrap();
        let equity: Vec<f64> = result.equity_curve.iter().map(|p| p.equity).collect();
        assert_eq!(equity, vec![1_000.0, 1_200.0, 1_300.0]);
    }

    #[test]
    fn validation_rejects_before_simulating() {
        let config = EngineConfig::frictionless(1_000.0);
        let ok = flat_prices(3, 10.0);

        let short = SignalTable::new(dates(2), vec![0, 0]);
        assert!(matches!(run_backtest(&ok, &short, &config), Err(ValidationError::LengthMismatch { .. })));

        let bad_signal = SignalTable::new(dates(3), vec![0, 2, 0]);
        assert_eq!(
            run_backtest(&ok, &bad_signal, &config).unwrap_err(),
            ValidationError::InvalidSignal { index: 1, value: 2 }
        );

        let oversized = SignalTable::new(dates(3), vec![1, 0, 0]).with_target_size(vec![1.5, 0.0, 0.0]);
        assert!(matches!(
            run_backtest(&ok, &oversized, &config),
            Err(ValidationError::TargetSizeOutOfRange { index: 0, .. })
        ));

        let negative = prices(&[10.0, -1.0, 10.0], &[10.0, 10.0, 10.0]);
        assert!(matches!(
            run_backtest(&negative, &SignalTable::new(dates(3), vec![0; 3]), &config),
            Err(ValidationError::NonPositivePrice { index: 1, .. })
        ));

        let no_open = PriceTable::new(dates(3)).with_column("close", vec![10.0; 3]);
        assert!(matches!(
            run_backtest(&no_open, &SignalTable::new(dates(3), vec![0; 3]), &config),
            Err(ValidationError::MissingColumn { .. })
        ));
    }

    #[test]
    fn dates_must_align_and_increase() {
        let config = EngineConfig::frictionless(1_000.0);
        let mut shifted = dates(3);
        shifted[2] = shifted[2] + chrono::Days::new(5);
        let signals = SignalTable::new(shifted, vec![0; 3]);
        assert!(matches!(
            run_backtest(&flat_prices(3, 10.0), &signals, &config),
            Err(ValidationError::DateMismatch { index: 2, .. })
        ));

        let mut repeated = dates(3);
        repeated[2] = repeated[1];
        let prices = PriceTable::new(repeated.clone())
            .with_column("open", vec![10.0; 3])
            .with_column("close", vec![10.0; 3]);
        assert_eq!(
            run_backtest(&prices, &SignalTable::new(repeated, vec![0; 3]), &config).unwrap_err(),
            ValidationError::NonMonotonicDates { index: 2 }
        );
    }

    #[test]
    fn leverage_allows_sizes_above_one() {
        let config = EngineConfig {
            allow_leverage: true,
            ..EngineConfig::frictionless(1_000.0)
        };
        let signals = SignalTable::new(dates(3), vec![1, 0, 0]).with_target_size(vec![2.0, 2.0, 2.0]);
        let result = run_backtest(&flat_prices(3, 10.0), &signals, &config).unwrap();
        assert!((result.trades[0].quantity - 200.0).abs() < 1e-9);
    }

    fn squeeze() -> PriceTable {
        let path = [10.0, 10.0, 25.0, 30.0, 30.0];
        prices(&path, &path)
    }

    #[test]
    fn bankruptcy_halts_and_zero_fills() {
        let config = EngineConfig {
            allow_short: true,
            ..EngineConfig::frictionless(1_000.0)
        };
        let signals = SignalTable::new(dates(5), vec![-1, 0, 0, 1, 0]);
        let result = run_backtest(&squeeze(), &signals, &config).unwrap();

        assert_eq!(result.bankrupt_on, Some(dates(5)[2]));
        let equity: Vec<f64> = result.equity_curve.iter().map(|p| p.equity).collect();
        assert_eq!(equity, vec![1_000.0, 1_000.0, 0.0, 0.0, 0.0]);
        assert!(result.equity_curve[2..].iter().all(|p| p.cash == 0.0 && p.position_value == 0.0));

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_date, Some(dates(5)[2]));
        assert_eq!(trade.realized_pnl, Some(-1_500.0));
        assert!(result.final_state.is_flat());
        assert_eq!(result.final_state.equity, 0.0);
    }

    #[test]
    fn bankruptcy_halt_can_be_disabled() {
        let config = EngineConfig {
            allow_short: true,
            halt_on_bankruptcy: false,
            ..EngineConfig::frictionless(1_000.0)
        };
        let signals = SignalTable::new(dates(5), vec![-1, 0, 0, 0, 0]);
        let result = run_backtest(&squeeze(), &signals, &config).unwrap();

        assert_eq!(result.bankrupt_on, None);
        let equity: Vec<f64> = result.equity_curve.iter().map(|p| p.equity).collect();
        assert_eq!(equity, vec![1_000.0, 1_000.0, -500.0, -1_000.0, -1_000.0]);
        assert!(result.open_trade().is_some());
    }

    #[test]
    fn config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        let bad = EngineConfig {
            initial_capital: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(bad.validate(), Err(ValidationError::InvalidConfig { .. })));
        let bad = EngineConfig {
            slippage: SlippageModel::PerUnit(-1.0),
            ..EngineConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
