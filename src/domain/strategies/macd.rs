//! MACD crossover: enter when the MACD line crosses above its signal line,
//! exit when it crosses below.

use crate::domain::error::{InstantiationError, StrategyError};
use crate::domain::indicator::macd::{DEFAULT_FAST, DEFAULT_SIGNAL, DEFAULT_SLOW};
use crate::domain::indicator::safe_macd;
use crate::domain::ohlcv::PriceTable;
use crate::domain::signal::{SignalTable, cross_above, cross_below};
use crate::domain::strategy::{Strategy, StrategyParams};

pub const NAME: &str = "MACDStrategy";
pub const MODULE: &str = "macd_strategy";

#[derive(Debug, Clone)]
pub struct MacdStrategy {
    fast: usize,
    slow: usize,
    signal_period: usize,
    params: StrategyParams,
}

impl MacdStrategy {
    pub fn from_options(params: &StrategyParams) -> Result<Self, InstantiationError> {
        let fast = params.period_or("fast", DEFAULT_FAST)?;
        let slow = params.period_or("slow", DEFAULT_SLOW)?;
        let signal_period = params.period_or("signal_period", DEFAULT_SIGNAL)?;
        if fast >= slow {
            return Err(InstantiationError::InvalidParam {
                name: "fast".into(),
                reason: format!("must be less than slow ({}), got {}", slow, fast),
            });
        }
        Ok(Self {
            fast,
            slow,
            signal_period,
            params: params.clone(),
        })
    }

    pub fn build(params: &StrategyParams) -> Result<Box<dyn Strategy>, InstantiationError> {
        Ok(Box::new(Self::from_options(params)?))
    }
}

impl Strategy for MacdStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn generate_signals(&self, table: &PriceTable) -> Result<SignalTable, StrategyError> {
        let close = table.close()?;
        let macd = safe_macd(close, self.fast, self.slow, self.signal_period);

        let entries = cross_above(&macd.line, &macd.signal);
        let exits = cross_below(&macd.line, &macd.signal);

        Ok(SignalTable::from_entries_exits(table.dates().to_vec(), &entries, &exits)
            .with_indicator("macd", macd.line)
            .with_indicator("signal_line", macd.signal))
    }
}
