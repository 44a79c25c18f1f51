//! Trend following on a lagged simple moving average.
//!
//! Buy when close > MA, sell when close < MA.

use log::debug;

use crate::domain::error::{InstantiationError, StrategyError};
use crate::domain::indicator::{Aggregate, safe_rolling};
use crate::domain::ohlcv::PriceTable;
use crate::domain::signal::{SignalTable, compare, convert_to_signal};
use crate::domain::strategy::{ParamValue, Strategy, StrategyParams};

pub const NAME: &str = "MovingAverageStrategy";
pub const FIELDS: &[&str] = &["window"];
pub const DEFAULT_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct MovingAverageStrategy {
    window: usize,
    params: StrategyParams,
}

impl MovingAverageStrategy {
    pub fn new(window: usize) -> Result<Self, InstantiationError> {
        if window == 0 {
            return Err(InstantiationError::InvalidParam {
                name: "window".into(),
                reason: "must be a positive integer, got 0".into(),
            });
        }
        Ok(Self {
            window,
            params: StrategyParams::new().with("window", ParamValue::Number(window as f64)),
        })
    }

    pub fn build(params: &StrategyParams) -> Result<Box<dyn Strategy>, InstantiationError> {
        let window = params.period_or("window", DEFAULT_WINDOW)?;
        Ok(Box::new(Self::new(window)?))
    }
}

impl Strategy for MovingAverageStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn generate_signals(&self, table: &PriceTable) -> Result<SignalTable, StrategyError> {
        let close = table.close()?;
        let ma = safe_rolling(close, self.window, Aggregate::Mean);

        let above = compare(close, &ma, |c, m| c > m);
        let below = compare(close, &ma, |c, m| c < m);
        let signals = SignalTable::new(table.dates().to_vec(), convert_to_signal(&above, &below))
            .with_indicator("ma", ma);
        debug!(
            "{}(window={}): {} active bars of {}",
            NAME,
            self.window,
            signals.active_count(),
            signals.len()
        );
        Ok(signals)
    }
}
