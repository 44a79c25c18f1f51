//! Bollinger band breakout.
//!
//! Buy when close breaks above the upper band, sell when it falls below
//! the middle band.

use crate::domain::error::{InstantiationError, StrategyError};
use crate::domain::indicator::safe_bollinger;
use crate::domain::ohlcv::PriceTable;
use crate::domain::signal::{SignalTable, compare, convert_to_signal};
use crate::domain::strategy::{ParamValue, Strategy, StrategyParams};

pub const NAME: &str = "BollingerBreakoutStrategy";
pub const FIELDS: &[&str] = &["window", "std_dev"];

#[derive(Debug, Clone)]
pub struct BollingerBreakoutStrategy {
    window: usize,
    std_dev: f64,
    params: StrategyParams,
}

impl BollingerBreakoutStrategy {
    pub fn new(window: usize, std_dev: f64) -> Result<Self, InstantiationError> {
        if window < 2 {
            return Err(InstantiationError::InvalidParam {
                name: "window".into(),
                reason: format!("must be at least 2, got {}", window),
            });
        }
        Ok(Self {
            window,
            std_dev,
            params: StrategyParams::new()
                .with("window", ParamValue::Number(window as f64))
                .with("std_dev", ParamValue::Number(std_dev)),
        })
    }

    pub fn build(params: &StrategyParams) -> Result<Box<dyn Strategy>, InstantiationError> {
        Ok(Box::new(Self::new(
            params.period_or("window", 20)?,
            params.number_or("std_dev", 2.0)?,
        )?))
    }
}

impl Strategy for BollingerBreakoutStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn generate_signals(&self, table: &PriceTable) -> Result<SignalTable, StrategyError> {
        let close = table.close()?;
        let bands = safe_bollinger(close, self.window, self.std_dev);

        let breakout = compare(close, &bands.upper, |c, u| c > u);
        let breakdown = compare(close, &bands.middle, |c, m| c < m);

        Ok(
            SignalTable::new(table.dates().to_vec(), convert_to_signal(&breakout, &breakdown))
                .with_indicator("ma", bands.middle)
                .with_indicator("std", bands.std)
                .with_indicator("upper", bands.upper),
        )
    }
}
