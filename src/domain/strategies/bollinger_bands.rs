//! Bollinger band mean reversion.
//!
//! Entries when close touches the lower band, exits when it touches the
//! upper band.

use crate::domain::error::{InstantiationError, StrategyError};
use crate::domain::indicator::safe_bollinger;
use crate::domain::ohlcv::PriceTable;
use crate::domain::signal::{SignalTable, compare};
use crate::domain::strategy::{Strategy, StrategyParams};

pub const NAME: &str = "BollingerBandsStrategy";
pub const MODULE: &str = "bollinger_bands";

#[derive(Debug, Clone)]
pub struct BollingerBandsStrategy {
    period: usize,
    mult: f64,
    params: StrategyParams,
}

impl BollingerBandsStrategy {
    /// Reads `period` (20) and `mult` (2.0) from the option map; other
    /// options are kept but ignored.
    pub fn from_options(params: &StrategyParams) -> Result<Self, InstantiationError> {
        let period = params.period_or("period", 20)?;
        if period < 2 {
            return Err(InstantiationError::InvalidParam {
                name: "period".into(),
                reason: format!("must be at least 2, got {}", period),
            });
        }
        Ok(Self {
            period,
            mult: params.number_or("mult", 2.0)?,
            params: params.clone(),
        })
    }

    pub fn build(params: &StrategyParams) -> Result<Box<dyn Strategy>, InstantiationError> {
        Ok(Box::new(Self::from_options(params)?))
    }
}

impl Strategy for BollingerBandsStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn generate_signals(&self, table: &PriceTable) -> Result<SignalTable, StrategyError> {
        let close = table.close()?;
        let bands = safe_bollinger(close, self.period, self.mult);

        let entries = compare(close, &bands.lower, |c, l| c <= l);
        let exits = compare(close, &bands.upper, |c, u| c >= u);

        Ok(SignalTable::from_entries_exits(table.dates().to_vec(), &entries, &exits)
            .with_indicator("ma", bands.middle)
            .with_indicator("std", bands.std)
            .with_indicator("upper", bands.upper)
            .with_indicator("lower", bands.lower))
    }
}
