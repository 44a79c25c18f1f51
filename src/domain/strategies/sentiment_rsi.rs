//! RSI mean reversion gated by sentiment.
//!
//! Buy when RSI < buy_threshold and sentiment >= sentiment_threshold.
//! Sell when RSI > sell_threshold; a sell wins over a buy on the same bar.
//! Target size comes from a [`SentimentSizer`] cut off at the sentiment
//! threshold, or is a flat 1.0 when dynamic sizing is off.

use crate::domain::error::{InstantiationError, StrategyError};
use crate::domain::indicator::rsi;
use crate::domain::ohlcv::PriceTable;
use crate::domain::signal::{SignalTable, convert_to_signal};
use crate::domain::sizing::{PositionSizer, SentimentSizer};
use crate::domain::strategy::{ParamValue, Strategy, StrategyParams};

pub const NAME: &str = "SentimentRSIStrategy";
pub const FIELDS: &[&str] = &[
    "period",
    "buy_threshold",
    "sell_threshold",
    "sentiment_threshold",
    "use_dynamic_sizing",
];

#[derive(Debug, Clone)]
pub struct SentimentRsiStrategy {
    period: usize,
    buy_threshold: f64,
    sell_threshold: f64,
    sentiment_threshold: f64,
    use_dynamic_sizing: bool,
    sizer: SentimentSizer,
    params: StrategyParams,
}

impl SentimentRsiStrategy {
    pub fn new(
        period: usize,
        buy_threshold: f64,
        sell_threshold: f64,
        sentiment_threshold: f64,
        use_dynamic_sizing: bool,
    ) -> Result<Self, InstantiationError> {
        if period == 0 {
            return Err(InstantiationError::InvalidParam {
                name: "period".into(),
                reason: "must be a positive integer, got 0".into(),
            });
        }
        let sizer = SentimentSizer::with_threshold(sentiment_threshold).map_err(|e| {
            InstantiationError::InvalidParam {
                name: "sentiment_threshold".into(),
                reason: e.to_string(),
            }
        })?;
        let params = StrategyParams::new()
            .with("period", ParamValue::Number(period as f64))
            .with("buy_threshold", ParamValue::Number(buy_threshold))
            .with("sell_threshold", ParamValue::Number(sell_threshold))
            .with("sentiment_threshold", ParamValue::Number(sentiment_threshold))
            .with("use_dynamic_sizing", ParamValue::Flag(use_dynamic_sizing));
        Ok(Self {
            period,
            buy_threshold,
            sell_threshold,
            sentiment_threshold,
            use_dynamic_sizing,
            sizer,
            params,
        })
    }

    pub fn build(params: &StrategyParams) -> Result<Box<dyn Strategy>, InstantiationError> {
        Ok(Box::new(Self::new(
            params.period_or("period", 14)?,
            params.number_or("buy_threshold", 30.0)?,
            params.number_or("sell_threshold", 70.0)?,
            params.number_or("sentiment_threshold", 0.0)?,
            params.flag_or("use_dynamic_sizing", true)?,
        )?))
    }
}

impl Strategy for SentimentRsiStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn generate_signals(&self, table: &PriceTable) -> Result<SignalTable, StrategyError> {
        let close = table.close()?;
        let sentiment = table.sentiment();
        let rsi = rsi(close, self.period);

        let buys: Vec<bool> = rsi
            .iter()
            .zip(&sentiment)
            .map(|(r, s)| r.is_some_and(|r| r < self.buy_threshold) && *s >= self.sentiment_threshold)
            .collect();
        let sells: Vec<bool> = rsi
            .iter()
            .map(|r| r.is_some_and(|r| r > self.sell_threshold))
            .collect();

        let target_size = if self.use_dynamic_sizing {
            self.sizer.get_target_weights(&sentiment)
        } else {
            vec![1.0; close.len()]
        };

        Ok(
            SignalTable::new(table.dates().to_vec(), convert_to_signal(&buys, &sells))
                .with_target_size(target_size)
                .with_indicator("rsi", rsi),
        )
    }
}
