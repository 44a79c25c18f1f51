//! Built-in strategies and their registration tables.
//!
//! Presets are looked up by exact type name. Module strategies are looked
//! up by snake_case module name, the way a strategy script file would be.

pub mod bollinger_bands;
pub mod bollinger_breakout;
pub mod macd;
pub mod moving_average;
pub mod sentiment_rsi;

pub use bollinger_bands::BollingerBandsStrategy;
pub use bollinger_breakout::BollingerBreakoutStrategy;
pub use macd::MacdStrategy;
pub use moving_average::MovingAverageStrategy;
pub use sentiment_rsi::SentimentRsiStrategy;

use crate::domain::strategy::{Construction, StrategyDescriptor};

pub static PRESETS: [StrategyDescriptor; 3] = [
    StrategyDescriptor {
        name: moving_average::NAME,
        module: None,
        summary: "close above/below a lagged moving average",
        construction: Construction::LegacyFields {
            fields: moving_average::FIELDS,
            build: MovingAverageStrategy::build,
        },
    },
    StrategyDescriptor {
        name: sentiment_rsi::NAME,
        module: None,
        summary: "RSI mean reversion gated and sized by sentiment",
        construction: Construction::LegacyFields {
            fields: sentiment_rsi::FIELDS,
            build: SentimentRsiStrategy::build,
        },
    },
    StrategyDescriptor {
        name: bollinger_breakout::NAME,
        module: None,
        summary: "breakout above the upper band, exit below the middle band",
        construction: Construction::LegacyFields {
            fields: bollinger_breakout::FIELDS,
            build: BollingerBreakoutStrategy::build,
        },
    },
];

pub static MODULES: [StrategyDescriptor; 2] = [
    StrategyDescriptor {
        name: bollinger_bands::NAME,
        module: Some(bollinger_bands::MODULE),
        summary: "enter at the lower band, exit at the upper band",
        construction: Construction::Options(BollingerBandsStrategy::build),
    },
    StrategyDescriptor {
        name: macd::NAME,
        module: Some(macd::MODULE),
        summary: "MACD line crossing its signal line",
        construction: Construction::Options(MacdStrategy::build),
    },
];

pub fn preset(name: &str) -> Option<&'static StrategyDescriptor> {
    PRESETS.iter().find(|d| d.name == name)
}

/// The first strategy registered for `module`.
pub fn first_in_module(module: &str) -> Option<&'static StrategyDescriptor> {
    MODULES.iter().find(|d| d.module == Some(module))
}

pub fn all() -> impl Iterator<Item = &'static StrategyDescriptor> {
    PRESETS.iter().chain(MODULES.iter())
}
