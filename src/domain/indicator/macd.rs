//! MACD (Moving Average Convergence Divergence) on lagged closes.
//!
//! MACD Line = safe_ema(fast) - safe_ema(slow)
//! Signal Line = ema(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: the first bar (nothing before it to lag from).

use crate::domain::indicator::{Series, ema, safe_ema};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn safe_macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let fast_ema = safe_ema(values, fast);
    let slow_ema = safe_ema(values, slow);
    let line: Series = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = ema(&line, signal_period);
    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| Some((*l)? - (*s)?))
        .collect();
    MacdSeries {
        line,
        signal,
        histogram,
    }
}
