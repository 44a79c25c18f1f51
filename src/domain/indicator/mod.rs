//! Bias-safe technical indicators.
//!
//! Every indicator here produces a [`Series`] aligned to its input, where
//! `None` marks an undefined value (warmup, missing input, division by
//! zero). The `safe_*` functions lag their input by one step before
//! aggregating, so the value at index T only depends on observations
//! strictly before T.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rolling;
pub mod rsi;

pub use bollinger::{BollingerBands, safe_bollinger};
pub use ema::{ema, safe_ema};
pub use macd::{MacdSeries, safe_macd};
pub use roc::safe_pct_change;
pub use rolling::{Aggregate, rolling, safe_rolling};
pub use rsi::rsi;

/// A time series with `None` as the missing-value marker.
pub type Series = Vec<Option<f64>>;

/// Wraps raw observations, treating non-finite values as missing.
pub fn to_series(values: &[f64]) -> Series {
    values
        .iter()
        .map(|v| if v.is_finite() { Some(*v) } else { None })
        .collect()
}

/// Lags a series by `n` steps. The first `n` outputs are `None`.
pub fn shift(series: &[Option<f64>], n: usize) -> Series {
    let len = series.len();
    let mut out = vec![None; len];
    if n < len {
        out[n..].copy_from_slice(&series[..len - n]);
    }
    out
}

/// Replaces missing values with `value`.
pub fn fillna(series: &[Option<f64>], value: f64) -> Vec<f64> {
    series.iter().map(|v| v.unwrap_or(value)).collect()
}
