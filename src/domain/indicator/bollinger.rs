//! Bollinger Bands on lagged closes.
//!
//! - Middle: safe_rolling mean over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the sample standard deviation of the same lagged window.
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first `period` bars are undefined.

use crate::domain::indicator::{Aggregate, Series, safe_rolling};

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub middle: Series,
    pub std: Series,
    pub upper: Series,
    pub lower: Series,
}

pub fn safe_bollinger(values: &[f64], period: usize, mult: f64) -> BollingerBands {
    let middle = safe_rolling(values, period, Aggregate::Mean);
    let std = safe_rolling(values, period, Aggregate::Std);
    let band = |sign: f64| -> Series {
        middle
            .iter()
            .zip(&std)
            .map(|(m, s)| Some((*m)? + sign * mult * (*s)?))
            .collect()
    };
    let upper = band(1.0);
    let lower = band(-1.0);
    BollingerBands {
        middle,
        std,
        upper,
        lower,
    }
}
