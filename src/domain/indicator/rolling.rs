//! Rolling window aggregates.
//!
//! `rolling(x, n, agg)[i]` aggregates `x[i-n+1..=i]`; a window that contains
//! a missing value, or that does not fit yet, yields `None`.
//! `safe_rolling(x, n, agg) = rolling(shift(x, 1), n, agg)`, so its first
//! `n` outputs are always undefined.
//!
//! Std and Var use the sample (n - 1) denominator; a window of one has no
//! sample variance.

use std::fmt;
use std::str::FromStr;

use crate::domain::indicator::{Series, shift, to_series};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Mean,
    Std,
    Var,
    Min,
    Max,
    Sum,
    Median,
}

impl FromStr for Aggregate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Aggregate::Mean),
            "std" => Ok(Aggregate::Std),
            "var" => Ok(Aggregate::Var),
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            "sum" => Ok(Aggregate::Sum),
            "median" => Ok(Aggregate::Median),
            other => Err(format!(
                "unknown aggregate '{}', expected one of mean, std, var, min, max, sum, median",
                other
            )),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregate::Mean => "mean",
            Aggregate::Std => "std",
            Aggregate::Var => "var",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Sum => "sum",
            Aggregate::Median => "median",
        };
        f.write_str(name)
    }
}

impl Aggregate {
    fn apply(self, window: &[f64]) -> Option<f64> {
        let n = window.len() as f64;
        match self {
            Aggregate::Mean => Some(window.iter().sum::<f64>() / n),
            Aggregate::Sum => Some(window.iter().sum()),
            Aggregate::Min => window.iter().copied().reduce(f64::min),
            Aggregate::Max => window.iter().copied().reduce(f64::max),
            Aggregate::Var => sample_variance(window),
            Aggregate::Std => sample_variance(window).map(f64::sqrt),
            Aggregate::Median => {
                let mut sorted = window.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
        }
    }
}

fn sample_variance(window: &[f64]) -> Option<f64> {
    if window.len() < 2 {
        return None;
    }
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let ss: f64 = window
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum();
    Some(ss / (window.len() - 1) as f64)
}

pub fn rolling(series: &[Option<f64>], window: usize, agg: Aggregate) -> Series {
    let mut out = vec![None; series.len()];
    if window == 0 || window > series.len() {
        return out;
    }
    let mut buf = Vec::with_capacity(window.min(series.len()));
    for i in (window - 1)..series.len() {
        buf.clear();
        buf.extend(series[i + 1 - window..=i].iter().map_while(|v| *v));
        if buf.len() == window {
            out[i] = agg.apply(&buf);
        }
    }
    out
}

pub fn safe_rolling(values: &[f64], window: usize, agg: Aggregate) -> Series {
    rolling(&shift(&to_series(values), 1), window, agg)
}
