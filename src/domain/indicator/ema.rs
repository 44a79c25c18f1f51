//! Exponential Moving Average.
//!
//! k = 2/(span+1), EMA[first] = x[first], then EMA[i] = x[i]*k + EMA[i-1]*(1-k).
//! The recursion starts at the first defined input; leading missing values
//! stay missing, and a missing input in the middle yields `None` without
//! resetting the recursion.
//!
//! `ema` is causal on whatever it is given. `safe_ema` lags the raw
//! observations by one step first.

use crate::domain::indicator::{Series, shift, to_series};

pub fn ema(series: &[Option<f64>], span: usize) -> Series {
    let mut out = vec![None; series.len()];
    if span == 0 {
        return out;
    }
    let k = 2.0 / (span as f64 + 1.0);
    let mut state: Option<f64> = None;

    for (i, value) in series.iter().enumerate() {
        let Some(x) = *value else {
            continue;
        };
        let next = match state {
            None => x,
            Some(prev) => x * k + prev * (1.0 - k),
        };
        state = Some(next);
        out[i] = Some(next);
    }
    out
}

pub fn safe_ema(values: &[f64], span: usize) -> Series {
    ema(&shift(&to_series(values), 1), span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ema_seeds_with_first_value() {
        let out = ema(&to_series(&[10.0, 20.0, 30.0]), 3);
        assert_relative_eq!(out[0].unwrap(), 10.0);
        assert_relative_eq!(out[1].unwrap(), 15.0);
        assert_relative_eq!(out[2].unwrap(), 22.5);
    }

    #[test]
    fn ema_keeps_leading_missing() {
        let out = ema(&[None, None, Some(4.0), Some(6.0)], 1);
        assert_eq!(out, vec![None, None, Some(4.0), Some(6.0)]);
    }

    #[test]
    fn ema_constant_series() {
        let out = ema(&to_series(&[50.0; 10]), 4);
        for v in out.into_iter().flatten() {
            assert_relative_eq!(v, 50.0);
        }
    }

    #[test]
    fn safe_ema_is_lagged() {
        let out = safe_ema(&[10.0, 20.0, 30.0, 40.0], 3);
        assert_eq!(out[0], None);
        assert_relative_eq!(out[1].unwrap(), 10.0);
        assert_relative_eq!(out[2].unwrap(), 15.0);
    }

    #[test]
    fn ema_zero_span() {
        assert_eq!(ema(&to_series(&[1.0]), 0), vec![None]);
    }
}
