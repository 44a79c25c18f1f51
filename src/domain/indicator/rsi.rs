//! RSI (Relative Strength Index) over the lagged close series.
//!
//! Deltas are taken from `shift(close, 1)`, so RSI at T uses closes up to
//! T-1. Undefined deltas count as zero gain and zero loss. Averages use
//! Wilder smoothing as an exponential weighting with alpha = 1/period:
//! avg[0] = x[0], avg[i] = avg[i-1] * (1 - alpha) + x[i] * alpha
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100
//! If both are zero: undefined
//!
//! Warmup: the first two bars are undefined (no lagged delta exists).

use crate::domain::indicator::{Series, shift, to_series};

pub fn rsi(values: &[f64], period: usize) -> Series {
    let len = values.len();
    let mut out = vec![None; len];
    if period == 0 {
        return out;
    }

    let shifted = shift(&to_series(values), 1);
    let alpha = 1.0 / period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 0..len {
        let delta = if i > 0 {
            match (shifted[i], shifted[i - 1]) {
                (Some(curr), Some(prev)) => Some(curr - prev),
                _ => None,
            }
        } else {
            None
        };
        let change = delta.unwrap_or(0.0);
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i == 0 {
            avg_gain = gain;
            avg_loss = loss;
        } else {
            avg_gain = avg_gain * (1.0 - alpha) + gain * alpha;
            avg_loss = avg_loss * (1.0 - alpha) + loss * alpha;
        }

        if delta.is_none() {
            continue;
        }
        out[i] = if avg_loss == 0.0 {
            if avg_gain > 0.0 { Some(100.0) } else { None }
        } else {
            Some(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
        };
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rsi_empty() {
        assert!(rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_first_two_undefined() {
        let out = rsi(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert!(out[2].is_some());
    }

    #[test]
    fn rsi_all_gains() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&closes, 14);
        assert_relative_eq!(out[19].unwrap(), 100.0);
    }

    #[test]
    fn rsi_all_losses() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&closes, 14);
        assert!(out[19].unwrap().abs() < 1e-12);
    }

    #[test]
    fn rsi_flat_is_undefined() {
        let out = rsi(&[10.0; 8], 3);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn rsi_known_values() {
        // lagged deltas: +1 at T=2, -1 at T=3; alpha = 0.5
        // T=2: gain 0.5, loss 0.0 -> 100
        // T=3: gain 0.25, loss 0.5 -> 100 - 100/1.5
        let out = rsi(&[10.0, 11.0, 10.0, 99.0], 2);
        assert_relative_eq!(out[2].unwrap(), 100.0);
        assert_relative_eq!(out[3].unwrap(), 100.0 - 100.0 / 1.5, epsilon = 1e-12);
    }

    #[test]
    fn rsi_in_range() {
        let closes: Vec<f64> = (1..=40)
            .map(|i| 100.0 + (i as f64 % 7.0 - 3.0) * 2.0)
            .collect();
        for v in rsi(&closes, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v), "RSI {} out of range", v);
        }
    }

    #[test]
    fn rsi_zero_period() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0], 0), vec![None, None, None]);
    }
}
