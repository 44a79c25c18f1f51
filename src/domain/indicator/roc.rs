//! Bias-safe percent change.
//!
//! safe_pct_change(x, n)[i] = x[i-1] / x[i-1-n] - 1
//! Undefined for the first n+1 bars and wherever the base is zero or missing.

use crate::domain::indicator::{Series, shift, to_series};

pub fn safe_pct_change(values: &[f64], periods: usize) -> Series {
    let shifted = shift(&to_series(values), 1);
    let mut out = vec![None; shifted.len()];
    if periods == 0 {
        return out;
    }
    for i in periods..shifted.len() {
        out[i] = match (shifted[i], shifted[i - periods]) {
            (Some(curr), Some(prev)) if prev != 0.0 => Some(curr / prev - 1.0),
            _ => None,
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pct_change_warmup() {
        let out = safe_pct_change(&[100.0, 110.0, 121.0, 133.1], 1);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_relative_eq!(out[2].unwrap(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(out[3].unwrap(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn pct_change_multi_period() {
        let out = safe_pct_change(&[100.0, 50.0, 200.0, 0.0], 2);
        assert_eq!(&out[..3], &[None, None, None]);
        assert_relative_eq!(out[3].unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_base_is_undefined() {
        let out = safe_pct_change(&[0.0, 5.0, 7.0], 1);
        assert_eq!(out[2], None);
    }

    #[test]
    fn current_bar_is_never_read() {
        let a = safe_pct_change(&[1.0, 2.0, 4.0, 8.0], 1);
        let b = safe_pct_change(&[1.0, 2.0, 4.0, 1000.0], 1);
        assert_eq!(a, b);
    }
}
