//! Signal tables and the helpers strategies use to build them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::error::StrategyError;
use crate::domain::indicator::Series;

/// Strategy output aligned to the input dates.
///
/// `signal` is a directional pulse in {-1, 0, 1} with no undefined entries.
/// `target_size`, when present, is the fraction of equity to deploy.
/// Indicator columns are carried along for inspection only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalTable {
    pub dates: Vec<NaiveDate>,
    pub signal: Vec<i8>,
    pub target_size: Option<Vec<f64>>,
    pub indicators: BTreeMap<String, Series>,
}

impl SignalTable {
    /// # Panics
    ///
    /// Panics if `signal` and `dates` differ in length.
    pub fn new(dates: Vec<NaiveDate>, signal: Vec<i8>) -> Self {
        assert_eq!(dates.len(), signal.len(), "signal length must match dates");
        Self {
            dates,
            signal,
            target_size: None,
            indicators: BTreeMap::new(),
        }
    }

    pub fn from_entries_exits(dates: Vec<NaiveDate>, entries: &[bool], exits: &[bool]) -> Self {
        Self::new(dates, convert_to_signal(entries, exits))
    }

    /// # Panics
    ///
    /// Panics if `sizes` does not have one entry per date.
    pub fn with_target_size(mut self, sizes: Vec<f64>) -> Self {
        assert_eq!(sizes.len(), self.dates.len(), "target_size length must match dates");
        self.target_size = Some(sizes);
        self
    }

    /// Adds an inspection column, keyed case-insensitively.
    ///
    /// # Panics
    ///
    /// Panics if `series` does not have one entry per date.
    pub fn with_indicator(mut self, name: &str, series: Series) -> Self {
        assert_eq!(series.len(), self.dates.len(), "indicator length must match dates");
        self.indicators.insert(name.to_lowercase(), series);
        self
    }

    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    pub fn indicator(&self, name: &str) -> Option<&Series> {
        self.indicators.get(&name.to_lowercase())
    }

    /// Number of non-zero pulses.
    pub fn active_count(&self) -> usize {
        self.signal.iter().filter(|s| **s != 0).count()
    }
}

/// Entries map to 1, exits to -1; exits win when both fire on one bar.
pub fn convert_to_signal(entries: &[bool], exits: &[bool]) -> Vec<i8> {
    entries
        .iter()
        .zip(exits)
        .map(|(entry, exit)| {
            if *exit {
                -1
            } else if *entry {
                1
            } else {
                0
            }
        })
        .collect()
}

/// Latches entry/exit pulses into a held state.
///
/// Flat: an entry switches to held, exits are ignored.
/// Held: an exit switches to flat, further entries are ignored.
pub fn latch(entries: &[bool], exits: &[bool]) -> Vec<bool> {
    let mut held = false;
    entries
        .iter()
        .zip(exits)
        .map(|(entry, exit)| {
            if held {
                if *exit {
                    held = false;
                }
            } else if *entry {
                held = true;
            }
            held
        })
        .collect()
}

/// Coerces a numeric series into a signal column.
///
/// Missing values become 0; anything else must be exactly -1, 0 or 1.
pub fn signal_from_series(values: &[Option<f64>]) -> Result<Vec<i8>, StrategyError> {
    values
        .iter()
        .enumerate()
        .map(|(index, v)| match v {
            None => Ok(0),
            Some(x) if *x == 1.0 => Ok(1),
            Some(x) if *x == -1.0 => Ok(-1),
            Some(x) if *x == 0.0 => Ok(0),
            Some(x) => Err(StrategyError::InvalidSignal { index, value: *x }),
        })
        .collect()
}

/// `a[i] > b[i] && a[i-1] <= b[i-1]`, false wherever any operand is missing.
pub fn cross_above(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<bool> {
    crossing(a, b, |curr_a, curr_b, prev_a, prev_b| {
        curr_a > curr_b && prev_a <= prev_b
    })
}

/// `a[i] < b[i] && a[i-1] >= b[i-1]`, false wherever any operand is missing.
pub fn cross_below(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<bool> {
    crossing(a, b, |curr_a, curr_b, prev_a, prev_b| {
        curr_a < curr_b && prev_a >= prev_b
    })
}

fn crossing(
    a: &[Option<f64>],
    b: &[Option<f64>],
    test: impl Fn(f64, f64, f64, f64) -> bool,
) -> Vec<bool> {
    let len = a.len().min(b.len());
    (0..len)
        .map(|i| {
            if i == 0 {
                return false;
            }
            match (a[i], b[i], a[i - 1], b[i - 1]) {
                (Some(ca), Some(cb), Some(pa), Some(pb)) => test(ca, cb, pa, pb),
                _ => false,
            }
        })
        .collect()
}

/// Elementwise comparison of a raw column against an indicator. Missing
/// indicator values compare false.
pub fn compare(values: &[f64], indicator: &[Option<f64>], op: fn(f64, f64) -> bool) -> Vec<bool> {
    values
        .iter()
        .zip(indicator)
        .map(|(v, ind)| ind.is_some_and(|x| op(*v, x)))
        .collect()
}
