//! Price bars and the columnar price table strategies consume.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::domain::error::StrategyError;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sentiment: Option<f64>,
}

impl PriceBar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Dates plus named numeric columns.
///
/// Column names are lowercased on insertion and every lookup is
/// case-insensitive, so `Close`, `CLOSE` and `close` address the same data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl PriceTable {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: BTreeMap::new(),
        }
    }

    /// Builds a table with `open/high/low/close/volume`, plus `sentiment`
    /// when at least one bar carries a score.
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        let mut table = Self::new(bars.iter().map(|b| b.date).collect());
        table.columns.insert("open".into(), bars.iter().map(|b| b.open).collect());
        table.columns.insert("high".into(), bars.iter().map(|b| b.high).collect());
        table.columns.insert("low".into(), bars.iter().map(|b| b.low).collect());
        table
            .columns
            .insert("close".into(), bars.iter().map(|b| b.close).collect());
        table
            .columns
            .insert("volume".into(), bars.iter().map(|b| b.volume).collect());
        if bars.iter().any(|b| b.sentiment.is_some()) {
            table.columns.insert(
                "sentiment".into(),
                bars.iter().map(|b| b.sentiment.unwrap_or(f64::NAN)).collect(),
            );
        }
        table
    }

    /// Adds or replaces a column. Panics if the length does not match the
    /// date index, which is a programming error rather than bad input.
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Self {
        self.insert_column(name, values);
        self
    }

    pub fn insert_column(&mut self, name: &str, values: Vec<f64>) {
        assert_eq!(
            values.len(),
            self.dates.len(),
            "column '{}' length does not match the date index",
            name
        );
        self.columns.insert(name.to_lowercase(), values);
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(&name.to_lowercase())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    /// A column every caller requires; absence is a strategy error.
    pub fn require(&self, name: &str) -> Result<&[f64], StrategyError> {
        self.column(name).ok_or_else(|| StrategyError::MissingColumn {
            column: name.to_lowercase(),
        })
    }

    pub fn close(&self) -> Result<&[f64], StrategyError> {
        self.require("close")
    }

    /// A column that may be absent: missing columns and missing values
    /// inside it both read as `default`.
    pub fn column_or(&self, name: &str, default: f64) -> Vec<f64> {
        match self.column(name) {
            Some(values) => values
                .iter()
                .map(|v| if v.is_finite() { *v } else { default })
                .collect(),
            None => vec![default; self.len()],
        }
    }

    /// Sentiment scores, neutral (0.0) where unknown.
    pub fn sentiment(&self) -> Vec<f64> {
        self.column_or("sentiment", 0.0)
    }

    /// Rows whose dates fall inside the inclusive range.
    pub fn slice_dates(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e))
            .map(|(i, _)| i)
            .collect();
        let mut table = Self::new(keep.iter().map(|&i| self.dates[i]).collect());
        for (name, values) in &self.columns {
            table
                .columns
                .insert(name.clone(), keep.iter().map(|&i| values[i]).collect());
        }
        table
    }

    /// A copy truncated to the first `len` rows.
    pub fn head(&self, len: usize) -> Self {
        let len = len.min(self.len());
        let mut table = Self::new(self.dates[..len].to_vec());
        for (name, values) in &self.columns {
            table.columns.insert(name.clone(), values[..len].to_vec());
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn sample_bars() -> Vec<PriceBar> {
        (1..=3)
            .map(|d| PriceBar {
                date: day(d),
                open: 100.0 + d as f64,
                high: 110.0,
                low: 90.0,
                close: 105.0,
                volume: 50_000.0,
                sentiment: None,
            })
            .collect()
    }

    #[test]
    fn typical_price() {
        let bar = &sample_bars()[0];
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((bar.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let table = PriceTable::new(vec![day(1), day(2)]).with_column("Close", vec![1.0, 2.0]);
        assert_eq!(table.column("CLOSE"), Some(&[1.0, 2.0][..]));
        assert_eq!(table.column("close"), Some(&[1.0, 2.0][..]));
        assert!(table.has_column("cLoSe"));
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["close"]);
    }

    #[test]
    fn missing_close_is_a_strategy_error() {
        let table = PriceTable::new(vec![day(1)]).with_column("open", vec![1.0]);
        assert_eq!(
            table.close(),
            Err(StrategyError::MissingColumn {
                column: "close".into()
            })
        );
    }

    #[test]
    fn sentiment_defaults_to_neutral() {
        let table = PriceTable::from_bars(&sample_bars());
        assert!(!table.has_column("sentiment"));
        assert_eq!(table.sentiment(), vec![0.0, 0.0, 0.0]);

        let mut bars = sample_bars();
        bars[1].sentiment = Some(0.8);
        let table = PriceTable::from_bars(&bars);
        assert_eq!(table.sentiment(), vec![0.0, 0.8, 0.0]);
    }

    #[test]
    fn slice_dates_is_inclusive() {
        let table = PriceTable::from_bars(&sample_bars());
        let sliced = table.slice_dates(Some(day(2)), Some(day(3)));
        assert_eq!(sliced.dates(), &[day(2), day(3)]);
        assert_eq!(sliced.column("open"), Some(&[102.0, 103.0][..]));

        let open_ended = table.slice_dates(None, Some(day(1)));
        assert_eq!(open_ended.len(), 1);
    }

    #[test]
    fn head_truncates_every_column() {
        let table = PriceTable::from_bars(&sample_bars()).head(2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("close").map(<[f64]>::len), Some(2));
    }
}
