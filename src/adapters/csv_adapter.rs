//! CSV price file adapter.
//!
//! Expects a header row naming `date,open,high,low,close` with optional
//! `volume` and `sentiment` columns, in any order and any letter case.
//! Dates are `YYYY-MM-DD`.

use crate::domain::error::NextbarError;
use crate::domain::ohlcv::{PriceBar, PriceTable};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use log::info;
use std::fs;
use std::path::Path;

const REQUIRED: [&str; 5] = ["date", "open", "high", "low", "close"];

#[derive(Debug, Default)]
pub struct CsvAdapter;

impl CsvAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Parses CSV text into bars sorted by date.
    pub fn parse_bars(
        content: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, NextbarError> {
        let data_err = |reason: String| NextbarError::Data { reason };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| data_err(format!("CSV header error: {}", e)))?
            .iter()
            .map(|h| h.to_lowercase())
            .collect();
        let index_of = |name: &str| headers.iter().position(|h| h == name);

        let mut required = [0usize; 5];
        for (slot, name) in required.iter_mut().zip(REQUIRED) {
            *slot = index_of(name).ok_or_else(|| data_err(format!("missing {} column", name)))?;
        }
        let [date_idx, open_idx, high_idx, low_idx, close_idx] = required;
        let volume_idx = index_of("volume");
        let sentiment_idx = index_of("sentiment");

        let mut bars = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {}", e)))?;
            let line = row + 2;

            let field = |idx: usize, name: &str| -> Result<&str, NextbarError> {
                record
                    .get(idx)
                    .ok_or_else(|| data_err(format!("line {}: missing {} value", line, name)))
            };
            let number = |idx: usize, name: &str| -> Result<f64, NextbarError> {
                field(idx, name)?
                    .parse()
                    .map_err(|e| data_err(format!("line {}: invalid {} value: {}", line, name, e)))
            };

            let date = NaiveDate::parse_from_str(field(date_idx, "date")?, "%Y-%m-%d")
                .map_err(|e| data_err(format!("line {}: invalid date format: {}", line, e)))?;
            if start.is_some_and(|s| date < s) || end.is_some_and(|e| date > e) {
                continue;
            }

            let volume = match volume_idx {
                Some(idx) => number(idx, "volume")?,
                None => 0.0,
            };
            let sentiment = match sentiment_idx.and_then(|idx| record.get(idx)) {
                None | Some("") => None,
                Some(raw) => Some(raw.parse().map_err(|e| {
                    data_err(format!("line {}: invalid sentiment value: {}", line, e))
                })?),
            };

            bars.push(PriceBar {
                date,
                open: number(open_idx, "open")?,
                high: number(high_idx, "high")?,
                low: number(low_idx, "low")?,
                close: number(close_idx, "close")?,
                volume,
                sentiment,
            });
        }

        bars.sort_by_key(|b| b.date);
        if let Some(pair) = bars.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(data_err(format!("duplicate date {}", pair[0].date)));
        }
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_table(
        &self,
        source: &Path,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceTable, NextbarError> {
        let content = fs::read_to_string(source).map_err(|e| NextbarError::Data {
            reason: format!("failed to read {}: {}", source.display(), e),
        })?;
        let bars = Self::parse_bars(&content, start, end)?;
        info!("loaded {} bars from {}", bars.len(), source.display());
        Ok(PriceTable::from_bars(&bars))
    }
}
