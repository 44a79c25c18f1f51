#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use nextbar::domain::error::LoadError;
use nextbar::domain::ohlcv::{PriceBar, PriceTable};
use nextbar::ports::strategy_source_port::StrategySourcePort;
use std::collections::HashMap;
use std::io::Write;

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn day(i: usize) -> NaiveDate {
    start_date() + Days::new(i as u64)
}

pub fn dates(n: usize) -> Vec<NaiveDate> {
    (0..n).map(day).collect()
}

pub fn make_bar(i: usize, open: f64, close: f64) -> PriceBar {
    PriceBar {
        date: day(i),
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        volume: 1000.0,
        sentiment: None,
    }
}

/// Bars whose open equals the previous close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let open = if i == 0 { c } else { closes[i - 1] };
            make_bar(i, open, c)
        })
        .collect()
}

pub fn table_from_closes(closes: &[f64]) -> PriceTable {
    PriceTable::from_bars(&bars_from_closes(closes))
}

pub fn flat_table(n: usize, price: f64) -> PriceTable {
    table_from_closes(&vec![price; n])
}

/// A slow sine wave around 100, enough to make every built-in trade.
pub fn wave(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 10.0 * (i as f64 / 6.0).sin() + 0.05 * i as f64)
        .collect()
}

pub fn csv_text(bars: &[PriceBar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date.format("%Y-%m-%d"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    out
}

pub fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Strategy modules held in memory, keyed by module name.
#[derive(Default)]
pub struct MockSources {
    pub modules: HashMap<String, String>,
}

impl MockSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: &str, text: &str) -> Self {
        self.modules.insert(module.to_string(), text.to_string());
        self
    }
}

impl StrategySourcePort for MockSources {
    fn read_module(&self, module: &str) -> Result<Option<String>, LoadError> {
        Ok(self.modules.get(module).cloned())
    }
}

pub const MA_SCRIPT: &str = r#"use nextbar::Strategy;

strategy ScriptedAverage extends Strategy {
    fields { window = 20 }
    let ma = safe_rolling(close, window, "mean");
    entries = close > ma;
    exits = close < ma;
}
"#;
