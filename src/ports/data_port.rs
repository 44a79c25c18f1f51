//! Price data access port.

use std::path::Path;

use chrono::NaiveDate;

use crate::domain::error::NextbarError;
use crate::domain::ohlcv::PriceTable;

pub trait DataPort {
    /// Price rows from `source` with dates in `[start, end]`, either bound
    /// optional.
    fn fetch_table(
        &self,
        source: &Path,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceTable, NextbarError>;
}
