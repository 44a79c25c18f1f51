//! Trades and engine position state.

use chrono::NaiveDate;
use serde::Serialize;

/// One round trip. Quantity is signed: positive long, negative short.
/// Exit fields stay `None` while the trade is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_commission: f64,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<f64>,
    pub realized_pnl: Option<f64>,
}

impl Trade {
    pub fn open(entry_date: NaiveDate, entry_price: f64, quantity: f64, entry_commission: f64) -> Self {
        Self {
            entry_date,
            entry_price,
            quantity,
            entry_commission,
            exit_date: None,
            exit_price: None,
            realized_pnl: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_date.is_none()
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    /// Signed value of the position at `price`.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.entry_price)
    }

    /// Calendar days held, for closed trades.
    pub fn duration_days(&self) -> Option<i64> {
        self.exit_date.map(|exit| (exit - self.entry_date).num_days())
    }
}

/// Engine-owned account state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionState {
    pub cash: f64,
    pub quantity: f64,
    pub entry_price: Option<f64>,
    pub equity: f64,
}

impl PositionState {
    pub fn flat(cash: f64) -> Self {
        Self {
            cash,
            quantity: 0.0,
            entry_price: None,
            equity: cash,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub position_value: f64,
}

impl EquityPoint {
    /// A point after the account has been wiped out.
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            equity: 0.0,
            cash: 0.0,
            position_value: 0.0,
        }
    }
}
