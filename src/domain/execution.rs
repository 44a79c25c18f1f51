//! Fill simulation: slippage, commissions, opening and closing trades.
//!
//! Cash is signed-notional accounting: buying `q` at `p` moves cash by
//! `-q * p`, selling short moves it by `+|q| * p`, and equity is always
//! `cash + quantity * price`.

use chrono::NaiveDate;
use log::{debug, warn};
use serde::Serialize;

use super::position::Trade;

/// Price impact of a fill. Buys fill higher, sells fill lower.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "model", content = "value", rename_all = "snake_case")]
pub enum SlippageModel {
    /// Fraction of the price, e.g. 0.0005 for 5 bps.
    Proportional(f64),
    /// Fixed amount per unit.
    PerUnit(f64),
}

impl SlippageModel {
    pub fn amount(&self) -> f64 {
        match *self {
            SlippageModel::Proportional(v) | SlippageModel::PerUnit(v) => v,
        }
    }
}

impl Default for SlippageModel {
    fn default() -> Self {
        SlippageModel::Proportional(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// Costs applied to every fill.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostModel {
    pub commission_rate: f64,
    pub min_commission: f64,
    pub slippage: SlippageModel,
}

impl CostModel {
    pub fn free() -> Self {
        Self::default()
    }

    /// Commission on a fill: `max(notional * rate, min_commission)`.
    pub fn commission(&self, notional: f64) -> f64 {
        (notional.abs() * self.commission_rate).max(self.min_commission)
    }

    pub fn fill_price(&self, market_price: f64, side: Side) -> f64 {
        let filled = match (self.slippage, side) {
            (SlippageModel::Proportional(rate), Side::Buy) => market_price * (1.0 + rate),
            (SlippageModel::Proportional(rate), Side::Sell) => market_price * (1.0 - rate),
            (SlippageModel::PerUnit(amount), Side::Buy) => market_price + amount,
            (SlippageModel::PerUnit(amount), Side::Sell) => market_price - amount,
        };
        filled.max(0.0)
    }

    /// Largest notional whose commission still fits in `cash`.
    fn affordable_notional(&self, cash: f64) -> f64 {
        if cash <= 0.0 {
            return 0.0;
        }
        let proportional = cash / (1.0 + self.commission_rate);
        if proportional * self.commission_rate >= self.min_commission {
            proportional
        } else {
            (cash - self.min_commission).max(0.0)
        }
    }
}

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        quantity: f64,
        execution_price: f64,
        commission: f64,
    },
    InsufficientCapital,
}

/// Result of an exit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitResult {
    pub quantity: f64,
    pub exit_price: f64,
    pub exit_commission: f64,
    pub pnl: f64,
}

/// Single-instrument account the engine steps forward.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub cash: f64,
    pub open: Option<Trade>,
    pub trades: Vec<Trade>,
}

impl Account {
    pub fn new(cash: f64) -> Self {
        Self {
            cash,
            open: None,
            trades: Vec::new(),
        }
    }

    pub fn quantity(&self) -> f64 {
        self.open.as_ref().map_or(0.0, |t| t.quantity)
    }

    pub fn position_value(&self, price: f64) -> f64 {
        self.open.as_ref().map_or(0.0, |t| t.market_value(price))
    }

    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position_value(price)
    }

    /// Opens a trade worth `size` of `equity` at `market_price`, long for
    /// `direction > 0` and short otherwise.
    ///
    /// Unleveraged longs are capped by the cash on hand, net of commission.
    pub fn enter(
        &mut self,
        date: NaiveDate,
        market_price: f64,
        direction: i8,
        size: f64,
        equity: f64,
        allow_leverage: bool,
        costs: &CostModel,
    ) -> EntryResult {
        let side = if direction > 0 { Side::Buy } else { Side::Sell };
        let execution_price = costs.fill_price(market_price, side);
        if execution_price <= 0.0 || equity <= 0.0 {
            return EntryResult::InsufficientCapital;
        }

        let mut notional = size * equity;
        if side == Side::Buy && !allow_leverage {
            notional = notional.min(costs.affordable_notional(self.cash));
        }
        let quantity = notional / execution_price;
        if quantity <= 0.0 || !quantity.is_finite() {
            return EntryResult::InsufficientCapital;
        }

        let signed = if side == Side::Buy { quantity } else { -quantity };
        let commission = costs.commission(notional);
        self.cash -= signed * execution_price + commission;
        self.open = Some(Trade::open(date, execution_price, signed, commission));
        debug!("{date}: entered {signed:.4} @ {execution_price:.4} (commission {commission:.4})");

        EntryResult::Entered {
            quantity: signed,
            execution_price,
            commission,
        }
    }

    /// Closes the open trade at `market_price`, if there is one.
    ///
    /// Realized pnl is `quantity * (exit - entry)` net of both commissions.
    pub fn exit(&mut self, date: NaiveDate, market_price: f64, costs: &CostModel) -> Option<ExitResult> {
        let mut trade = self.open.take()?;
        let side = if trade.is_long() { Side::Sell } else { Side::Buy };
        let exit_price = costs.fill_price(market_price, side);
        let exit_commission = costs.commission(trade.quantity * exit_price);

        let pnl = trade.quantity * (exit_price - trade.entry_price)
            - trade.entry_commission
            - exit_commission;
        self.cash += trade.quantity * exit_price - exit_commission;
        if self.cash < 0.0 && trade.is_long() {
            warn!("{date}: cash went negative ({:.2}) closing a long", self.cash);
        }
        debug!(
            "{date}: exited {:.4} @ {exit_price:.4}, pnl {pnl:.4}",
            trade.quantity
        );

        trade.exit_date = Some(date);
        trade.exit_price = Some(exit_price);
        trade.realized_pnl = Some(pnl);
        let quantity = trade.quantity;
        self.trades.push(trade);

        Some(ExitResult {
            quantity,
            exit_price,
            exit_commission,
            pnl,
        })
    }
}
