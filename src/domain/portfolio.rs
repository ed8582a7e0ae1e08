//! Simulated ledger for a single backtest run: cash, unit position, trades
//! and the mark-to-market equity curve.

use super::metrics::RoundTripTally;
use super::side::Side;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: f64,
}

/// One executed leg.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trade {
    pub timestamp: i64,
    pub side: Side,
    pub price: f64,
    pub quantity: u64,
    pub cost: f64,
}

/// A fill the engine wants booked: move the position to `target_lots`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fill {
    pub timestamp: i64,
    pub target_lots: i64,
    pub price: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub cash: f64,
    pub initial_cash: f64,
    /// Signed position in lots: -1, 0 or +1.
    pub lots: i64,
    pub lot_size: u64,
    /// Fill price of the currently open round trip.
    pub entry_price: Option<f64>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub total_costs: f64,
    pub tally: RoundTripTally,
}

impl Ledger {
    pub fn new(initial_cash: f64, lot_size: u64) -> Self {
        Ledger {
            cash: initial_cash,
            initial_cash,
            lots: 0,
            lot_size,
            entry_price: None,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            total_costs: 0.0,
            tally: RoundTripTally::default(),
        }
    }

    /// Signed share quantity.
    pub fn position_quantity(&self) -> i64 {
        self.lots * self.lot_size as i64
    }

    pub fn is_flat(&self) -> bool {
        self.lots == 0
    }

    pub fn mark_to_market(&self, price: f64) -> f64 {
        self.cash + self.position_quantity() as f64 * price
    }

    pub fn record_equity(&mut self, timestamp: i64, close: f64) {
        let equity = self.mark_to_market(close);
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    /// Side and share quantity needed to move from the current position to
    /// `target_lots`, or `None` if already there.
    pub fn order_for(&self, target_lots: i64) -> Option<(Side, u64)> {
        let delta = target_lots - self.lots;
        if delta == 0 {
            return None;
        }
        let side = if delta > 0 { Side::Buy } else { Side::Sell };
        Some((side, delta.unsigned_abs() * self.lot_size))
    }

    /// Book a fill. Closing (or reversing) an open position realizes the
    /// round trip at the fill price; opening from flat, or reversing, sets a
    /// new entry price.
    pub fn apply(&mut self, fill: Fill) {
        let Some((side, quantity)) = self.order_for(fill.target_lots) else {
            return;
        };
        let notional = fill.price * quantity as f64;
        match side {
            Side::Buy => self.cash -= notional + fill.cost,
            Side::Sell => self.cash += notional - fill.cost,
        }
        self.total_costs += fill.cost;

        let prev = self.lots;
        let closes = prev != 0 && fill.target_lots.signum() != prev.signum();
        if let Some(entry) = self.entry_price.take_if(|_| closes) {
            let pnl = (fill.price - entry) * (prev * self.lot_size as i64) as f64;
            self.tally.record(pnl);
        }
        if fill.target_lots != 0 && (prev == 0 || closes) {
            self.entry_price = Some(fill.price);
        }

        self.lots = fill.target_lots;
        self.trades.push(Trade {
            timestamp: fill.timestamp,
            side,
            price: fill.price,
            quantity,
            cost: fill.cost,
        });
    }
}
