//! Performance metrics for a backtest run.

use super::money::{round_half_up, round_money};
use super::portfolio::EquityPoint;

/// Gross winning P&L over gross losing P&L.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProfitFactor {
    Finite(f64),
    /// Some winning P&L and no losing P&L.
    Infinite,
}

impl ProfitFactor {
    pub fn from_gross(gross_win: f64, gross_loss: f64) -> Self {
        if gross_loss > 0.0 {
            ProfitFactor::Finite(gross_win / gross_loss)
        } else if gross_win > 0.0 {
            ProfitFactor::Infinite
        } else {
            ProfitFactor::Finite(0.0)
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, ProfitFactor::Infinite)
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            ProfitFactor::Finite(v) => *v,
            ProfitFactor::Infinite => f64::INFINITY,
        }
    }
}

/// Win/loss tally over completed round trips. Zero P&L counts as a win.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundTripTally {
    pub wins: usize,
    pub losses: usize,
    pub gross_win: f64,
    pub gross_loss: f64,
}

impl RoundTripTally {
    pub fn record(&mut self, pnl: f64) {
        if pnl >= 0.0 {
            self.wins += 1;
            self.gross_win += pnl;
        } else {
            self.losses += 1;
            self.gross_loss += -pnl;
        }
    }

    pub fn round_trips(&self) -> usize {
        self.wins + self.losses
    }

    /// Percentage of winning round trips, 0 when there were none.
    pub fn win_rate_pct(&self) -> f64 {
        let n = self.round_trips();
        if n == 0 {
            0.0
        } else {
            self.wins as f64 / n as f64 * 100.0
        }
    }

    pub fn profit_factor(&self) -> ProfitFactor {
        ProfitFactor::from_gross(self.gross_win, self.gross_loss)
    }
}

/// Aggregate statistics, rounded for reporting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BacktestStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub return_pct: f64,
    pub max_drawdown_pct: f64,
    pub win_rate_pct: f64,
    pub profit_factor: ProfitFactor,
    pub final_equity: f64,
    pub pnl_total: f64,
    pub total_costs: f64,
    pub gross_win: f64,
    pub gross_loss: f64,
}

impl BacktestStats {
    /// Stats for a run that never produced an equity point.
    pub fn empty() -> Self {
        BacktestStats {
            trades: 0,
            wins: 0,
            losses: 0,
            return_pct: 0.0,
            max_drawdown_pct: 0.0,
            win_rate_pct: 0.0,
            profit_factor: ProfitFactor::Finite(0.0),
            final_equity: 0.0,
            pnl_total: 0.0,
            total_costs: 0.0,
            gross_win: 0.0,
            gross_loss: 0.0,
        }
    }

    pub fn compute(
        equity_curve: &[EquityPoint],
        initial_cash: f64,
        trades: usize,
        total_costs: f64,
        tally: &RoundTripTally,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_cash);

        let return_pct = if initial_cash > 0.0 {
            (final_equity - initial_cash) / initial_cash * 100.0
        } else {
            0.0
        };

        let profit_factor = match tally.profit_factor() {
            ProfitFactor::Finite(v) => ProfitFactor::Finite(round_half_up(v, 3)),
            ProfitFactor::Infinite => ProfitFactor::Infinite,
        };

        BacktestStats {
            trades,
            wins: tally.wins,
            losses: tally.losses,
            return_pct: round_money(return_pct),
            max_drawdown_pct: round_money(max_drawdown_pct(equity_curve)),
            win_rate_pct: round_money(tally.win_rate_pct()),
            profit_factor,
            final_equity: round_money(final_equity),
            pnl_total: round_money(final_equity - initial_cash),
            total_costs: round_money(total_costs),
            gross_win: round_money(tally.gross_win),
            gross_loss: round_money(tally.gross_loss),
        }
    }
}

/// Largest peak-to-trough decline, as a percentage of the running peak.
///
/// The peak is tracked from the first point. Non-positive peaks contribute 0.
pub fn max_drawdown_pct(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            max_dd = max_dd.max(dd);
        }
    }
    (max_dd * 100.0).clamp(0.0, 100.0)
}
