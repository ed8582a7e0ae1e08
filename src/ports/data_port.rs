//! Market data access port trait.

use crate::domain::error::TradesimError;
use crate::domain::ohlcv::Bar;

pub trait DataPort {
    /// Bars for `symbol` with `start_ts <= timestamp <= end_ts`, in source
    /// order. Callers clean the result before backtesting.
    fn fetch_bars(
        &self,
        symbol: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<Bar>, TradesimError>;

    fn list_symbols(&self) -> Result<Vec<String>, TradesimError>;
}
