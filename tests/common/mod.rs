#![allow(dead_code)]

use std::collections::HashMap;
use tradesim::domain::backtest::BacktestConfig;
use tradesim::domain::error::TradesimError;
pub use tradesim::domain::ohlcv::Bar;
use tradesim::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<Bar>, TradesimError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TradesimError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start_ts && b.timestamp <= end_ts)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, TradesimError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// A bar with open == close and a range of 2 around it.
pub fn make_bar(ts: i64, close: f64) -> Bar {
    Bar::new(ts, close, close + 1.0, close - 1.0, close, 1_000.0)
}

/// `count` one-minute bars starting at `start_ts`, rising by `step` per bar.
pub fn generate_bars(start_ts: i64, count: usize, start_price: f64, step: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let price = start_price + i as f64 * step;
            Bar::new(
                start_ts + i as i64 * 60,
                price,
                price + 1.0,
                price - 1.0,
                price,
                1_000.0,
            )
        })
        .collect()
}

pub fn frictionless_config() -> BacktestConfig {
    BacktestConfig {
        slippage_bps: 0.0,
        spread_bps: 0.0,
        initial_cash: 100_000.0,
        ..BacktestConfig::default()
    }
}
