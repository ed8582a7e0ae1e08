//! CSV file data adapter.
//!
//! One file per symbol, `<base>/<SYMBOL>.csv`, with a header row and columns
//! `ts,open,high,low,close[,volume]`. `ts` is either epoch seconds or a date
//! (`YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`, read as UTC).

use crate::domain::error::TradesimError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info_span, warn};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn data_error(reason: impl Into<String>) -> TradesimError {
    TradesimError::Data {
        reason: reason.into(),
    }
}

/// Epoch seconds from an integer or a UTC date/datetime string.
pub fn parse_timestamp(raw: &str) -> Result<i64, TradesimError> {
    let raw = raw.trim();
    if let Ok(ts) = raw.parse::<i64>() {
        return Ok(ts);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| data_error(format!("invalid timestamp: {raw}")))
}

fn parse_price(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
    line: u64,
) -> Result<f64, TradesimError> {
    let raw = record
        .get(idx)
        .ok_or_else(|| data_error(format!("line {line}: missing {name} column")))?;
    raw.trim()
        .parse()
        .map_err(|e| data_error(format!("line {line}: invalid {name} value '{raw}': {e}")))
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<Bar>, TradesimError> {
        let path = self.csv_path(symbol);
        let _span = info_span!("fetch_bars", symbol, path = %path.display()).entered();

        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        let mut skipped = 0usize;

        for (i, result) in rdr.records().enumerate() {
            let line = i as u64 + 2;
            let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;

            let ts_raw = record
                .get(0)
                .ok_or_else(|| data_error(format!("line {line}: missing ts column")))?;
            let timestamp = parse_timestamp(ts_raw)?;
            if timestamp < start_ts || timestamp > end_ts {
                continue;
            }

            let bar = Bar {
                timestamp,
                open: parse_price(&record, 1, "open", line)?,
                high: parse_price(&record, 2, "high", line)?,
                low: parse_price(&record, 3, "low", line)?,
                close: parse_price(&record, 4, "close", line)?,
                volume: match record.get(5).map(str::trim) {
                    Some(v) if !v.is_empty() => parse_price(&record, 5, "volume", line)?,
                    _ => 0.0,
                },
            };
            if !bar.is_consistent() {
                skipped += 1;
                warn!(line, timestamp, "skipping bar with inconsistent OHLC");
                continue;
            }
            bars.push(bar);
        }

        debug!(rows = bars.len(), skipped, "bars loaded");
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TradesimError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {}", e)))?;
            let path = entry.path();
            let is_csv = path.extension().is_some_and(|ext| ext == "csv");
            if let Some(stem) = path.file_stem().filter(|_| is_csv) {
                symbols.push(stem.to_string_lossy().into_owned());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
