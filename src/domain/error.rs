//! Domain error types.
//!
//! Two tiers: [`TradesimError`] for configuration-integrity faults that a
//! caller must fix, and [`QuoteRejection`] for market-data outcomes that are
//! reported as values.

use std::fmt;

/// Top-level error type for tradesim.
#[derive(Debug, thiserror::Error)]
pub enum TradesimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("fee plan not found: {plan}")]
    UnknownPlan { plan: String },

    #[error("product not found in fee schedule: {product}")]
    UnknownProduct { product: String },

    #[error("lot size must be positive, got {lot_size}")]
    InvalidLotSize { lot_size: u32 },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradesimError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TradesimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why the sizer declined to produce a quote for otherwise valid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuoteRejection {
    /// ATR is non-positive: too few bars, or a flat series.
    AtrZeroOrShortSeries,
    /// The stop sits on (or beyond) the entry price.
    InvalidStopLevels,
}

impl QuoteRejection {
    /// Stable reason code for audit trails.
    pub fn code(&self) -> &'static str {
        match self {
            QuoteRejection::AtrZeroOrShortSeries => "atr_zero_or_short_series",
            QuoteRejection::InvalidStopLevels => "invalid_stop_levels",
        }
    }
}

impl fmt::Display for QuoteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
