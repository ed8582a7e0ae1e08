//! Configuration loading and validation.
//!
//! Builds the engine's typed configs from a [`ConfigPort`]. Absent keys take
//! the defaults defined on each config type; present keys must parse and pass
//! range checks, otherwise the whole load fails.

use crate::domain::backtest::BacktestConfig;
use crate::domain::cooldown::CooldownPolicy;
use crate::domain::error::TradesimError;
use crate::domain::execution::ExecutionMode;
use crate::domain::fees::{FeeComponent, FeePlans, FeeSchedule, Product, ProductFees};
use crate::domain::risk::RiskConfig;
use crate::ports::config_port::ConfigPort;

const FEES_PREFIX: &str = "fees.";

/// Everything the engine reads from one config file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    pub risk: RiskConfig,
    pub cooldown: CooldownPolicy,
    pub backtest: BacktestConfig,
    pub fees: FeePlans,
}

pub fn engine_config_from(config: &dyn ConfigPort) -> Result<EngineConfig, TradesimError> {
    Ok(EngineConfig {
        risk: risk_config_from(config)?,
        cooldown: cooldown_policy_from(config)?,
        backtest: backtest_config_from(config)?,
        fees: fee_plans_from(config)?,
    })
}

pub fn risk_config_from(config: &dyn ConfigPort) -> Result<RiskConfig, TradesimError> {
    let d = RiskConfig::default();
    let s = "risk";
    let risk = RiskConfig {
        position_risk_fraction: read_f64(config, s, "max_risk_pct", d.position_risk_fraction)?,
        portfolio_risk_fraction: read_f64(
            config,
            s,
            "port_max_risk_pct",
            d.portfolio_risk_fraction,
        )?,
        atr_length: read_usize(config, s, "atr_len", d.atr_length)?,
        stop_atr: read_f64(config, s, "sl_atr", d.stop_atr)?,
        target_atr: read_f64(config, s, "tp_atr", d.target_atr)?,
        trail_atr: read_f64(config, s, "trail_atr", d.trail_atr)?,
        correlation_window: read_usize(config, s, "corr_window", d.correlation_window)?,
        correlation_damping: read_f64(config, s, "corr_alpha", d.correlation_damping)?,
        correlation_floor: read_f64(config, s, "corr_min_scale", d.correlation_floor)?,
        slippage_guard_bps: read_f64(config, s, "slip_bps_guard", d.slippage_guard_bps)?,
        lot_size: read_lot_size(config, s, d.lot_size)?,
    };
    risk.validate()?;
    Ok(risk)
}

/// `[cooldown]` durations are given in minutes.
pub fn cooldown_policy_from(config: &dyn ConfigPort) -> Result<CooldownPolicy, TradesimError> {
    let d = CooldownPolicy::default();
    let s = "cooldown";
    let window_min = read_i64(config, s, "window_min", d.window_secs / 60)?;
    let pause_min = read_i64(config, s, "pause_min", d.pause_secs / 60)?;
    let policy = CooldownPolicy {
        threshold: read_usize(config, s, "hits", d.threshold)?,
        window_secs: window_min.saturating_mul(60),
        pause_secs: pause_min.saturating_mul(60),
    };
    policy.validate()?;
    Ok(policy)
}

pub fn backtest_config_from(config: &dyn ConfigPort) -> Result<BacktestConfig, TradesimError> {
    let d = BacktestConfig::default();
    let s = "backtest";

    let product = match read_str(config, s, "product") {
        Some(raw) => raw.parse::<Product>()?,
        None => d.product,
    };
    let execution = match read_str(config, s, "trade_on") {
        Some(raw) => raw
            .parse::<ExecutionMode>()
            .map_err(|reason| TradesimError::invalid(s, "trade_on", reason))?,
        None => d.execution,
    };

    let backtest = BacktestConfig {
        product,
        lot_size: read_lot_size(config, s, d.lot_size)?,
        slippage_bps: read_non_negative(config, s, "slippage_bps", d.slippage_bps)?,
        spread_bps: read_non_negative(config, s, "spread_bps", d.spread_bps)?,
        allow_short: config.get_bool(s, "allow_short", d.allow_short),
        initial_cash: read_f64(config, s, "initial_cash", d.initial_cash)?,
        execution,
    };
    backtest.validate()?;
    Ok(backtest)
}

/// Fee plans from `[fees.<plan>.<product>]` sections. A config without any
/// fee section yields the built-in `INDIA_DISCOUNT` preset.
pub fn fee_plans_from(config: &dyn ConfigPort) -> Result<FeePlans, TradesimError> {
    let mut sections: Vec<String> = config
        .sections()
        .into_iter()
        .filter(|s| s.to_lowercase().starts_with(FEES_PREFIX))
        .collect();
    if sections.is_empty() {
        return Ok(FeePlans::india_discount());
    }
    sections.sort();

    let mut schedules: Vec<(String, FeeSchedule)> = Vec::new();
    for section in &sections {
        let (plan, product) = split_fee_section(section)?;
        let fees = product_fees_from(config, section)?;
        match schedules.iter_mut().find(|(name, _)| *name == plan) {
            Some((_, schedule)) => schedule.insert(product, fees),
            None => schedules.push((plan, FeeSchedule::new().with_product(product, fees))),
        }
    }

    let mut plans = FeePlans::new();
    for (name, schedule) in schedules {
        plans.insert(&name, schedule);
    }
    Ok(plans)
}

fn split_fee_section(section: &str) -> Result<(String, Product), TradesimError> {
    let rest = section.get(FEES_PREFIX.len()..).unwrap_or_default();
    match rest.split_once('.') {
        Some((plan, product)) if !plan.trim().is_empty() => {
            Ok((plan.trim().to_lowercase(), product.parse::<Product>()?))
        }
        _ => Err(TradesimError::invalid(
            section,
            "",
            "fee sections must be named fees.<plan>.<product>",
        )),
    }
}

fn product_fees_from(config: &dyn ConfigPort, s: &str) -> Result<ProductFees, TradesimError> {
    let cap = read_non_negative(config, s, "brokerage_cap", 0.0)?;
    let consumption_tax_on = match read_str(config, s, "gst_on") {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.parse::<FeeComponent>()
                    .map_err(|reason| TradesimError::invalid(s, "gst_on", reason))
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(ProductFees {
        brokerage_rate: read_non_negative(config, s, "brokerage_pct", 0.0)?,
        brokerage_cap: (cap > 0.0).then_some(cap),
        min_brokerage: read_non_negative(config, s, "min_brokerage", 0.0)?,
        transaction_tax_buy_rate: read_non_negative(config, s, "stt_pct_buy", 0.0)?,
        transaction_tax_sell_rate: read_non_negative(config, s, "stt_pct_sell", 0.0)?,
        exchange_fee_rate: read_non_negative(config, s, "exch_txn_pct", 0.0)?,
        regulatory_fee_rate: read_non_negative(config, s, "sebi_pct", 0.0)?,
        stamp_buy_rate: read_non_negative(config, s, "stamp_pct_buy", 0.0)?,
        consumption_tax_rate: read_non_negative(config, s, "gst_pct", 0.0)?,
        consumption_tax_on,
    })
}

// Blank values count as absent.
fn read_str(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, TradesimError> {
    let Some(raw) = read_str(config, section, key) else {
        return Ok(default);
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TradesimError::invalid(
            section,
            key,
            format!("expected a number, got '{raw}'"),
        )),
    }
}

fn read_non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, TradesimError> {
    let value = read_f64(config, section, key, default)?;
    if value < 0.0 {
        return Err(TradesimError::invalid(
            section,
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(value)
}

fn read_i64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, TradesimError> {
    let Some(raw) = read_str(config, section, key) else {
        return Ok(default);
    };
    raw.parse::<i64>().map_err(|_| {
        TradesimError::invalid(section, key, format!("expected an integer, got '{raw}'"))
    })
}

fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TradesimError> {
    let value = read_i64(config, section, key, default as i64)?;
    usize::try_from(value)
        .map_err(|_| TradesimError::invalid(section, key, format!("{key} must be non-negative")))
}

fn read_lot_size(
    config: &dyn ConfigPort,
    section: &str,
    default: u32,
) -> Result<u32, TradesimError> {
    let value = read_i64(config, section, "lot_size", i64::from(default))?;
    match u32::try_from(value) {
        Ok(0) => Err(TradesimError::InvalidLotSize { lot_size: 0 }),
        Ok(lot) => Ok(lot),
        Err(_) => Err(TradesimError::invalid(
            section,
            "lot_size",
            format!("lot_size must be a positive integer, got {value}"),
        )),
    }
}
