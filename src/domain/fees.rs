//! Transaction cost model.
//!
//! A fee schedule is a declarative table keyed by [`Product`]. Rates are
//! fractions of notional (0.0003 = 3 bps). Each component is rounded to 2
//! decimal places on its own, and the total is the rounded sum of the rounded
//! components, so the itemized breakdown always adds up to the total.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::TradesimError;
use super::money::round_money;
use super::side::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Product {
    EquityDelivery,
    EquityIntraday,
    Futures,
    Options,
}

impl Product {
    pub const ALL: [Product; 4] = [
        Product::EquityDelivery,
        Product::EquityIntraday,
        Product::Futures,
        Product::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::EquityDelivery => "equity_delivery",
            Product::EquityIntraday => "equity_intraday",
            Product::Futures => "futures",
            Product::Options => "options",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = TradesimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Product::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| TradesimError::UnknownProduct {
                product: s.to_string(),
            })
    }
}

/// Components that a consumption tax (GST) can be levied on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeeComponent {
    Brokerage,
    TransactionTax,
    ExchangeFee,
    RegulatoryFee,
    Stamp,
}

impl FromStr for FeeComponent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "brokerage" => Ok(FeeComponent::Brokerage),
            "stt" | "transaction_tax" => Ok(FeeComponent::TransactionTax),
            "exch_txn" | "exchange_fee" => Ok(FeeComponent::ExchangeFee),
            "sebi" | "regulatory_fee" => Ok(FeeComponent::RegulatoryFee),
            "stamp" => Ok(FeeComponent::Stamp),
            other => Err(format!("unknown fee component: {other}")),
        }
    }
}

/// Rates for one product. All rates are fractions of notional.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProductFees {
    pub brokerage_rate: f64,
    /// Per-leg brokerage ceiling; `None` means uncapped.
    pub brokerage_cap: Option<f64>,
    /// Per-leg brokerage floor; 0 disables it.
    pub min_brokerage: f64,
    pub transaction_tax_buy_rate: f64,
    pub transaction_tax_sell_rate: f64,
    pub exchange_fee_rate: f64,
    pub regulatory_fee_rate: f64,
    /// Stamp duty, charged on the buy leg only.
    pub stamp_buy_rate: f64,
    pub consumption_tax_rate: f64,
    pub consumption_tax_on: Vec<FeeComponent>,
}

impl ProductFees {
    fn transaction_tax_rate(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.transaction_tax_buy_rate,
            Side::Sell => self.transaction_tax_sell_rate,
        }
    }

    fn brokerage(&self, notional: f64) -> f64 {
        let mut brokerage = notional * self.brokerage_rate;
        if let Some(cap) = self.brokerage_cap.filter(|c| *c > 0.0) {
            brokerage = brokerage.min(cap);
        }
        if self.min_brokerage > 0.0 {
            brokerage = brokerage.max(self.min_brokerage);
        }
        brokerage
    }
}

/// A resolved fee table for one market and plan.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeeSchedule {
    products: BTreeMap<Product, ProductFees>,
}

impl FeeSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// A schedule where every product trades for free.
    pub fn zero() -> Self {
        Product::ALL
            .into_iter()
            .fold(Self::new(), |s, p| s.with_product(p, ProductFees::default()))
    }

    pub fn with_product(mut self, product: Product, fees: ProductFees) -> Self {
        self.products.insert(product, fees);
        self
    }

    pub fn insert(&mut self, product: Product, fees: ProductFees) {
        self.products.insert(product, fees);
    }

    pub fn get(&self, product: Product) -> Result<&ProductFees, TradesimError> {
        self.products
            .get(&product)
            .ok_or_else(|| TradesimError::UnknownProduct {
                product: product.to_string(),
            })
    }

    pub fn products(&self) -> impl Iterator<Item = Product> + '_ {
        self.products.keys().copied()
    }
}

/// Named fee schedules, e.g. one per broker plan.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeePlans {
    plans: BTreeMap<String, FeeSchedule>,
}

impl FeePlans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan names are matched case-insensitively.
    pub fn insert(&mut self, name: &str, schedule: FeeSchedule) {
        self.plans.insert(name.to_lowercase(), schedule);
    }

    pub fn plan(&self, name: &str) -> Result<&FeeSchedule, TradesimError> {
        self.plans
            .get(&name.to_lowercase())
            .ok_or_else(|| TradesimError::UnknownPlan {
                plan: name.to_string(),
            })
    }

    /// NSE discount-broker table (plan `INDIA_DISCOUNT`).
    pub fn india_discount() -> Self {
        let gst_on = vec![FeeComponent::Brokerage, FeeComponent::ExchangeFee];
        let schedule = FeeSchedule::new()
            .with_product(
                Product::EquityDelivery,
                ProductFees {
                    transaction_tax_buy_rate: 0.001,
                    transaction_tax_sell_rate: 0.001,
                    exchange_fee_rate: 0.000_029_7,
                    regulatory_fee_rate: 0.000_001,
                    stamp_buy_rate: 0.000_15,
                    consumption_tax_rate: 0.18,
                    consumption_tax_on: gst_on.clone(),
                    ..ProductFees::default()
                },
            )
            .with_product(
                Product::EquityIntraday,
                ProductFees {
                    brokerage_rate: 0.000_3,
                    brokerage_cap: Some(20.0),
                    transaction_tax_sell_rate: 0.000_25,
                    exchange_fee_rate: 0.000_029_7,
                    regulatory_fee_rate: 0.000_001,
                    stamp_buy_rate: 0.000_03,
                    consumption_tax_rate: 0.18,
                    consumption_tax_on: gst_on.clone(),
                    ..ProductFees::default()
                },
            )
            .with_product(
                Product::Futures,
                ProductFees {
                    brokerage_rate: 0.000_3,
                    brokerage_cap: Some(20.0),
                    transaction_tax_sell_rate: 0.000_2,
                    exchange_fee_rate: 0.000_017_3,
                    regulatory_fee_rate: 0.000_001,
                    stamp_buy_rate: 0.000_02,
                    consumption_tax_rate: 0.18,
                    consumption_tax_on: gst_on.clone(),
                    ..ProductFees::default()
                },
            )
            .with_product(
                Product::Options,
                ProductFees {
                    min_brokerage: 20.0,
                    transaction_tax_sell_rate: 0.001,
                    exchange_fee_rate: 0.000_350_3,
                    regulatory_fee_rate: 0.000_001,
                    stamp_buy_rate: 0.000_03,
                    consumption_tax_rate: 0.18,
                    consumption_tax_on: gst_on,
                    ..ProductFees::default()
                },
            );
        let mut plans = FeePlans::new();
        plans.insert("INDIA_DISCOUNT", schedule);
        plans
    }
}

/// Itemized per-leg costs, each already rounded to 2 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostBreakdown {
    pub brokerage: f64,
    pub transaction_tax: f64,
    pub exchange_fee: f64,
    pub regulatory_fee: f64,
    pub stamp: f64,
    pub consumption_tax: f64,
}

impl CostBreakdown {
    pub fn sum(&self) -> f64 {
        self.brokerage
            + self.transaction_tax
            + self.exchange_fee
            + self.regulatory_fee
            + self.stamp
            + self.consumption_tax
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LegCost {
    pub total: f64,
    pub breakdown: CostBreakdown,
}

/// Estimate the costs of one leg (a single buy or sell) of `notional` value.
///
/// A non-positive or non-finite notional trades nothing and costs nothing.
/// Fails only when `product` is missing from `schedule`.
pub fn estimate_leg_cost(
    notional: f64,
    side: Side,
    product: Product,
    schedule: &FeeSchedule,
) -> Result<LegCost, TradesimError> {
    let fees = schedule.get(product)?;
    if !(notional.is_finite() && notional > 0.0) {
        return Ok(LegCost::default());
    }

    let brokerage = fees.brokerage(notional);
    let transaction_tax = notional * fees.transaction_tax_rate(side);
    let exchange_fee = notional * fees.exchange_fee_rate;
    let regulatory_fee = notional * fees.regulatory_fee_rate;
    let stamp = match side {
        Side::Buy => notional * fees.stamp_buy_rate,
        Side::Sell => 0.0,
    };

    let taxable: f64 = fees
        .consumption_tax_on
        .iter()
        .map(|component| match component {
            FeeComponent::Brokerage => brokerage,
            FeeComponent::TransactionTax => transaction_tax,
            FeeComponent::ExchangeFee => exchange_fee,
            FeeComponent::RegulatoryFee => regulatory_fee,
            FeeComponent::Stamp => stamp,
        })
        .sum();
    let consumption_tax = taxable * fees.consumption_tax_rate;

    let breakdown = CostBreakdown {
        brokerage: round_money(brokerage),
        transaction_tax: round_money(transaction_tax),
        exchange_fee: round_money(exchange_fee),
        regulatory_fee: round_money(regulatory_fee),
        stamp: round_money(stamp),
        consumption_tax: round_money(consumption_tax),
    };

    Ok(LegCost {
        total: round_money(breakdown.sum()),
        breakdown,
    })
}
