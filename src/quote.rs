//! Swap Quote Calculator
//!
//! Constant product math with the router's fixed 0.3% fee, mirrored from
//! UniswapV2Library so a locally computed preview matches what the router
//! will settle:
//!
//!   amountOut = amountIn * 997 * reserveOut / (reserveIn * 1000 + amountIn * 997)
//!   amountIn  = reserveIn * amountOut * 1000 / ((reserveOut - amountOut) * 997) + 1
//!
//! Everything in this module is pure. Amounts are smallest-unit `U256`;
//! only prices and the impact percentage are floating point.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use thiserror::Error;

use crate::slippage::SlippageTolerance;
use crate::tokens::{format_amount, to_decimal_f64, Token};

// ============================================
// CONSTANTS
// ============================================

/// Input share kept after the 0.3% fee, per mille
const FEE_RETAINED: u64 = 997;

/// Fee denominator
const FEE_BASE: u64 = 1000;

/// Fee charged on the input, per mille
const FEE_CHARGED: u64 = 3;

/// Price impact is rounded to this many decimal places (half away from zero)
const IMPACT_DECIMALS: i32 = 6;

/// Impact above this percentage triggers the high impact warning
pub const HIGH_IMPACT_WARNING_PCT: f64 = 5.0;

// ============================================
// TYPES
// ============================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("insufficient liquidity in pool")]
    InsufficientLiquidity,

    #[error("trade is too small to produce any output")]
    InsufficientOutputAmount,

    #[error("arithmetic overflow")]
    Overflow,
}

/// Which side of the trade the user fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeDirection {
    /// `from_amount` was entered; the output is derived
    ExactIn,
    /// `to_amount` was entered; the required input is derived
    ExactOut,
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::ExactIn => write!(f, "EXACT_IN"),
            TradeDirection::ExactOut => write!(f, "EXACT_OUT"),
        }
    }
}

/// Pair reserves oriented along the trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservePair {
    pub reserve_from: U256,
    pub reserve_to: U256,
}

impl ReservePair {
    pub fn new(reserve_from: U256, reserve_to: U256) -> Self {
        Self { reserve_from, reserve_to }
    }

    /// Orient raw pair reserves: `token0` decides which reserve belongs
    /// to the token being sold.
    pub fn from_pair(reserve0: U256, reserve1: U256, token0: Address, from_address: Address) -> Self {
        if from_address == token0 {
            Self::new(reserve0, reserve1)
        } else {
            Self::new(reserve1, reserve0)
        }
    }

    pub fn has_liquidity(&self) -> bool {
        !self.reserve_from.is_zero() && !self.reserve_to.is_zero()
    }
}

/// Impact severity bands used when presenting a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
    Severe,
}

impl ImpactLevel {
    pub fn from_pct(impact: f64) -> Self {
        if impact < 1.0 {
            ImpactLevel::Low
        } else if impact < 3.0 {
            ImpactLevel::Medium
        } else if impact < 5.0 {
            ImpactLevel::High
        } else {
            ImpactLevel::Severe
        }
    }
}

/// Immutable preview of a trade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub direction: TradeDirection,
    pub amount_in: U256,
    pub amount_out: U256,
    pub amount_in_formatted: String,
    pub amount_out_formatted: String,
    /// |execution - spot| / spot * 100
    pub price_impact: f64,
    /// 0.3% of the input, smallest units of the input token
    pub fee: U256,
    pub fee_formatted: String,
    pub route: Vec<String>,
    /// Input per unit of output, decimal units
    pub execution_price: f64,
    /// reserve_from / reserve_to, decimal units
    pub spot_price: f64,
    pub minimum_received: U256,
    pub minimum_received_formatted: String,
    pub to_decimals: u8,
}

impl Quote {
    /// Re-derive the minimum output for another slippage tolerance
    pub fn with_slippage(&self, slippage: SlippageTolerance) -> Self {
        let minimum_received = slippage.minimum_received(self.amount_out);
        Self {
            minimum_received,
            minimum_received_formatted: format_amount(minimum_received, self.to_decimals),
            ..self.clone()
        }
    }

    pub fn impact_level(&self) -> ImpactLevel {
        ImpactLevel::from_pct(self.price_impact)
    }

    pub fn is_high_impact(&self) -> bool {
        self.price_impact > HIGH_IMPACT_WARNING_PCT
    }

    /// Output tokens received per one input token
    pub fn rate(&self) -> f64 {
        if self.execution_price == 0.0 {
            return 0.0;
        }
        1.0 / self.execution_price
    }

    /// "1 ETH = 3412.0831 USDC"
    pub fn rate_display(&self) -> String {
        let from = self.route.first().map(String::as_str).unwrap_or("?");
        let to = self.route.last().map(String::as_str).unwrap_or("?");
        format!("1 {} = {:.4} {}", from, self.rate(), to)
    }
}

// ============================================
// CONSTANT PRODUCT MATH
// ============================================

/// Router `getAmountOut`
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<U256, QuoteError> {
    if amount_in.is_zero() {
        return Err(QuoteError::ZeroAmount);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(QuoteError::InsufficientLiquidity);
    }

    let amount_in_with_fee = amount_in
        .checked_mul(U256::from(FEE_RETAINED))
        .ok_or(QuoteError::Overflow)?;
    let numerator = amount_in_with_fee
        .checked_mul(reserve_out)
        .ok_or(QuoteError::Overflow)?;
    let denominator = reserve_in
        .checked_mul(U256::from(FEE_BASE))
        .and_then(|r| r.checked_add(amount_in_with_fee))
        .ok_or(QuoteError::Overflow)?;

    Ok(numerator / denominator)
}

/// Router `getAmountIn`
pub fn get_amount_in(amount_out: U256, reserve_in: U256, reserve_out: U256) -> Result<U256, QuoteError> {
    if amount_out.is_zero() {
        return Err(QuoteError::ZeroAmount);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() || amount_out >= reserve_out {
        return Err(QuoteError::InsufficientLiquidity);
    }

    let numerator = reserve_in
        .checked_mul(amount_out)
        .and_then(|n| n.checked_mul(U256::from(FEE_BASE)))
        .ok_or(QuoteError::Overflow)?;
    let denominator = (reserve_out - amount_out)
        .checked_mul(U256::from(FEE_RETAINED))
        .ok_or(QuoteError::Overflow)?;

    Ok(numerator / denominator + U256::from(1))
}

/// Fee the pair keeps from `amount_in` (floor of 0.3%)
pub fn protocol_fee(amount_in: U256) -> U256 {
    amount_in.saturating_mul(U256::from(FEE_CHARGED)) / U256::from(FEE_BASE)
}

/// |execution - spot| / spot * 100, rounded to `IMPACT_DECIMALS` places
pub fn price_impact(execution_price: f64, spot_price: f64) -> f64 {
    if spot_price == 0.0 || !spot_price.is_finite() || !execution_price.is_finite() {
        return 0.0;
    }
    let raw = ((execution_price - spot_price) / spot_price * 100.0).abs();
    let factor = 10_f64.powi(IMPACT_DECIMALS);
    (raw * factor).round() / factor
}

// ============================================
// QUOTE ASSEMBLY
// ============================================

/// Compute a quote with the local formula.
/// `amount` is the input for `ExactIn` and the desired output for `ExactOut`.
pub fn compute_quote(
    reserves: ReservePair,
    amount: U256,
    direction: TradeDirection,
    from: &Token,
    to: &Token,
    slippage: SlippageTolerance,
) -> Result<Quote, QuoteError> {
    let (amount_in, amount_out) = match direction {
        TradeDirection::ExactIn => {
            let out = get_amount_out(amount, reserves.reserve_from, reserves.reserve_to)?;
            (amount, out)
        }
        TradeDirection::ExactOut => {
            let input = get_amount_in(amount, reserves.reserve_from, reserves.reserve_to)?;
            (input, amount)
        }
    };
    assemble_quote(reserves, amount_in, amount_out, direction, from, to, slippage)
}

/// Build the derived fields from a resolved `(amount_in, amount_out)`
/// pair, whether it came from the local formula or a live router call.
pub fn assemble_quote(
    reserves: ReservePair,
    amount_in: U256,
    amount_out: U256,
    direction: TradeDirection,
    from: &Token,
    to: &Token,
    slippage: SlippageTolerance,
) -> Result<Quote, QuoteError> {
    if amount_in.is_zero() {
        return Err(QuoteError::ZeroAmount);
    }
    if !reserves.has_liquidity() {
        return Err(QuoteError::InsufficientLiquidity);
    }
    if amount_out.is_zero() {
        return Err(QuoteError::InsufficientOutputAmount);
    }

    let spot_price = to_decimal_f64(reserves.reserve_from, from.decimals)
        / to_decimal_f64(reserves.reserve_to, to.decimals);
    let execution_price =
        to_decimal_f64(amount_in, from.decimals) / to_decimal_f64(amount_out, to.decimals);

    let fee = protocol_fee(amount_in);
    let minimum = slippage.minimum_received(amount_out);

    Ok(Quote {
        direction,
        amount_in,
        amount_out,
        amount_in_formatted: format_amount(amount_in, from.decimals),
        amount_out_formatted: format_amount(amount_out, to.decimals),
        price_impact: price_impact(execution_price, spot_price),
        fee,
        fee_formatted: format_amount(fee, from.decimals),
        route: vec![from.symbol.clone(), to.symbol.clone()],
        execution_price,
        spot_price,
        minimum_received: minimum,
        minimum_received_formatted: format_amount(minimum, to.decimals),
        to_decimals: to.decimals,
    })
}

// ============================================
// TESTS
// ============================================
