//! Token definitions and amount conversions
//!
//! Tokens are described by the network configuration (see `networks.rs`).
//! The native currency of a chain is represented by a token carrying the
//! `NATIVE_TOKEN_ADDRESS` sentinel and `is_native = true`; it is routed
//! through the wrapped-native contract whenever a pair lookup is needed.

use alloy_primitives::utils::{format_units, parse_units};
use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel address used for the chain's native currency
pub const NATIVE_TOKEN_ADDRESS: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Largest decimals a 256-bit amount can be scaled by
pub const MAX_DECIMALS: u8 = 77;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("'{0}' is not a decimal number")]
    Malformed(String),

    #[error("at most {0} decimal places are allowed")]
    TooPrecise(u8),

    #[error("amount does not fit in 256 bits")]
    TooLarge,

    #[error("{0} decimals cannot be represented")]
    UnsupportedDecimals(u8),
}

/// A token the user can select on one side of a swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(default)]
    pub is_native: bool,
}

impl Token {
    pub fn new(address: Address, symbol: &str, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            decimals,
            logo_uri: None,
            is_native: address == NATIVE_TOKEN_ADDRESS,
        }
    }

    /// Build the native-currency token for a chain
    pub fn native(symbol: &str, name: &str, decimals: u8) -> Self {
        Self {
            address: NATIVE_TOKEN_ADDRESS,
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            logo_uri: None,
            is_native: true,
        }
    }

    /// Address used in factory lookups and router paths.
    /// The native currency trades as its wrapped ERC-20.
    pub fn route_address(&self, wrapped_native: Address) -> Address {
        if self.is_native {
            wrapped_native
        } else {
            self.address
        }
    }

    /// Parse a user-entered amount into smallest units
    pub fn parse_amount(&self, text: &str) -> Result<Option<U256>, AmountError> {
        parse_amount(text, self.decimals)
    }

    /// Render smallest units as a decimal string
    pub fn format_amount(&self, amount: U256) -> String {
        format_amount(amount, self.decimals)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

// ============================================
// AMOUNT CONVERSIONS
// ============================================

/// True when `text` looks like a decimal amount in progress (`^\d*\.?\d*$`).
/// The empty string is accepted because it is how a field gets cleared.
pub fn is_amount_text(text: &str) -> bool {
    let mut seen_dot = false;
    for c in text.chars() {
        match c {
            '0'..='9' => {}
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    true
}

/// Parse a decimal string into smallest units. `Ok(None)` while there is
/// no number yet (empty or a lone dot).
pub fn parse_amount(text: &str, decimals: u8) -> Result<Option<U256>, AmountError> {
    let text = text.trim();
    if text.is_empty() || text == "." {
        return Ok(None);
    }
    if !is_amount_text(text) {
        return Err(AmountError::Malformed(text.to_string()));
    }
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    // "5." and ".5" are valid field contents but not valid for parse_units
    let normalized = match (text.starts_with('.'), text.ends_with('.')) {
        (true, _) => format!("0{}", text),
        (_, true) => text.trim_end_matches('.').to_string(),
        _ => text.to_string(),
    };
    let fractional = normalized.split_once('.').map_or(0, |(_, f)| f.len());
    if fractional > decimals as usize {
        return Err(AmountError::TooPrecise(decimals));
    }
    parse_units(&normalized, decimals)
        .map(|units| Some(units.get_absolute()))
        .map_err(|_| AmountError::TooLarge)
}

/// Format smallest units as a decimal string without trailing zeros
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let formatted = match format_units(amount, decimals) {
        Ok(s) => s,
        Err(_) => pad_decimal(amount, decimals),
    };
    if !formatted.contains('.') {
        return formatted;
    }
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Place the decimal point by hand for scales `format_units` rejects
fn pad_decimal(amount: U256, decimals: u8) -> String {
    let width = decimals as usize + 1;
    let digits = format!("{:0>width$}", amount.to_string(), width = width);
    let (int_part, frac_part) = digits.split_at(digits.len() - decimals as usize);
    format!("{}.{}", int_part, frac_part)
}

/// Convert smallest units to a floating-point amount in whole tokens
pub fn to_decimal_f64(amount: U256, decimals: u8) -> f64 {
    let raw: f64 = amount.to_string().parse().unwrap_or(0.0);
    raw / 10_f64.powi(decimals as i32)
}

/// Compact rendering used for balances and quote amounts:
/// exponent form below 0.0001, otherwise 4 significant digits
/// with thousands separators.
pub fn format_balance(text: &str) -> String {
    let num: f64 = match text.trim().parse() {
        Ok(n) => n,
        Err(_) => return "0".to_string(),
    };
    if num == 0.0 || !num.is_finite() {
        return "0".to_string();
    }
    if num > 0.0 && num < 0.0001 {
        return format!("{:.2e}", num);
    }

    let magnitude = num.abs().log10().floor() as i32;
    let rounded = if magnitude <= 3 {
        let factor = 10_f64.powi(3 - magnitude);
        (num * factor).round() / factor
    } else {
        let scale = 10_f64.powi(magnitude - 3);
        (num / scale).round() * scale
    };
    let decimals = (3 - magnitude).max(0) as usize;

    let fixed = format!("{:.*}", decimals, rounded);
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), f.trim_end_matches('0').to_string()),
        None => (fixed.clone(), String::new()),
    };

    let grouped = group_thousands(&int_part);
    if frac_part.is_empty() {
        grouped
    } else {
        format!("{}.{}", grouped, frac_part)
    }
}

fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{}{}", sign, out)
}

// ============================================
// TESTS
// ============================================
