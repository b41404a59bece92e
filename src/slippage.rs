//! Slippage tolerance settings
//!
//! The tolerance is kept in thousandths of a percent, which is the scale
//! the router-compatible minimum output rule works in
//! (`amount * (100000 - milli) / 100000`). Presets and custom text both
//! collapse into the same value.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tokens::is_amount_text;

/// Preset tolerances offered next to the custom field, in percent
pub const SLIPPAGE_PRESETS: [f64; 4] = [0.1, 0.5, 1.0, 3.0];

/// Tolerance restored by the "Auto" shortcut
pub const AUTO_SLIPPAGE_PCT: f64 = 0.5;

/// Upper bound accepted from any input mode
pub const MAX_SLIPPAGE_PCT: f64 = 50.0;

const MILLI_PER_PCT: f64 = 1000.0;
const FULL_SCALE: u64 = 100_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SlippageError {
    #[error("slippage must be greater than 0%")]
    TooLow,

    #[error("slippage above {max}% is not allowed (got {0}%)", max = MAX_SLIPPAGE_PCT)]
    TooHigh(f64),

    #[error("'{0}' is not a valid percentage")]
    Malformed(String),

    #[error("{0}% is not one of the preset tolerances")]
    NotPreset(f64),
}

/// A validated tolerance in `(0, 50]` percent at 0.001% resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SlippageTolerance {
    milli_pct: u32,
}

impl SlippageTolerance {
    pub fn from_percent(pct: f64) -> Result<Self, SlippageError> {
        if !pct.is_finite() {
            return Err(SlippageError::Malformed(pct.to_string()));
        }
        if pct > MAX_SLIPPAGE_PCT {
            return Err(SlippageError::TooHigh(pct));
        }
        let milli = (pct * MILLI_PER_PCT).round();
        if milli < 1.0 {
            return Err(SlippageError::TooLow);
        }
        Ok(Self { milli_pct: milli as u32 })
    }

    pub fn auto() -> Self {
        Self { milli_pct: (AUTO_SLIPPAGE_PCT * MILLI_PER_PCT) as u32 }
    }

    pub fn percent(&self) -> f64 {
        self.milli_pct as f64 / MILLI_PER_PCT
    }

    /// `round((100 - slippage) * 1000)`
    pub fn retained_scaled(&self) -> u64 {
        FULL_SCALE - self.milli_pct as u64
    }

    /// `amount_out * (100000 - milli) / 100000`, floor division.
    ///
    /// Fixed point at 0.001% resolution, the same integer sequence the swap
    /// transaction uses for `amountOutMin`.
    pub fn minimum_received(&self, amount_out: U256) -> U256 {
        amount_out.saturating_mul(U256::from(self.retained_scaled())) / U256::from(FULL_SCALE)
    }

    pub fn is_preset(&self) -> bool {
        SLIPPAGE_PRESETS
            .iter()
            .any(|p| (p * MILLI_PER_PCT).round() as u32 == self.milli_pct)
    }

    pub fn warning(&self) -> Option<SlippageWarning> {
        let pct = self.percent();
        if pct < 0.05 {
            Some(SlippageWarning::MayFail)
        } else if pct > 5.0 {
            Some(SlippageWarning::Unfavorable)
        } else {
            None
        }
    }
}

impl Default for SlippageTolerance {
    fn default() -> Self {
        Self::auto()
    }
}

impl TryFrom<f64> for SlippageTolerance {
    type Error = SlippageError;

    fn try_from(pct: f64) -> Result<Self, Self::Error> {
        Self::from_percent(pct)
    }
}

impl From<SlippageTolerance> for f64 {
    fn from(s: SlippageTolerance) -> f64 {
        s.percent()
    }
}

impl std::fmt::Display for SlippageTolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlippageWarning {
    /// Below 0.05%
    MayFail,
    /// Above 5%
    Unfavorable,
}

impl SlippageWarning {
    pub fn message(&self) -> &'static str {
        match self {
            SlippageWarning::MayFail => "Your transaction may fail due to low slippage tolerance",
            SlippageWarning::Unfavorable => "High slippage tolerance may result in unfavorable rates",
        }
    }
}

// ============================================
// INPUT MODEL
// ============================================

/// Which control produced the current tolerance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlippageMode {
    Preset,
    Custom(String),
}

/// Preset buttons plus free-text field, backed by one tolerance value
#[derive(Debug, Clone, PartialEq)]
pub struct SlippageSetting {
    value: SlippageTolerance,
    mode: SlippageMode,
}

impl SlippageSetting {
    pub fn new(value: SlippageTolerance) -> Self {
        let mode = if value.is_preset() {
            SlippageMode::Preset
        } else {
            SlippageMode::Custom(value.percent().to_string())
        };
        Self { value, mode }
    }

    pub fn value(&self) -> SlippageTolerance {
        self.value
    }

    pub fn mode(&self) -> &SlippageMode {
        &self.mode
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.mode, SlippageMode::Custom(_))
    }

    pub fn select_preset(&mut self, pct: f64) -> Result<SlippageTolerance, SlippageError> {
        let value = SlippageTolerance::from_percent(pct)?;
        if !value.is_preset() {
            return Err(SlippageError::NotPreset(pct));
        }
        self.value = value;
        self.mode = SlippageMode::Preset;
        Ok(value)
    }

    pub fn select_auto(&mut self) -> SlippageTolerance {
        self.value = SlippageTolerance::auto();
        self.mode = SlippageMode::Preset;
        self.value
    }

    /// Apply custom text. The text is kept even while it does not yet
    /// form a usable value ("", "0.", ...); the tolerance only moves once
    /// it parses to something in range.
    pub fn set_custom(&mut self, text: &str) -> Result<SlippageTolerance, SlippageError> {
        if !is_amount_text(text) {
            return Err(SlippageError::Malformed(text.to_string()));
        }
        self.mode = SlippageMode::Custom(text.to_string());

        let pct: f64 = match text.trim_end_matches('.').parse() {
            Ok(p) => p,
            Err(_) => return Ok(self.value),
        };
        let value = SlippageTolerance::from_percent(pct)?;
        self.value = value;
        Ok(value)
    }
}

impl Default for SlippageSetting {
    fn default() -> Self {
        Self::new(SlippageTolerance::auto())
    }
}

// ============================================
// TESTS
// ============================================
