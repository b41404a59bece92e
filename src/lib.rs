//! AllSwap - Uniswap V2-style swap client
//!
//! Quotes trades from live pair reserves, gates ERC-20 inputs behind an
//! exact-amount approval and submits router swaps with a deadline and a
//! slippage-bounded minimum output.

pub mod chain;
pub mod config;
pub mod error;
pub mod networks;
pub mod notify;
pub mod orchestrator;
pub mod quote;
pub mod session;
pub mod slippage;
pub mod tokens;

pub use error::SwapError;
pub use orchestrator::{SwapAction, SwapOrchestrator, SwapState};
pub use quote::{Quote, TradeDirection};
