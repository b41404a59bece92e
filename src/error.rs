//! Failure taxonomy at the orchestrator boundary
//!
//! Chain plumbing reports `eyre` errors; the orchestrator converts them
//! into one of these variants so callers can tell a missing pool from a
//! flaky RPC from a rejected transaction.

use thiserror::Error;

use crate::notify::Notification;
use crate::slippage::SlippageError;
use crate::tokens::AmountError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SwapError {
    /// The factory has no pair (or an empty pair) for the tokens
    #[error("no liquidity pool exists for {from}/{to}")]
    NoLiquidity { from: String, to: String },

    #[error("failed to get price quote: {0}")]
    QuoteFailed(String),

    #[error("failed to approve token: {0}")]
    ApprovalFailed(String),

    #[error("failed to execute swap: {0}")]
    SwapFailed(String),

    #[error("chain {0} is not a supported network")]
    UnsupportedNetwork(u64),

    #[error("failed to read allowance: {0}")]
    AllowanceCheckFailed(String),

    #[error("failed to read balance: {0}")]
    BalanceFailed(String),

    #[error("'{0}' is not a valid amount")]
    InvalidAmount(String),

    /// Well-formed text the selected token cannot represent
    #[error(transparent)]
    UnrepresentableAmount(#[from] AmountError),

    #[error(transparent)]
    InvalidSlippage(#[from] SlippageError),

    #[error("{0} is already selected on the other side")]
    SameToken(String),

    #[error("wallet is not connected")]
    WalletNotConnected,

    #[error("swap is not ready: {0}")]
    NotReady(&'static str),

    #[error("another {0} is already in progress")]
    Busy(&'static str),
}

impl SwapError {
    /// Whether re-triggering the same action can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwapError::QuoteFailed(_)
                | SwapError::ApprovalFailed(_)
                | SwapError::SwapFailed(_)
                | SwapError::AllowanceCheckFailed(_)
                | SwapError::BalanceFailed(_)
                | SwapError::Busy(_)
        )
    }

    /// The single notification raised for this failure
    pub fn notification(&self) -> Notification {
        match self {
            SwapError::NoLiquidity { from, to } => Notification::error(
                "No liquidity pool",
                format!("No liquidity pool exists for {}/{}", from, to),
            ),
            SwapError::QuoteFailed(_) => Notification::error("Error getting quote", "Failed to get price quote"),
            SwapError::ApprovalFailed(_) => Notification::error("Approval failed", "Failed to approve token"),
            SwapError::SwapFailed(_) => Notification::error("Swap failed", "Failed to execute swap"),
            SwapError::UnsupportedNetwork(_) => {
                Notification::error("Unsupported Network", "Please switch to a supported network")
            }
            SwapError::AllowanceCheckFailed(_) => {
                Notification::error("Error checking allowance", "Failed to read token allowance")
            }
            SwapError::BalanceFailed(_) => Notification::error("Error loading balance", "Failed to read token balance"),
            SwapError::InvalidAmount(text) => Notification::error("Invalid amount", format!("'{}' is not a valid amount", text)),
            SwapError::UnrepresentableAmount(e) => Notification::error("Invalid amount", e.to_string()),
            SwapError::InvalidSlippage(e) => Notification::error("Invalid slippage", e.to_string()),
            SwapError::SameToken(symbol) => {
                Notification::error("Invalid token selection", format!("{} is already selected", symbol))
            }
            SwapError::WalletNotConnected => Notification::error("Wallet not connected", "Connect a wallet first"),
            SwapError::NotReady(reason) => Notification::error("Swap not ready", *reason),
            SwapError::Busy(what) => Notification::error("Please wait", format!("A {} is already in progress", what)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wording() {
        let n = SwapError::NoLiquidity { from: "ETH".into(), to: "PEPE".into() }.notification();
        assert_eq!(n.title, "No liquidity pool");
        assert_eq!(n.description, "No liquidity pool exists for ETH/PEPE");
        assert!(n.is_error());

        let n = SwapError::SwapFailed("reverted".into()).notification();
        assert_eq!(n.title, "Swap failed");
    }

    #[test]
    fn test_retryable() {
        assert!(SwapError::QuoteFailed("timeout".into()).is_retryable());
        assert!(!SwapError::NoLiquidity { from: "A".into(), to: "B".into() }.is_retryable());
        assert!(!SwapError::UnsupportedNetwork(5).is_retryable());
    }
}
