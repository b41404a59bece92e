//! Chain access seam
//!
//! The orchestrator never talks to a provider directly. Reads go through
//! `ChainReader`, signed transactions through `ChainWriter`; the RPC
//! implementations live in `rpc.rs` and tests substitute an in-memory chain.

pub mod abi;
mod rpc;

#[cfg(test)]
pub(crate) mod mock;

pub use rpc::{RpcChainReader, RpcChainWriter};

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use eyre::Result;
use serde::Serialize;

/// Raw `getReserves()` + `token0()` of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairReserves {
    pub reserve0: U256,
    pub reserve1: U256,
    pub token0: Address,
}

/// Arguments shared by the three router swap entry points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapCall {
    pub router: Address,
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub to: Address,
    pub deadline: U256,
}

/// A mined, successful transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedTx {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Read-only contract calls
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Factory `getPair`; `None` when the factory returns the zero address
    async fn get_pair(&self, factory: Address, token_a: Address, token_b: Address) -> Result<Option<Address>>;

    async fn get_reserves(&self, pair: Address) -> Result<PairReserves>;

    async fn get_amount_out(&self, router: Address, amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<U256>;

    async fn get_amount_in(&self, router: Address, amount_out: U256, reserve_in: U256, reserve_out: U256) -> Result<U256>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;

    async fn native_balance(&self, owner: Address) -> Result<U256>;
}

/// Signed calls. Every method returns as soon as the transaction is
/// submitted; `confirm` must be awaited before acting on the outcome.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash>;

    async fn swap_exact_tokens_for_tokens(&self, call: &SwapCall) -> Result<TxHash>;

    /// `call.amount_in` is sent as the transaction value
    async fn swap_exact_eth_for_tokens(&self, call: &SwapCall) -> Result<TxHash>;

    async fn swap_exact_tokens_for_eth(&self, call: &SwapCall) -> Result<TxHash>;

    /// Wait for the receipt; reverted transactions are errors
    async fn confirm(&self, tx: TxHash) -> Result<ConfirmedTx>;
}
