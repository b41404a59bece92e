//! In-memory chain for orchestrator tests

use alloy_primitives::{Address, TxHash, B256, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{ChainReader, ChainWriter, ConfirmedTx, PairReserves, SwapCall};
use crate::quote;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Approve { token: Address, spender: Address, amount: U256 },
    TokensForTokens(SwapCall),
    EthForTokens(SwapCall),
    TokensForEth(SwapCall),
}

#[derive(Default)]
struct MockState {
    pairs: HashMap<(Address, Address), Address>,
    reserves: HashMap<Address, PairReserves>,
    allowances: HashMap<(Address, Address, Address), U256>,
    balances: HashMap<(Address, Address), U256>,
    native: HashMap<Address, U256>,
    pending_approvals: HashMap<TxHash, (Address, Address, U256)>,
    calls: Vec<WriteCall>,
    next_tx: u64,
    reads_fail: bool,
    allowance_fails: bool,
    approve_fails: bool,
    swap_fails: bool,
    revert_next: bool,
}

pub struct MockChain {
    owner: Address,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new(owner: Address) -> Self {
        Self { owner, state: Mutex::new(MockState::default()) }
    }

    pub fn add_pair(&self, pair: Address, token0: Address, token1: Address, reserve0: u128, reserve1: u128) {
        let mut s = self.state.lock().unwrap();
        s.pairs.insert((token0, token1), pair);
        s.pairs.insert((token1, token0), pair);
        s.reserves.insert(
            pair,
            PairReserves { reserve0: U256::from(reserve0), reserve1: U256::from(reserve1), token0 },
        );
    }

    pub fn set_allowance(&self, token: Address, spender: Address, amount: U256) {
        let owner = self.owner;
        self.state.lock().unwrap().allowances.insert((token, owner, spender), amount);
    }

    pub fn set_balance(&self, token: Address, amount: U256) {
        let owner = self.owner;
        self.state.lock().unwrap().balances.insert((token, owner), amount);
    }

    pub fn set_native_balance(&self, amount: U256) {
        let owner = self.owner;
        self.state.lock().unwrap().native.insert(owner, amount);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().reads_fail = fail;
    }

    pub fn fail_allowance(&self, fail: bool) {
        self.state.lock().unwrap().allowance_fails = fail;
    }

    pub fn fail_approve(&self, fail: bool) {
        self.state.lock().unwrap().approve_fails = fail;
    }

    pub fn fail_swap(&self, fail: bool) {
        self.state.lock().unwrap().swap_fails = fail;
    }

    /// The next confirmed transaction reverts
    pub fn revert_next(&self) {
        self.state.lock().unwrap().revert_next = true;
    }

    pub fn calls(&self) -> Vec<WriteCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn next_hash(s: &mut MockState) -> TxHash {
        s.next_tx += 1;
        B256::left_padding_from(&s.next_tx.to_be_bytes())
    }

    fn record_swap(&self, call: WriteCall) -> Result<TxHash> {
        let mut s = self.state.lock().unwrap();
        if s.swap_fails {
            return Err(eyre!("user rejected transaction"));
        }
        s.calls.push(call);
        Ok(Self::next_hash(&mut s))
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn get_pair(&self, _factory: Address, token_a: Address, token_b: Address) -> Result<Option<Address>> {
        let s = self.state.lock().unwrap();
        if s.reads_fail {
            return Err(eyre!("connection refused"));
        }
        Ok(s.pairs.get(&(token_a, token_b)).copied())
    }

    async fn get_reserves(&self, pair: Address) -> Result<PairReserves> {
        let s = self.state.lock().unwrap();
        if s.reads_fail {
            return Err(eyre!("connection refused"));
        }
        s.reserves.get(&pair).copied().ok_or_else(|| eyre!("execution reverted"))
    }

    async fn get_amount_out(&self, _router: Address, amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<U256> {
        quote::get_amount_out(amount_in, reserve_in, reserve_out).map_err(|e| eyre!("execution reverted: {}", e))
    }

    async fn get_amount_in(&self, _router: Address, amount_out: U256, reserve_in: U256, reserve_out: U256) -> Result<U256> {
        quote::get_amount_in(amount_out, reserve_in, reserve_out).map_err(|e| eyre!("execution reverted: {}", e))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let s = self.state.lock().unwrap();
        if s.allowance_fails {
            return Err(eyre!("connection refused"));
        }
        Ok(s.allowances.get(&(token, owner, spender)).copied().unwrap_or_default())
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let s = self.state.lock().unwrap();
        Ok(s.balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn native_balance(&self, owner: Address) -> Result<U256> {
        let s = self.state.lock().unwrap();
        Ok(s.native.get(&owner).copied().unwrap_or_default())
    }
}

#[async_trait]
impl ChainWriter for MockChain {
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash> {
        let mut s = self.state.lock().unwrap();
        if s.approve_fails {
            return Err(eyre!("user rejected transaction"));
        }
        s.calls.push(WriteCall::Approve { token, spender, amount });
        let hash = Self::next_hash(&mut s);
        s.pending_approvals.insert(hash, (token, spender, amount));
        Ok(hash)
    }

    async fn swap_exact_tokens_for_tokens(&self, call: &SwapCall) -> Result<TxHash> {
        self.record_swap(WriteCall::TokensForTokens(call.clone()))
    }

    async fn swap_exact_eth_for_tokens(&self, call: &SwapCall) -> Result<TxHash> {
        self.record_swap(WriteCall::EthForTokens(call.clone()))
    }

    async fn swap_exact_tokens_for_eth(&self, call: &SwapCall) -> Result<TxHash> {
        self.record_swap(WriteCall::TokensForEth(call.clone()))
    }

    async fn confirm(&self, tx: TxHash) -> Result<ConfirmedTx> {
        let mut s = self.state.lock().unwrap();
        if std::mem::take(&mut s.revert_next) {
            s.pending_approvals.remove(&tx);
            return Err(eyre!("Transaction {:?} reverted", tx));
        }
        if let Some((token, spender, amount)) = s.pending_approvals.remove(&tx) {
            let owner = self.owner;
            s.allowances.insert((token, owner, spender), amount);
        }
        Ok(ConfirmedTx { tx_hash: tx, block_number: Some(s.next_tx), gas_used: 21_000 })
    }
}
