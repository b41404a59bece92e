//! JSON-RPC chain access
//!
//! Reads are plain `eth_call`s with `sol!`-encoded calldata. Writes go
//! through a wallet-filled provider signing with a local private key.

use alloy_network::{EthereumWallet, ReceiptResponse};
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::abi::{IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02, IERC20};
use super::{ChainReader, ChainWriter, ConfirmedTx, PairReserves, SwapCall};

// ============================================
// READER
// ============================================

pub struct RpcChainReader {
    rpc_url: String,
}

impl RpcChainReader {
    pub fn new(rpc_url: String) -> Self {
        Self { rpc_url }
    }

    async fn call_contract(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>> {
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        let tx = TransactionRequest::default()
            .to(to)
            .input(calldata.into());

        let result = provider.call(tx).await
            .map_err(|e| eyre!("eth_call failed: {}", e))?;

        Ok(result.to_vec())
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn get_pair(&self, factory: Address, token_a: Address, token_b: Address) -> Result<Option<Address>> {
        let calldata = IUniswapV2Factory::getPairCall { tokenA: token_a, tokenB: token_b }.abi_encode();
        let output = self.call_contract(factory, calldata).await?;

        let pair = IUniswapV2Factory::getPairCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode getPair: {}", e))?;

        trace!("getPair({:?}, {:?}) = {:?}", token_a, token_b, pair);
        Ok((pair != Address::ZERO).then_some(pair))
    }

    async fn get_reserves(&self, pair: Address) -> Result<PairReserves> {
        let output = self.call_contract(pair, IUniswapV2Pair::getReservesCall {}.abi_encode()).await?;
        let reserves = IUniswapV2Pair::getReservesCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode reserves: {}", e))?;

        let output = self.call_contract(pair, IUniswapV2Pair::token0Call {}.abi_encode()).await?;
        let token0 = IUniswapV2Pair::token0Call::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode token0: {}", e))?;

        let r0: u128 = reserves.reserve0.to();
        let r1: u128 = reserves.reserve1.to();

        debug!("Pair {:?} reserves: {} / {} (token0 {:?})", pair, r0, r1, token0);

        Ok(PairReserves {
            reserve0: U256::from(r0),
            reserve1: U256::from(r1),
            token0,
        })
    }

    async fn get_amount_out(&self, router: Address, amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<U256> {
        let calldata = IUniswapV2Router02::getAmountOutCall {
            amountIn: amount_in,
            reserveIn: reserve_in,
            reserveOut: reserve_out,
        }
        .abi_encode();
        let output = self.call_contract(router, calldata).await?;

        IUniswapV2Router02::getAmountOutCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode getAmountOut: {}", e))
    }

    async fn get_amount_in(&self, router: Address, amount_out: U256, reserve_in: U256, reserve_out: U256) -> Result<U256> {
        let calldata = IUniswapV2Router02::getAmountInCall {
            amountOut: amount_out,
            reserveIn: reserve_in,
            reserveOut: reserve_out,
        }
        .abi_encode();
        let output = self.call_contract(router, calldata).await?;

        IUniswapV2Router02::getAmountInCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode getAmountIn: {}", e))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let calldata = IERC20::allowanceCall { owner, spender }.abi_encode();
        let output = self.call_contract(token, calldata).await?;

        IERC20::allowanceCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode allowance: {}", e))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let calldata = IERC20::balanceOfCall { account: owner }.abi_encode();
        let output = self.call_contract(token, calldata).await?;

        IERC20::balanceOfCall::abi_decode_returns(&output)
            .map_err(|e| eyre!("Failed to decode balanceOf: {}", e))
    }

    async fn native_balance(&self, owner: Address) -> Result<U256> {
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        provider.get_balance(owner).await
            .map_err(|e| eyre!("eth_getBalance failed: {}", e))
    }
}

// ============================================
// WRITER
// ============================================

pub struct RpcChainWriter {
    rpc_url: String,
    signer: Option<PrivateKeySigner>,
    poll_interval: Duration,
}

impl RpcChainWriter {
    pub fn new(rpc_url: String, signer: Option<PrivateKeySigner>, poll_interval: Duration) -> Self {
        Self { rpc_url, signer, poll_interval }
    }

    /// Build a writer from an optional hex private key, signing for `chain_id`
    pub fn from_key(
        rpc_url: String,
        private_key: Option<&str>,
        chain_id: u64,
        poll_interval: Duration,
    ) -> Result<Self> {
        let signer = private_key
            .map(|k| k.trim_start_matches("0x"))
            .map(PrivateKeySigner::from_str)
            .transpose()
            .map_err(|e| eyre!("Failed to parse private key: {}", e))?
            .map(|s| s.with_chain_id(Some(chain_id)));

        if let Some(signer) = &signer {
            info!("✓ Wallet loaded: {:?}", signer.address());
        }

        Ok(Self::new(rpc_url, signer, poll_interval))
    }

    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    async fn send(&self, to: Address, calldata: Vec<u8>, value: U256) -> Result<TxHash> {
        let signer = self.signer.clone()
            .ok_or_else(|| eyre!("No wallet configured"))?;
        let from = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.parse()?);

        let tx = TransactionRequest::default()
            .from(from)
            .to(to)
            .input(calldata.into())
            .value(value);

        let pending = provider.send_transaction(tx).await
            .map_err(|e| eyre!("Transaction submission failed: {}", e))?;

        let tx_hash = *pending.tx_hash();
        debug!("Submitted transaction {:?} to {:?}", tx_hash, to);

        Ok(tx_hash)
    }
}

#[async_trait]
impl ChainWriter for RpcChainWriter {
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash> {
        let calldata = IERC20::approveCall { spender, amount }.abi_encode();
        self.send(token, calldata, U256::ZERO).await
    }

    async fn swap_exact_tokens_for_tokens(&self, call: &SwapCall) -> Result<TxHash> {
        let calldata = IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: call.amount_in,
            amountOutMin: call.amount_out_min,
            path: call.path.clone(),
            to: call.to,
            deadline: call.deadline,
        }
        .abi_encode();
        self.send(call.router, calldata, U256::ZERO).await
    }

    async fn swap_exact_eth_for_tokens(&self, call: &SwapCall) -> Result<TxHash> {
        let calldata = IUniswapV2Router02::swapExactETHForTokensCall {
            amountOutMin: call.amount_out_min,
            path: call.path.clone(),
            to: call.to,
            deadline: call.deadline,
        }
        .abi_encode();
        self.send(call.router, calldata, call.amount_in).await
    }

    async fn swap_exact_tokens_for_eth(&self, call: &SwapCall) -> Result<TxHash> {
        let calldata = IUniswapV2Router02::swapExactTokensForETHCall {
            amountIn: call.amount_in,
            amountOutMin: call.amount_out_min,
            path: call.path.clone(),
            to: call.to,
            deadline: call.deadline,
        }
        .abi_encode();
        self.send(call.router, calldata, U256::ZERO).await
    }

    async fn confirm(&self, tx: TxHash) -> Result<ConfirmedTx> {
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        loop {
            let receipt = provider.get_transaction_receipt(tx).await
                .map_err(|e| eyre!("eth_getTransactionReceipt failed: {}", e))?;

            match receipt {
                Some(receipt) => {
                    if !receipt.status() {
                        return Err(eyre!("Transaction {:?} reverted", tx));
                    }
                    return Ok(ConfirmedTx {
                        tx_hash: tx,
                        block_number: receipt.block_number,
                        gas_used: receipt.gas_used,
                    });
                }
                None => {
                    trace!("Receipt for {:?} not available yet", tx);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
