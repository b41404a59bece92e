//! Network and Token Registry
//!
//! Static descriptors for every supported chain: RPC endpoint, explorer,
//! native currency, the V2 router / factory / wrapped-native contracts and
//! the selectable token list. Loaded once at startup, read-only afterwards.

use alloy_primitives::{Address, TxHash};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::SwapError;
use crate::tokens::Token;

/// Registry shipped with the crate
const BUILTIN_NETWORKS: &str = include_str!("../networks.toml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contracts {
    pub router: Address,
    pub factory: Address,
    /// Wrapped native currency, used in place of the native token in paths
    pub weth: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub native_currency: NativeCurrency,
    pub contracts: Contracts,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

impl Network {
    /// The native currency as a selectable token
    pub fn native_token(&self) -> Token {
        self.tokens
            .iter()
            .find(|t| t.is_native)
            .cloned()
            .unwrap_or_else(|| {
                Token::native(
                    &self.native_currency.symbol,
                    &self.native_currency.name,
                    self.native_currency.decimals,
                )
            })
    }

    /// Case-insensitive symbol lookup
    pub fn token_by_symbol(&self, symbol: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn token_by_address(&self, address: Address) -> Option<&Token> {
        self.tokens.iter().find(|t| t.address == address)
    }

    pub fn explorer_tx_url(&self, tx_hash: TxHash) -> String {
        format!("{}/tx/{:?}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRegistry {
    pub networks: Vec<Network>,
}

impl NetworkRegistry {
    /// The registry compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_NETWORKS)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| eyre!("Failed to read {}: {}", path.as_ref().display(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let registry: Self = toml::from_str(content)?;
        registry.validate()?;
        debug!("Loaded {} networks", registry.networks.len());
        Ok(registry)
    }

    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            return Err(eyre!("Network registry is empty"));
        }

        let mut chain_ids = HashSet::new();
        for network in &self.networks {
            if !chain_ids.insert(network.chain_id) {
                return Err(eyre!("Duplicate chain id {}", network.chain_id));
            }

            let mut addresses = HashSet::new();
            for token in &network.tokens {
                if !addresses.insert(token.address) {
                    return Err(eyre!(
                        "{}: token {} listed twice ({:?})",
                        network.name, token.symbol, token.address
                    ));
                }
                if token.decimals > crate::tokens::MAX_DECIMALS {
                    return Err(eyre!(
                        "{}: token {} has {} decimals, at most {} are supported",
                        network.name, token.symbol, token.decimals, crate::tokens::MAX_DECIMALS
                    ));
                }
                if token.is_native && token.address != crate::tokens::NATIVE_TOKEN_ADDRESS {
                    return Err(eyre!(
                        "{}: native token {} must use the native sentinel address",
                        network.name, token.symbol
                    ));
                }
            }

            let c = network.contracts;
            if c.router == Address::ZERO || c.factory == Address::ZERO || c.weth == Address::ZERO {
                return Err(eyre!("{}: router, factory and weth must all be set", network.name));
            }
        }

        Ok(())
    }

    pub fn find(&self, chain_id: u64) -> Option<&Network> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    pub fn require(&self, chain_id: u64) -> Result<&Network, SwapError> {
        self.find(chain_id).ok_or(SwapError::UnsupportedNetwork(chain_id))
    }

    /// Target for "switch network" when no chain is specified
    pub fn default_network(&self) -> &Network {
        &self.networks[0]
    }

    pub fn is_supported(&self, chain_id: u64) -> bool {
        self.find(chain_id).is_some()
    }
}
