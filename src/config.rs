//! Runtime Configuration for AllSwap
//!
//! Settings come from the environment (and `.env`) or a TOML file. Network
//! and token descriptors live separately in the network registry; this only
//! selects which network to use and how to talk to it.

use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::networks::{Network, NetworkRegistry};
use crate::slippage::SlippageTolerance;

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// Overrides the registry RPC URL of the selected network
    pub rpc_url: Option<String>,

    /// Chain to operate on (1 = Ethereum Mainnet)
    pub chain_id: u64,

    /// Network registry file; the built-in registry when unset
    pub networks_file: Option<String>,

    // ========== Wallet Settings ==========
    /// Signing key for approvals and swaps (KEEP SECRET!)
    /// Never written back by `save_to_file`
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,

    // ========== Swap Settings ==========
    /// Slippage tolerance in percent
    pub default_slippage: SlippageTolerance,

    /// Ask the router for amounts instead of computing them locally
    pub live_router_quotes: bool,

    /// Receipt polling interval in milliseconds
    pub receipt_poll_ms: u64,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let default_slippage = match env::var("DEFAULT_SLIPPAGE") {
            Ok(raw) => {
                let pct: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| eyre!("DEFAULT_SLIPPAGE must be a number, got '{}'", raw))?;
                SlippageTolerance::from_percent(pct).map_err(|e| eyre!("DEFAULT_SLIPPAGE: {}", e))?
            }
            Err(_) => SlippageTolerance::auto(),
        };

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").ok().filter(|s| !s.is_empty()),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            networks_file: env::var("NETWORKS_FILE").ok().filter(|s| !s.is_empty()),

            // Wallet
            private_key: env::var("PRIVATE_KEY").ok().filter(|s| !s.is_empty()),

            // Swap
            default_slippage,
            live_router_quotes: env::var("LIVE_ROUTER_QUOTES")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            receipt_poll_ms: env::var("RECEIPT_POLL_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// The configured registry file, or the built-in one
    pub fn load_registry(&self) -> Result<NetworkRegistry> {
        match &self.networks_file {
            Some(path) => {
                info!("Loading networks from {}", path);
                NetworkRegistry::from_file(path)
            }
            None => NetworkRegistry::builtin(),
        }
    }

    /// RPC endpoint for `network`, honouring the override
    pub fn rpc_url_for(&self, network: &Network) -> String {
        self.rpc_url.clone().unwrap_or_else(|| network.rpc_url.clone())
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn has_wallet(&self) -> bool {
        self.private_key.is_some()
    }

    /// Validate configuration before touching the chain
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.rpc_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(eyre!("Invalid RPC_URL '{}' - expected an http(s) endpoint", url));
            }
            if url.contains("YOUR_API_KEY") {
                return Err(eyre!("Invalid RPC_URL - please set a real API key"));
            }
        }

        if let Some(key) = &self.private_key {
            let hex = key.trim_start_matches("0x");
            if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(eyre!("PRIVATE_KEY must be 32 bytes of hex"));
            }
        }

        if self.receipt_poll_ms == 0 {
            return Err(eyre!("RECEIPT_POLL_MS must be greater than zero"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self, network: &Network) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              ALLSWAP - CONFIGURATION                       ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Network:           {:^40} ║", network.name);
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Registry:          {:^40} ║",
            self.networks_file.as_deref().unwrap_or("built-in")
        );
        println!("║ RPC Override:      {:^40} ║",
            if self.rpc_url.is_some() { "✓ Configured" } else { "✗ Registry default" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SWAP                                                       ║");
        println!("║ • Slippage:        {:^40} ║", self.default_slippage.to_string());
        println!("║ • Quote Source:    {:^40} ║",
            if self.live_router_quotes { "Router (live)" } else { "Local math" }
        );
        println!("║ • Receipt Poll:    {:>37} ms ║", self.receipt_poll_ms);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ WALLET                                                     ║");
        println!("║ • Private Key:     {:^40} ║",
            if self.private_key.is_some() { "✓ Configured" } else { "✗ Not Set (read-only)" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: None,
            chain_id: 1,
            networks_file: None,
            private_key: None,
            default_slippage: SlippageTolerance::auto(),
            live_router_quotes: false,
            receipt_poll_ms: 2000,
        }
    }
}

// ============================================
// TESTS
// ============================================
