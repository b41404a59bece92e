//! Diagnostic tool - Check configuration and registry
//!
//! Run with: cargo run --bin diagnose

use allswap::config::Config;
use std::env;

/// Keep the head and tail of long values, cutting on character boundaries
fn shorten(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 50 {
        return value.to_string();
    }
    let head: String = chars[..30].iter().collect();
    let tail: String = chars[chars.len() - 15..].iter().collect();
    format!("{}...{}", head, tail)
}

fn main() {
    println!("🔍 ALLSWAP DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("CHAIN_ID", "1", "Network to trade on"),
        ("DEFAULT_SLIPPAGE", "0.5", "Slippage tolerance in percent"),
        ("LIVE_ROUTER_QUOTES", "false", "Ask the router for amounts?"),
        ("RECEIPT_POLL_MS", "2000", "Receipt polling interval"),
        ("NETWORKS_FILE", "built-in", "Network registry"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    // RPC check
    let rpc = env::var("RPC_URL").unwrap_or_else(|_| "NOT SET (registry default)".to_string());
    println!("  RPC_URL: {}", shorten(&rpc));

    let has_key = env::var("PRIVATE_KEY").is_ok();

    println!("\n═══════════════════════════════════════════════════");
    println!("                   VALIDATION                       ");
    println!("═══════════════════════════════════════════════════\n");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Environment could not be parsed: {}", e);
            return;
        }
    };

    match config.validate() {
        Ok(()) => println!("  ✅ Configuration is valid"),
        Err(e) => println!("  ❌ {}", e),
    }

    match config.load_registry() {
        Ok(registry) => {
            println!("  ✅ Registry: {} networks", registry.networks.len());
            match registry.find(config.chain_id) {
                Some(network) => {
                    println!("  ✅ Chain {} is {} ({} tokens)", network.chain_id, network.name, network.tokens.len());
                    println!("     → Router:  {:?}", network.contracts.router);
                    println!("     → Factory: {:?}", network.contracts.factory);
                    println!("     → WETH:    {:?}", network.contracts.weth);
                }
                None => {
                    println!("  ❌ Chain {} is not in the registry", config.chain_id);
                    println!("     Supported: {}", registry
                        .networks
                        .iter()
                        .map(|n| format!("{} ({})", n.name, n.chain_id))
                        .collect::<Vec<_>>()
                        .join(", "));
                }
            }
        }
        Err(e) => println!("  ❌ Registry failed to load: {}", e),
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    if has_key {
        println!("  🚀 WALLET MODE");
        println!("     → Quotes, balances, approvals and swaps enabled");
        println!("     → Every transaction asks for confirmation unless --yes");
        println!("     → Your money: AT RISK on mainnet");
    } else {
        println!("  📋 READ-ONLY MODE");
        println!("     → Quotes only; set PRIVATE_KEY to sign transactions");
        println!("     → Your money: SAFE");
    }

    if let Some(warning) = config.default_slippage.warning() {
        println!("\n  ⚠️  DEFAULT_SLIPPAGE: {}", warning.message());
    }

    println!("\n✅ Diagnostic complete!\n");
}
