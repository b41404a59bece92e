//! AllSwap - command line swap client
//!
//! Run with: cargo run -- quote ETH USDC 1

use allswap::chain::{RpcChainReader, RpcChainWriter};
use allswap::config::Config;
use allswap::networks::{Network, NetworkRegistry};
use allswap::notify::{Notification, Notifier, Variant};
use allswap::quote::{ImpactLevel, Quote};
use allswap::session::WalletSession;
use allswap::slippage::{SlippageTolerance, SLIPPAGE_PRESETS};
use allswap::tokens::{format_amount, format_balance, Token};
use allswap::{SwapAction, SwapOrchestrator};
use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type RpcOrchestrator = SwapOrchestrator<RpcChainReader, RpcChainWriter>;

#[derive(Parser)]
#[command(name = "allswap", version, about = "Quote and execute swaps on Uniswap V2-style routers")]
struct Cli {
    /// TOML configuration file (environment variables otherwise)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Chain to use instead of the configured one
    #[arg(long, global = true)]
    chain: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured networks
    Networks,

    /// List the tokens of a network
    Tokens,

    /// Quote a trade without sending anything
    Quote {
        #[command(flatten)]
        trade: TradeArgs,

        /// Print the quote as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show wallet balances
    Balance {
        /// Token symbols or addresses (all network tokens if omitted)
        tokens: Vec<String>,
    },

    /// Quote, approve if needed, and execute a swap
    Swap {
        #[command(flatten)]
        trade: TradeArgs,

        /// Use the whole wallet balance of FROM
        #[arg(long, conflicts_with = "exact_out")]
        max: bool,

        /// Skip confirmation prompts
        #[arg(long, short)]
        yes: bool,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to this TOML file (private key excluded)
        #[arg(long)]
        save: Option<String>,
    },
}

#[derive(clap::Args)]
struct TradeArgs {
    /// Token to sell (symbol or address)
    from: String,

    /// Token to buy (symbol or address)
    to: String,

    /// Amount of FROM, or of TO with --exact-out
    amount: Option<String>,

    /// Treat AMOUNT as the exact output
    #[arg(long)]
    exact_out: bool,

    /// Slippage tolerance in percent
    #[arg(long)]
    slippage: Option<f64>,
}

// ============================================
// CONSOLE OUTPUT
// ============================================

/// Prints notifications as they are raised
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, n: Notification) {
        match n.variant {
            Variant::Default => println!("{} {}: {}", style("✓").green(), style(&n.title).bold(), n.description),
            Variant::Destructive => {
                eprintln!("{} {}: {}", style("✗").red(), style(&n.title).red().bold(), n.description)
            }
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", style("═══════════════════════════════════════════════════════════════").cyan());
    println!("{}", style(" 🔄 ALLSWAP - Uniswap V2 Swap Client").cyan().bold());
    println!("{}", style("═══════════════════════════════════════════════════════════════").cyan());
    println!();
}

fn print_quote(quote: &Quote, slippage: SlippageTolerance) {
    let from = quote.route.first().map(String::as_str).unwrap_or("?");
    let to = quote.route.last().map(String::as_str).unwrap_or("?");

    let impact = format!("{:.2}%", quote.price_impact);
    let impact = match quote.impact_level() {
        ImpactLevel::Low => style(impact).green(),
        ImpactLevel::Medium => style(impact).yellow(),
        ImpactLevel::High => style(impact).color256(208),
        ImpactLevel::Severe => style(impact).red().bold(),
    };

    println!("{}", style("═══ QUOTE ═══").blue().bold());
    println!("  You pay:          {} {}", format_balance(&quote.amount_in_formatted), from);
    println!("  You receive:      {} {}", format_balance(&quote.amount_out_formatted), to);
    println!("  Rate:             {}", quote.rate_display());
    println!("  Price impact:     {}", impact);
    println!("  Liquidity fee:    {} {}", format_balance(&quote.fee_formatted), from);
    println!("  Minimum received: {} {}", format_balance(&quote.minimum_received_formatted), to);
    println!("  Slippage:         {}", slippage);
    println!("  Route:            {}", quote.route.join(" → "));

    if quote.is_high_impact() {
        println!(
            "{} {}",
            style("⚠").red(),
            style("High price impact. You may receive significantly less than expected.").red()
        );
    }
    if let Some(warning) = slippage.warning() {
        println!("{} {}", style("⚠").yellow(), style(warning.message()).yellow());
    }
    println!();
}

/// Show a spinner while `fut` runs
async fn with_spinner<F: Future>(message: String, fut: F) -> F::Output {
    let spinner = ProgressBar::new_spinner();
    if let Ok(s) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(s);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    let output = fut.await;
    spinner.finish_and_clear();
    output
}

fn confirm(prompt: &str) -> Result<bool> {
    let term = Term::stdout();
    term.write_str(&format!("{} [y/N] ", prompt))?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

// ============================================
// SETUP
// ============================================

fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            dotenvy::dotenv().ok();
            let mut config = Config::from_file(path)?;
            // Keys never live in saved files
            config.private_key = std::env::var("PRIVATE_KEY").ok().filter(|s| !s.is_empty());
            config
        }
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn resolve_token(network: &Network, text: &str) -> Result<Token> {
    if let Some(token) = network.token_by_symbol(text) {
        return Ok(token.clone());
    }
    if let Ok(address) = text.parse::<Address>() {
        if let Some(token) = network.token_by_address(address) {
            return Ok(token.clone());
        }
    }
    let known: Vec<&str> = network.tokens.iter().map(|t| t.symbol.as_str()).collect();
    Err(eyre!("Unknown token '{}' on {} (known: {})", text, network.name, known.join(", ")))
}

fn build_orchestrator(config: &Config, registry: NetworkRegistry, chain_id: u64) -> Result<RpcOrchestrator> {
    let network = registry.require(chain_id)?;
    let rpc_url = config.rpc_url_for(network);
    debug!("Using {} via {}", network.name, rpc_url);

    let writer = RpcChainWriter::from_key(
        rpc_url.clone(),
        config.private_key.as_deref(),
        chain_id,
        config.receipt_poll_interval(),
    )?;
    let session = match writer.address() {
        Some(account) => WalletSession::connected(account, chain_id),
        None => WalletSession::read_only(chain_id),
    };

    Ok(SwapOrchestrator::new(
        Arc::new(RpcChainReader::new(rpc_url)),
        Arc::new(writer),
        registry,
        session,
        Arc::new(ConsoleNotifier),
    )
    .with_slippage(config.default_slippage)
    .with_live_quotes(config.live_router_quotes))
}

/// Select tokens and amount, then quote
async fn prepare_trade(swap: &mut RpcOrchestrator, trade: &TradeArgs) -> Result<Option<Quote>> {
    let network = swap.network()?.clone();
    let from = resolve_token(&network, &trade.from)?;
    let to = resolve_token(&network, &trade.to)?;

    if let Some(pct) = trade.slippage {
        if SLIPPAGE_PRESETS.contains(&pct) {
            swap.select_slippage_preset(pct)?;
        } else {
            swap.set_slippage(SlippageTolerance::from_percent(pct)?);
        }
    }
    swap.select_from_token(from)?;
    swap.select_to_token(to)?;

    let Some(amount) = trade.amount.as_deref() else {
        return Ok(None);
    };
    if trade.exact_out {
        swap.set_to_amount(amount)?;
    } else {
        swap.set_from_amount(amount)?;
    }

    let quote = with_spinner("Getting Quote...".to_string(), swap.refresh_quote()).await?;
    Ok(quote)
}

// ============================================
// COMMANDS
// ============================================

fn cmd_networks(registry: &NetworkRegistry, selected: u64) {
    println!("{}", style("═══ NETWORKS ═══").blue().bold());
    for network in &registry.networks {
        let marker = if network.chain_id == selected { style("●").green() } else { style("○").dim() };
        println!(
            "  {} {:<12} chain {:<10} router {:?}",
            marker, network.name, network.chain_id, network.contracts.router
        );
    }
}

fn cmd_tokens(network: &Network) {
    println!("{}", style(format!("═══ TOKENS ON {} ═══", network.name.to_uppercase())).blue().bold());
    for token in &network.tokens {
        let kind = if token.is_native { " (native)" } else { "" };
        println!(
            "  {:<8} {:<24} {:>2} decimals  {:?}{}",
            token.symbol, token.name, token.decimals, token.address, kind
        );
    }
}

async fn cmd_quote(mut swap: RpcOrchestrator, trade: TradeArgs, json: bool) -> Result<()> {
    let quote = prepare_trade(&mut swap, &trade)
        .await?
        .ok_or_else(|| eyre!("Nothing to quote: enter an amount greater than zero"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&quote)?);
    } else {
        print_quote(&quote, swap.slippage().value());
    }
    Ok(())
}

async fn cmd_balance(swap: RpcOrchestrator, symbols: Vec<String>) -> Result<()> {
    let network = swap.network()?.clone();
    let account = swap
        .session()
        .account()
        .ok_or_else(|| eyre!("Set PRIVATE_KEY to read wallet balances"))?;

    let tokens: Vec<Token> = if symbols.is_empty() {
        network.tokens.clone()
    } else {
        symbols.iter().map(|s| resolve_token(&network, s)).collect::<Result<_>>()?
    };

    let balances = with_spinner(
        "Loading balances...".to_string(),
        futures::future::join_all(tokens.iter().map(|t| swap.token_balance(t))),
    )
    .await;

    println!("{}", style(format!("═══ BALANCES OF {:?} ═══", account)).blue().bold());
    for (token, balance) in tokens.iter().zip(balances) {
        match balance {
            Ok(amount) => println!(
                "  {:<8} {}",
                token.symbol,
                format_balance(&format_amount(amount, token.decimals))
            ),
            Err(_) => println!("  {:<8} {}", token.symbol, style("unavailable").dim()),
        }
    }
    Ok(())
}

async fn cmd_swap(mut swap: RpcOrchestrator, trade: TradeArgs, max: bool, yes: bool) -> Result<()> {
    if swap.session().account().is_none() {
        return Err(eyre!("Set PRIVATE_KEY to sign swaps"));
    }

    let quote = if max {
        let trade = TradeArgs { amount: None, ..trade };
        prepare_trade(&mut swap, &trade).await?;
        with_spinner("Getting Quote...".to_string(), swap.use_max_amount()).await?
    } else {
        prepare_trade(&mut swap, &trade).await?
    };
    let quote = quote.ok_or_else(|| eyre!("Nothing to swap: enter an amount greater than zero"))?;
    print_quote(&quote, swap.slippage().value());

    swap.refresh_allowance().await?;

    if swap.action() == SwapAction::Approve {
        let token = swap.from_token().map(|t| t.symbol.clone()).unwrap_or_default();
        let prompt = format!("Approve {} {} for the router?", quote.amount_in_formatted, token);
        if !yes && !confirm(&prompt)? {
            println!("{}", style("Approval cancelled.").yellow());
            return Ok(());
        }
        let message = swap.action().to_string();
        let approval = with_spinner(format!("{} waiting for confirmation", message), swap.approve()).await?;
        debug!("Approval mined in block {:?}", approval.block_number);
    }

    match swap.action() {
        SwapAction::Swap => {}
        other => return Err(eyre!("Swap not available: {}", other)),
    }

    let prompt = format!(
        "Swap {} {} for at least {} {}?",
        quote.amount_in_formatted,
        quote.route.first().map(String::as_str).unwrap_or("?"),
        quote.minimum_received_formatted,
        quote.route.last().map(String::as_str).unwrap_or("?"),
    );
    if !yes && !confirm(&prompt)? {
        println!("{}", style("Swap cancelled.").yellow());
        return Ok(());
    }

    let explorer = swap.network()?.clone();
    let outcome = with_spinner("Swapping...".to_string(), swap.execute_swap()).await?;

    println!(
        "{} {} via {} (block {}, gas {})",
        style("✓").green(),
        outcome.summary,
        outcome.route,
        outcome.confirmed.block_number.map_or("?".to_string(), |b| b.to_string()),
        outcome.confirmed.gas_used
    );
    println!("  {}", style(explorer.explorer_tx_url(outcome.confirmed.tx_hash)).underlined());
    Ok(())
}

// ============================================
// MAIN
// ============================================

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("allswap=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(chain_id) = cli.chain {
        config.chain_id = chain_id;
    }
    let registry = config.load_registry()?;

    match cli.command {
        Command::Networks => cmd_networks(&registry, config.chain_id),
        Command::Tokens => cmd_tokens(registry.require(config.chain_id)?),
        Command::Config { save } => {
            config.print_summary(registry.require(config.chain_id)?);
            if let Some(path) = save {
                config.save_to_file(&path)?;
                println!("{} Saved to {}", style("✓").green(), path);
            }
        }
        Command::Quote { trade, json } => {
            let swap = build_orchestrator(&config, registry, config.chain_id)?;
            cmd_quote(swap, trade, json).await?;
        }
        Command::Balance { tokens } => {
            let swap = build_orchestrator(&config, registry, config.chain_id)?;
            cmd_balance(swap, tokens).await?;
        }
        Command::Swap { trade, max, yes } => {
            print_banner();
            let swap = build_orchestrator(&config, registry, config.chain_id)?;
            cmd_swap(swap, trade, max, yes).await?;
        }
    }

    Ok(())
}
