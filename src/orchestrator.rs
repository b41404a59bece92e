//! The Swap Orchestrator
//!
//! Owns the swap form state and sequences every chain interaction:
//! - Quote: factory `getPair` → pair reserves → local (or router) math
//! - Approval: exact-amount ERC-20 approval when the allowance is short
//! - Execution: one of three router entry points, with deadline and
//!   slippage-adjusted minimum output
//!
//! Inputs are plain named operations. Nothing recomputes implicitly: the
//! caller edits a field and then asks for a quote.
//!
//! Quotes are split into `begin_quote` → `QuoteRequest::fetch` →
//! `apply_quote` so that requests can be driven concurrently by the
//! caller. Each request carries a sequence number and only the most
//! recently issued one is ever applied.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use eyre::Result as EyreResult;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::{ChainReader, ChainWriter, ConfirmedTx, SwapCall};
use crate::error::SwapError;
use crate::networks::{Contracts, Network, NetworkRegistry};
use crate::notify::{Notification, Notifier};
use crate::quote::{assemble_quote, compute_quote, Quote, ReservePair, TradeDirection};
use crate::session::WalletSession;
use crate::slippage::{SlippageSetting, SlippageTolerance};
use crate::tokens::{format_balance, is_amount_text, Token};

/// Seconds between submission and the router deadline
pub const SWAP_DEADLINE_SECS: i64 = 20 * 60;

// ============================================
// PUBLIC TYPES
// ============================================

/// Which amount field the user typed into last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    From,
    To,
}

impl Side {
    fn flip(self) -> Self {
        match self {
            Side::From => Side::To,
            Side::To => Side::From,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Quoting,
    Approving,
    Swapping,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Quoting => write!(f, "Getting Quote..."),
            Activity::Approving => write!(f, "Approving..."),
            Activity::Swapping => write!(f, "Swapping..."),
        }
    }
}

/// What the primary action does right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapAction {
    ConnectWallet,
    /// Name of the network a switch would move to
    SwitchNetwork(String),
    SelectTokens,
    EnterAmount,
    Approve,
    Swap,
    Busy(Activity),
}

impl fmt::Display for SwapAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapAction::ConnectWallet => write!(f, "Connect Wallet"),
            SwapAction::SwitchNetwork(name) => write!(f, "Switch to {}", name),
            SwapAction::SelectTokens => write!(f, "Select Tokens"),
            SwapAction::EnterAmount => write!(f, "Enter Amount"),
            SwapAction::Approve => write!(f, "Approve"),
            SwapAction::Swap => write!(f, "Swap"),
            SwapAction::Busy(activity) => write!(f, "{}", activity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    Idle,
    Quoting,
    AwaitingApproval,
    Approving,
    Ready,
    Executing,
}

/// Router entry point selected by which side is the native currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapRoute {
    EthForTokens,
    TokensForEth,
    TokensForTokens,
}

impl fmt::Display for SwapRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapRoute::EthForTokens => write!(f, "swapExactETHForTokens"),
            SwapRoute::TokensForEth => write!(f, "swapExactTokensForETH"),
            SwapRoute::TokensForTokens => write!(f, "swapExactTokensForTokens"),
        }
    }
}

/// A confirmed swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    pub route: SwapRoute,
    pub call: SwapCall,
    pub confirmed: ConfirmedTx,
    pub summary: String,
}

// ============================================
// IN-FLIGHT TRACKING
// ============================================

/// Marks an operation as in flight until dropped. Dropping also happens
/// when the owning future is cancelled, so a marker can never outlive its
/// operation. The slot is only cleared if it still holds this guard's
/// token, so a superseded request cannot clear a newer one.
#[derive(Debug)]
struct FlightGuard {
    slot: Arc<AtomicU64>,
    token: u64,
}

impl FlightGuard {
    fn begin(slot: &Arc<AtomicU64>, token: u64) -> Self {
        slot.store(token, Ordering::SeqCst);
        Self { slot: Arc::clone(slot), token }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let _ = self.slot.compare_exchange(self.token, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

// ============================================
// QUOTE REQUESTS
// ============================================

/// Snapshot of the inputs a quote is computed from
#[derive(Debug)]
pub struct QuoteRequest {
    seq: u64,
    from: Token,
    to: Token,
    direction: TradeDirection,
    amount: U256,
    contracts: Contracts,
    slippage: SlippageTolerance,
    live: bool,
    guard: FlightGuard,
}

/// A resolved request, ready for `SwapOrchestrator::apply_quote`
#[derive(Debug)]
pub struct QuoteOutcome {
    seq: u64,
    result: Result<Quote, SwapError>,
    guard: FlightGuard,
}

impl QuoteOutcome {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn result(&self) -> &Result<Quote, SwapError> {
        &self.result
    }
}

impl QuoteRequest {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn direction(&self) -> TradeDirection {
        self.direction
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// Read the pair and compute the quote. Never touches orchestrator state.
    pub async fn fetch<R: ChainReader + ?Sized>(self, reader: &R) -> QuoteOutcome {
        let result = self.resolve(reader).await;
        QuoteOutcome { seq: self.seq, result, guard: self.guard }
    }

    fn no_liquidity(&self) -> SwapError {
        SwapError::NoLiquidity { from: self.from.symbol.clone(), to: self.to.symbol.clone() }
    }

    async fn resolve<R: ChainReader + ?Sized>(&self, reader: &R) -> Result<Quote, SwapError> {
        let c = self.contracts;
        let from_address = self.from.route_address(c.weth);
        let to_address = self.to.route_address(c.weth);

        let pair = reader
            .get_pair(c.factory, from_address, to_address)
            .await
            .map_err(quote_failed)?
            .ok_or_else(|| self.no_liquidity())?;

        let raw = reader.get_reserves(pair).await.map_err(quote_failed)?;
        let reserves = ReservePair::from_pair(raw.reserve0, raw.reserve1, raw.token0, from_address);
        if !reserves.has_liquidity() {
            return Err(self.no_liquidity());
        }

        debug!(
            "Quote #{} {}: reserves {} {} / {} {}",
            self.seq, self.direction, reserves.reserve_from, self.from, reserves.reserve_to, self.to
        );

        let quote = if self.live {
            let (amount_in, amount_out) = match self.direction {
                TradeDirection::ExactIn => {
                    let out = reader
                        .get_amount_out(c.router, self.amount, reserves.reserve_from, reserves.reserve_to)
                        .await
                        .map_err(quote_failed)?;
                    (self.amount, out)
                }
                TradeDirection::ExactOut => {
                    let input = reader
                        .get_amount_in(c.router, self.amount, reserves.reserve_from, reserves.reserve_to)
                        .await
                        .map_err(quote_failed)?;
                    (input, self.amount)
                }
            };
            assemble_quote(reserves, amount_in, amount_out, self.direction, &self.from, &self.to, self.slippage)
        } else {
            compute_quote(reserves, self.amount, self.direction, &self.from, &self.to, self.slippage)
        };

        quote.map_err(|e| SwapError::QuoteFailed(e.to_string()))
    }
}

fn quote_failed(e: eyre::Report) -> SwapError {
    SwapError::QuoteFailed(e.to_string())
}

/// `now + SWAP_DEADLINE_SECS` as a unix timestamp
pub fn swap_deadline(now: DateTime<Utc>) -> U256 {
    U256::from((now.timestamp() + SWAP_DEADLINE_SECS).max(0) as u64)
}

// ============================================
// ORCHESTRATOR
// ============================================

struct SwapPlan {
    route: SwapRoute,
    call: SwapCall,
    summary: String,
}

pub struct SwapOrchestrator<R, W> {
    reader: Arc<R>,
    writer: Arc<W>,
    registry: NetworkRegistry,
    session: WalletSession,
    notifier: Arc<dyn Notifier>,
    slippage: SlippageSetting,
    live_quotes: bool,

    from_token: Option<Token>,
    to_token: Option<Token>,
    from_amount: String,
    to_amount: String,
    driving: Side,
    quote: Option<Quote>,
    allowance: U256,

    seq: u64,
    quoting: Arc<AtomicU64>,
    approving: Arc<AtomicU64>,
    executing: Arc<AtomicU64>,
}

impl<R: ChainReader, W: ChainWriter> SwapOrchestrator<R, W> {
    pub fn new(
        reader: Arc<R>,
        writer: Arc<W>,
        registry: NetworkRegistry,
        session: WalletSession,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            reader,
            writer,
            registry,
            session,
            notifier,
            slippage: SlippageSetting::default(),
            live_quotes: false,
            from_token: None,
            to_token: None,
            from_amount: String::new(),
            to_amount: String::new(),
            driving: Side::From,
            quote: None,
            allowance: U256::ZERO,
            seq: 0,
            quoting: Arc::new(AtomicU64::new(0)),
            approving: Arc::new(AtomicU64::new(0)),
            executing: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_slippage(mut self, slippage: SlippageTolerance) -> Self {
        self.slippage = SlippageSetting::new(slippage);
        self
    }

    /// Ask the router for amounts instead of computing them locally
    pub fn with_live_quotes(mut self, live: bool) -> Self {
        self.live_quotes = live;
        self
    }

    // ---- accessors ----

    pub fn from_token(&self) -> Option<&Token> {
        self.from_token.as_ref()
    }

    pub fn to_token(&self) -> Option<&Token> {
        self.to_token.as_ref()
    }

    pub fn from_amount(&self) -> &str {
        &self.from_amount
    }

    pub fn to_amount(&self) -> &str {
        &self.to_amount
    }

    pub fn driving(&self) -> Side {
        self.driving
    }

    pub fn quote(&self) -> Option<&Quote> {
        self.quote.as_ref()
    }

    pub fn allowance(&self) -> U256 {
        self.allowance
    }

    pub fn slippage(&self) -> &SlippageSetting {
        &self.slippage
    }

    pub fn session(&self) -> &WalletSession {
        &self.session
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// The configured network the session is on
    pub fn network(&self) -> Result<&Network, SwapError> {
        match self.session.chain_id() {
            Some(chain_id) => self.registry.require(chain_id),
            None => Err(SwapError::WalletNotConnected),
        }
    }

    pub fn is_quoting(&self) -> bool {
        self.quoting.load(Ordering::SeqCst) != 0
    }

    pub fn is_approving(&self) -> bool {
        self.approving.load(Ordering::SeqCst) != 0
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst) != 0
    }

    fn report(&self, e: SwapError) -> SwapError {
        warn!("{}", e);
        self.notifier.notify(e.notification());
        e
    }

    /// Drop the held quote and orphan any outstanding request
    fn invalidate(&mut self) {
        self.seq += 1;
        self.quoting.store(0, Ordering::SeqCst);
        self.quote = None;
    }

    fn reset_selection(&mut self) {
        self.from_token = None;
        self.to_token = None;
        self.from_amount.clear();
        self.to_amount.clear();
        self.allowance = U256::ZERO;
        self.invalidate();
    }

    // ============================================
    // SESSION
    // ============================================

    pub fn connect(&mut self, account: Address, chain_id: u64) {
        let (previous_chain, previous_account) = (self.session.chain_id(), self.session.account());
        self.session.connect(account, chain_id, &self.registry, self.notifier.as_ref());
        if previous_chain != Some(chain_id) {
            self.reset_selection();
        } else if previous_account != Some(account) {
            // The allowance mirror belonged to the previous owner
            self.allowance = U256::ZERO;
        }
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect(self.notifier.as_ref());
        self.allowance = U256::ZERO;
    }

    /// Move to `target`, or the first configured network. Token selection
    /// belongs to a network, so it is cleared when the chain changes.
    pub fn switch_network(&mut self, target: Option<u64>) -> Result<u64, SwapError> {
        let previous = self.session.chain_id();
        let chain_id = self
            .session
            .switch_network(&self.registry, target, self.notifier.as_ref())?
            .chain_id;
        if previous != Some(chain_id) {
            self.reset_selection();
        }
        Ok(chain_id)
    }

    // ============================================
    // INPUTS
    // ============================================

    /// Select the token to sell. Call `refresh_allowance` afterwards.
    pub fn select_from_token(&mut self, token: Token) -> Result<(), SwapError> {
        if self.to_token.as_ref().is_some_and(|t| t.address == token.address) {
            return Err(self.report(SwapError::SameToken(token.symbol)));
        }
        debug!("From token: {}", token);
        self.from_token = Some(token);
        self.allowance = U256::ZERO;
        self.from_amount.clear();
        self.to_amount.clear();
        self.invalidate();
        Ok(())
    }

    pub fn select_to_token(&mut self, token: Token) -> Result<(), SwapError> {
        if self.from_token.as_ref().is_some_and(|t| t.address == token.address) {
            return Err(self.report(SwapError::SameToken(token.symbol)));
        }
        debug!("To token: {}", token);
        self.to_token = Some(token);
        self.from_amount.clear();
        self.to_amount.clear();
        self.invalidate();
        Ok(())
    }

    pub fn set_from_amount(&mut self, text: &str) -> Result<(), SwapError> {
        self.set_amount(Side::From, text)
    }

    pub fn set_to_amount(&mut self, text: &str) -> Result<(), SwapError> {
        self.set_amount(Side::To, text)
    }

    fn set_amount(&mut self, side: Side, text: &str) -> Result<(), SwapError> {
        if !is_amount_text(text) {
            return Err(self.report(SwapError::InvalidAmount(text.to_string())));
        }
        let token = match side {
            Side::From => self.from_token.as_ref(),
            Side::To => self.to_token.as_ref(),
        };
        let parsed = match token.map(|t| t.parse_amount(text)).transpose() {
            Ok(parsed) => parsed.flatten(),
            Err(e) => return Err(self.report(e.into())),
        };

        let (edited, other) = match side {
            Side::From => (&mut self.from_amount, &mut self.to_amount),
            Side::To => (&mut self.to_amount, &mut self.from_amount),
        };
        *edited = text.to_string();
        // Nothing to quote means nothing to derive
        if parsed.map_or(true, |amount| amount.is_zero()) {
            other.clear();
        }
        self.driving = side;
        self.invalidate();
        Ok(())
    }

    /// Swap sides exactly: tokens, both amount fields and the driving side
    pub fn switch_tokens(&mut self) {
        std::mem::swap(&mut self.from_token, &mut self.to_token);
        std::mem::swap(&mut self.from_amount, &mut self.to_amount);
        self.driving = self.driving.flip();
        self.allowance = U256::ZERO;
        self.invalidate();
    }

    pub fn set_slippage(&mut self, value: SlippageTolerance) {
        self.slippage = SlippageSetting::new(value);
        self.rederive_minimum();
    }

    pub fn select_auto_slippage(&mut self) -> SlippageTolerance {
        let value = self.slippage.select_auto();
        self.rederive_minimum();
        value
    }

    pub fn select_slippage_preset(&mut self, pct: f64) -> Result<SlippageTolerance, SwapError> {
        match self.slippage.select_preset(pct) {
            Ok(value) => {
                self.rederive_minimum();
                Ok(value)
            }
            Err(e) => Err(self.report(e.into())),
        }
    }

    pub fn set_custom_slippage(&mut self, text: &str) -> Result<SlippageTolerance, SwapError> {
        match self.slippage.set_custom(text) {
            Ok(value) => {
                self.rederive_minimum();
                Ok(value)
            }
            Err(e) => Err(self.report(e.into())),
        }
    }

    fn rederive_minimum(&mut self) {
        let slippage = self.slippage.value();
        self.quote = self.quote.as_ref().map(|q| q.with_slippage(slippage));
    }

    // ============================================
    // QUOTING
    // ============================================

    /// Snapshot the inputs into a request. `None` when there is nothing
    /// to quote: a token is missing, the driving amount is empty or zero,
    /// or the session is on no configured network. An amount the token
    /// cannot represent is reported before returning `None`.
    pub fn begin_quote(&mut self) -> Option<QuoteRequest> {
        let from = self.from_token.clone()?;
        let to = self.to_token.clone()?;
        let contracts = self.network().ok()?.contracts;

        let (direction, parsed) = match self.driving {
            Side::From => (TradeDirection::ExactIn, from.parse_amount(&self.from_amount)),
            Side::To => (TradeDirection::ExactOut, to.parse_amount(&self.to_amount)),
        };
        let amount = match parsed {
            Ok(Some(amount)) if !amount.is_zero() => amount,
            Ok(_) => return None,
            Err(e) => {
                self.report(e.into());
                return None;
            }
        };

        self.seq += 1;
        let guard = FlightGuard::begin(&self.quoting, self.seq);
        debug!("Quote #{} {} {} {} → {}", self.seq, direction, amount, from, to);

        Some(QuoteRequest {
            seq: self.seq,
            from,
            to,
            direction,
            amount,
            contracts,
            slippage: self.slippage.value(),
            live: self.live_quotes,
            guard,
        })
    }

    /// Apply a resolved request. `Ok(false)` means it was superseded and
    /// discarded without touching any state.
    pub fn apply_quote(&mut self, outcome: QuoteOutcome) -> Result<bool, SwapError> {
        if outcome.seq != self.seq {
            debug!("Discarding stale quote #{} (latest #{})", outcome.seq, self.seq);
            return Ok(false);
        }

        let QuoteOutcome { result, guard, .. } = outcome;
        drop(guard);

        match result {
            Ok(quote) => {
                let quote = quote.with_slippage(self.slippage.value());
                match quote.direction {
                    TradeDirection::ExactIn => self.to_amount = quote.amount_out_formatted.clone(),
                    TradeDirection::ExactOut => self.from_amount = quote.amount_in_formatted.clone(),
                }
                info!(
                    "Quote: {} → {} (impact {:.2}%, min {})",
                    quote.amount_in_formatted,
                    quote.amount_out_formatted,
                    quote.price_impact,
                    quote.minimum_received_formatted
                );
                self.quote = Some(quote);
                Ok(true)
            }
            Err(e) => {
                match (&e, self.driving) {
                    (SwapError::NoLiquidity { .. }, _) => {
                        self.from_amount.clear();
                        self.to_amount.clear();
                    }
                    (_, Side::From) => self.to_amount.clear(),
                    (_, Side::To) => self.from_amount.clear(),
                }
                self.quote = None;
                Err(self.report(e))
            }
        }
    }

    /// `begin_quote` → `fetch` → `apply_quote` in one call
    pub async fn refresh_quote(&mut self) -> Result<Option<Quote>, SwapError> {
        let Some(request) = self.begin_quote() else {
            return Ok(None);
        };
        let outcome = request.fetch(self.reader.as_ref()).await;
        self.apply_quote(outcome)?;
        Ok(self.quote.clone())
    }

    // ============================================
    // ALLOWANCE
    // ============================================

    /// Re-read `allowance(owner, router)` for the from token.
    /// A no-op for native currency or without a wallet.
    pub async fn refresh_allowance(&mut self) -> Result<U256, SwapError> {
        let target = match (&self.from_token, self.session.account(), self.network()) {
            (Some(token), Some(owner), Ok(network)) if !token.is_native => {
                Some((token.address, owner, network.contracts.router))
            }
            _ => None,
        };
        let Some((token, owner, router)) = target else {
            return Ok(self.allowance);
        };

        match self.reader.allowance(token, owner, router).await {
            Ok(allowance) => {
                debug!("Allowance of {:?} for router: {}", token, allowance);
                self.allowance = allowance;
                Ok(allowance)
            }
            Err(e) => Err(self.report(SwapError::AllowanceCheckFailed(e.to_string()))),
        }
    }

    /// Input amount the next approval or swap would use
    fn amount_in(&self) -> Option<U256> {
        if let Some(quote) = &self.quote {
            return Some(quote.amount_in);
        }
        self.from_token.as_ref()?.parse_amount(&self.from_amount).ok().flatten()
    }

    pub fn needs_approval(&self) -> bool {
        match (&self.from_token, self.from_amount.is_empty()) {
            (Some(token), false) if !token.is_native => {
                let amount = token.parse_amount(&self.from_amount).ok().flatten();
                amount.is_some_and(|amount| self.allowance < amount)
            }
            _ => false,
        }
    }

    // ============================================
    // STATUS
    // ============================================

    pub fn action(&self) -> SwapAction {
        if self.is_approving() {
            return SwapAction::Busy(Activity::Approving);
        }
        if self.is_quoting() {
            return SwapAction::Busy(Activity::Quoting);
        }
        if self.is_executing() {
            return SwapAction::Busy(Activity::Swapping);
        }
        if !self.session.is_connected() {
            return SwapAction::ConnectWallet;
        }
        if !self.session.is_supported(&self.registry) {
            return SwapAction::SwitchNetwork(self.registry.default_network().name.clone());
        }
        if self.from_token.is_none() || self.to_token.is_none() {
            return SwapAction::SelectTokens;
        }
        // Approve and Swap both act on a held quote
        if self.from_amount.is_empty() || self.to_amount.is_empty() || self.quote.is_none() {
            return SwapAction::EnterAmount;
        }
        if self.needs_approval() {
            return SwapAction::Approve;
        }
        SwapAction::Swap
    }

    pub fn state(&self) -> SwapState {
        if self.is_executing() {
            SwapState::Executing
        } else if self.is_approving() {
            SwapState::Approving
        } else if self.is_quoting() {
            SwapState::Quoting
        } else if self.quote.is_none() {
            SwapState::Idle
        } else if self.needs_approval() {
            SwapState::AwaitingApproval
        } else {
            SwapState::Ready
        }
    }

    fn ensure_not_busy(&self) -> Result<(), SwapError> {
        if self.is_quoting() {
            Err(SwapError::Busy("quote"))
        } else if self.is_approving() {
            Err(SwapError::Busy("approval"))
        } else if self.is_executing() {
            Err(SwapError::Busy("swap"))
        } else {
            Ok(())
        }
    }

    // ============================================
    // APPROVAL
    // ============================================

    fn prepare_approval(&self) -> Result<(Token, Address, U256), SwapError> {
        self.ensure_not_busy()?;
        if !self.session.is_connected() {
            return Err(SwapError::WalletNotConnected);
        }
        let router = self.network()?.contracts.router;
        let token = match &self.from_token {
            Some(token) if !token.is_native => token.clone(),
            Some(_) => return Err(SwapError::NotReady("native currency needs no approval")),
            None => return Err(SwapError::NotReady("select a token to sell")),
        };
        let amount = self.amount_in().ok_or(SwapError::NotReady("enter an amount"))?;
        if self.allowance >= amount {
            return Err(SwapError::NotReady("allowance already sufficient"));
        }
        Ok((token, router, amount))
    }

    /// Approve exactly the input amount for the router, wait for the
    /// receipt, then re-read the allowance.
    pub async fn approve(&mut self) -> Result<ConfirmedTx, SwapError> {
        let (token, router, amount) = self.prepare_approval().map_err(|e| self.report(e))?;

        let result: EyreResult<ConfirmedTx> = {
            let _flight = FlightGuard::begin(&self.approving, 1);
            info!("Approving {} {} for {:?}", token.format_amount(amount), token, router);
            match self.writer.approve(token.address, router, amount).await {
                Ok(tx) => self.writer.confirm(tx).await,
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(confirmed) => {
                info!("✓ Approval confirmed: {:?}", confirmed.tx_hash);
                self.notifier.notify(Notification::info("Approval successful", "Token approved for swapping"));
                // A failed re-read is reported on its own; the approval itself stands
                let _ = self.refresh_allowance().await;
                Ok(confirmed)
            }
            Err(e) => Err(self.report(SwapError::ApprovalFailed(e.to_string()))),
        }
    }

    // ============================================
    // EXECUTION
    // ============================================

    fn prepare_swap(&self, now: DateTime<Utc>) -> Result<SwapPlan, SwapError> {
        self.ensure_not_busy()?;
        let owner = self.session.account().ok_or(SwapError::WalletNotConnected)?;
        let contracts = self.network()?.contracts;
        let (from, to) = match (&self.from_token, &self.to_token) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(SwapError::NotReady("select both tokens")),
        };
        if self.from_amount.is_empty() || self.to_amount.is_empty() {
            return Err(SwapError::NotReady("enter an amount"));
        }
        let quote = self.quote.as_ref().ok_or(SwapError::NotReady("no quote for the current amounts"))?;
        if self.needs_approval() {
            return Err(SwapError::NotReady("token approval required"));
        }

        let (route, path) = if from.is_native {
            (SwapRoute::EthForTokens, vec![contracts.weth, to.address])
        } else if to.is_native {
            (SwapRoute::TokensForEth, vec![from.address, contracts.weth])
        } else {
            (SwapRoute::TokensForTokens, vec![from.address, to.address])
        };

        let call = SwapCall {
            router: contracts.router,
            amount_in: quote.amount_in,
            amount_out_min: self.slippage.value().minimum_received(quote.amount_out),
            path,
            to: owner,
            deadline: swap_deadline(now),
        };
        let summary = format!(
            "Swapped {} {} for {} {}",
            format_balance(&self.from_amount),
            from.symbol,
            format_balance(&quote.amount_out_formatted),
            to.symbol
        );

        Ok(SwapPlan { route, call, summary })
    }

    /// Submit the swap for the held quote and wait for the receipt.
    /// On success the amounts and quote are cleared; on failure they stay.
    pub async fn execute_swap(&mut self) -> Result<SwapOutcome, SwapError> {
        let plan = self.prepare_swap(Utc::now()).map_err(|e| self.report(e))?;

        let result: EyreResult<ConfirmedTx> = {
            let _flight = FlightGuard::begin(&self.executing, 1);
            info!(
                "{}: in {} min out {} path {:?}",
                plan.route, plan.call.amount_in, plan.call.amount_out_min, plan.call.path
            );
            let submitted = match plan.route {
                SwapRoute::EthForTokens => self.writer.swap_exact_eth_for_tokens(&plan.call).await,
                SwapRoute::TokensForEth => self.writer.swap_exact_tokens_for_eth(&plan.call).await,
                SwapRoute::TokensForTokens => self.writer.swap_exact_tokens_for_tokens(&plan.call).await,
            };
            match submitted {
                Ok(tx) => self.writer.confirm(tx).await,
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(confirmed) => {
                info!("✓ Swap confirmed: {:?}", confirmed.tx_hash);
                self.notifier.notify(Notification::info("Swap successful", plan.summary.clone()));
                self.from_amount.clear();
                self.to_amount.clear();
                self.invalidate();
                Ok(SwapOutcome { route: plan.route, call: plan.call, confirmed, summary: plan.summary })
            }
            Err(e) => Err(self.report(SwapError::SwapFailed(e.to_string()))),
        }
    }

    // ============================================
    // BALANCES
    // ============================================

    pub async fn token_balance(&self, token: &Token) -> Result<U256, SwapError> {
        let owner = self
            .session
            .account()
            .ok_or(SwapError::WalletNotConnected)
            .map_err(|e| self.report(e))?;

        let balance = if token.is_native {
            self.reader.native_balance(owner).await
        } else {
            self.reader.balance_of(token.address, owner).await
        };
        balance.map_err(|e| self.report(SwapError::BalanceFailed(e.to_string())))
    }

    /// Fill the from amount with the whole wallet balance and quote it
    pub async fn use_max_amount(&mut self) -> Result<Option<Quote>, SwapError> {
        let token = self
            .from_token
            .clone()
            .ok_or(SwapError::NotReady("select a token to sell"))
            .map_err(|e| self.report(e))?;
        let balance = self.token_balance(&token).await?;
        self.set_from_amount(&token.format_amount(balance))?;
        self.refresh_quote().await
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, WriteCall};
    use crate::notify::RecordingNotifier;
    use crate::quote::get_amount_out;
    use crate::slippage::SlippageError;
    use crate::tokens::AmountError;
    use alloy_primitives::address;
    use tokio_test::{assert_err, assert_ok};

    const OWNER: Address = address!("1111111111111111111111111111111111111111");
    const OTHER: Address = address!("3333333333333333333333333333333333333333");
    const WETH_USDC: Address = address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc");
    const DAI_USDC: Address = address!("AE461cA67B15dc8dc81CE7615e0320dA1A9aB8D5");

    const USDC_RESERVE: u128 = 2_000_000_000_000; // 2M USDC
    const WETH_RESERVE: u128 = 1_000_000_000_000_000_000_000; // 1000 WETH

    type TestOrchestrator = SwapOrchestrator<MockChain, MockChain>;

    struct Fixture {
        swap: TestOrchestrator,
        chain: Arc<MockChain>,
        sink: Arc<RecordingNotifier>,
        network: Network,
    }

    impl Fixture {
        fn token(&self, symbol: &str) -> Token {
            self.network.token_by_symbol(symbol).unwrap().clone()
        }
    }

    fn fixture() -> Fixture {
        let registry = NetworkRegistry::builtin().unwrap();
        let network = registry.find(1).unwrap().clone();
        let usdc = network.token_by_symbol("USDC").unwrap().address;

        let chain = Arc::new(MockChain::new(OWNER));
        // USDC sorts below WETH, so it is token0
        chain.add_pair(WETH_USDC, usdc, network.contracts.weth, USDC_RESERVE, WETH_RESERVE);

        let sink = Arc::new(RecordingNotifier::new());
        let swap = SwapOrchestrator::new(
            chain.clone(),
            chain.clone(),
            registry,
            WalletSession::connected(OWNER, 1),
            sink.clone(),
        );
        Fixture { swap, chain, sink, network }
    }

    fn select(f: &mut Fixture, from: &str, to: &str) {
        let (from, to) = (f.token(from), f.token(to));
        f.swap.select_from_token(from).unwrap();
        f.swap.select_to_token(to).unwrap();
    }

    #[tokio::test]
    async fn test_exact_in_quote_fills_to_amount() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();

        let quote = assert_ok!(f.swap.refresh_quote().await).unwrap();

        let expected = get_amount_out(
            U256::from(10u128.pow(18)),
            U256::from(WETH_RESERVE),
            U256::from(USDC_RESERVE),
        )
        .unwrap();
        assert_eq!(quote.amount_out, expected);
        assert_eq!(quote.direction, TradeDirection::ExactIn);
        assert_eq!(f.swap.to_amount(), quote.amount_out_formatted);
        assert_eq!(quote.route, vec!["ETH".to_string(), "USDC".to_string()]);
        assert!(!f.swap.is_quoting());
        assert_eq!(f.swap.state(), SwapState::Ready);
        // Native input needs no approval
        assert_eq!(f.swap.action(), SwapAction::Swap);
    }

    #[tokio::test]
    async fn test_exact_out_quote_fills_from_amount() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_to_amount("1000").unwrap();

        let quote = assert_ok!(f.swap.refresh_quote().await).unwrap();

        assert_eq!(quote.direction, TradeDirection::ExactOut);
        assert_eq!(quote.amount_out, U256::from(1_000_000_000u64));
        assert_eq!(f.swap.from_amount(), quote.amount_in_formatted);
        assert_eq!(f.swap.driving(), Side::To);
    }

    #[tokio::test]
    async fn test_no_pair_clears_both_amounts() {
        let mut f = fixture();
        select(&mut f, "DAI", "USDC");
        f.swap.set_from_amount("5").unwrap();

        let err = assert_err!(f.swap.refresh_quote().await);

        assert_eq!(err, SwapError::NoLiquidity { from: "DAI".into(), to: "USDC".into() });
        assert_eq!(f.swap.from_amount(), "");
        assert_eq!(f.swap.to_amount(), "");
        assert!(f.swap.quote().is_none());
        assert_eq!(f.swap.state(), SwapState::Idle);
        let n = f.sink.all();
        assert_eq!(n.len(), 1);
        assert_eq!(n[0].description, "No liquidity pool exists for DAI/USDC");
    }

    #[tokio::test]
    async fn test_read_failure_clears_derived_amount_only() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();
        f.chain.fail_reads(true);

        let err = assert_err!(f.swap.refresh_quote().await);

        assert!(matches!(err, SwapError::QuoteFailed(_)));
        assert_eq!(f.swap.from_amount(), "1");
        assert_eq!(f.swap.to_amount(), "");
        assert!(!f.swap.is_quoting());
        assert_eq!(f.sink.titles(), vec!["Error getting quote"]);

        // Retryable: the same input quotes once the chain recovers
        f.chain.fail_reads(false);
        assert!(assert_ok!(f.swap.refresh_quote().await).is_some());
    }

    #[tokio::test]
    async fn test_out_of_order_responses_apply_latest_only() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");

        f.swap.set_from_amount("1").unwrap();
        let first = f.swap.begin_quote().unwrap();
        f.swap.set_from_amount("2").unwrap();
        let second = f.swap.begin_quote().unwrap();
        assert!(second.seq() > first.seq());
        assert!(f.swap.is_quoting());

        // The second request resolves first
        let late = second.fetch(f.chain.as_ref()).await;
        let early = first.fetch(f.chain.as_ref()).await;

        assert!(assert_ok!(f.swap.apply_quote(late)));
        assert!(!assert_ok!(f.swap.apply_quote(early)));

        let quote = f.swap.quote().unwrap();
        assert_eq!(quote.amount_in, U256::from(2 * 10u128.pow(18)));
        assert_eq!(f.swap.to_amount(), quote.amount_out_formatted);
        assert!(!f.swap.is_quoting());
    }

    #[tokio::test]
    async fn test_response_after_input_change_is_ignored() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();

        let request = f.swap.begin_quote().unwrap();
        f.swap.set_from_amount("").unwrap();
        assert!(!f.swap.is_quoting());

        let outcome = request.fetch(f.chain.as_ref()).await;
        assert!(!assert_ok!(f.swap.apply_quote(outcome)));
        assert_eq!(f.swap.to_amount(), "");
        assert!(f.swap.quote().is_none());
    }

    #[test]
    fn test_dropped_request_clears_quoting() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();

        let request = f.swap.begin_quote().unwrap();
        assert_eq!(f.swap.action(), SwapAction::Busy(Activity::Quoting));
        drop(request);
        assert!(!f.swap.is_quoting());
    }

    #[test]
    fn test_nothing_to_quote() {
        let mut f = fixture();
        assert!(f.swap.begin_quote().is_none());

        select(&mut f, "ETH", "USDC");
        assert!(f.swap.begin_quote().is_none());

        f.swap.set_from_amount("0").unwrap();
        assert!(f.swap.begin_quote().is_none());
        f.swap.set_from_amount(".").unwrap();
        assert!(f.swap.begin_quote().is_none());
        assert!(!f.swap.is_quoting());
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let mut f = fixture();
        let usdc = f.token("USDC");
        select(&mut f, "USDC", "ETH");
        f.swap.set_from_amount("100").unwrap();
        assert_ok!(f.swap.refresh_quote().await);
        assert_eq!(assert_ok!(f.swap.refresh_allowance().await), U256::ZERO);

        assert!(f.swap.needs_approval());
        assert_eq!(f.swap.action(), SwapAction::Approve);
        assert_eq!(f.swap.state(), SwapState::AwaitingApproval);

        assert_ok!(f.swap.approve().await);

        assert_eq!(
            f.chain.calls(),
            vec![WriteCall::Approve {
                token: usdc.address,
                spender: f.network.contracts.router,
                amount: U256::from(100_000_000u64),
            }]
        );
        assert_eq!(f.swap.allowance(), U256::from(100_000_000u64));
        assert_eq!(f.swap.action(), SwapAction::Swap);
        assert_eq!(f.swap.state(), SwapState::Ready);
        assert_eq!(f.sink.titles(), vec!["Approval successful"]);
    }

    #[tokio::test]
    async fn test_failed_approval_clears_flag() {
        let mut f = fixture();
        select(&mut f, "USDC", "ETH");
        f.swap.set_from_amount("100").unwrap();
        assert_ok!(f.swap.refresh_quote().await);

        f.chain.fail_approve(true);
        let err = assert_err!(f.swap.approve().await);
        assert!(matches!(err, SwapError::ApprovalFailed(_)));
        assert!(!f.swap.is_approving());
        assert_eq!(f.swap.state(), SwapState::AwaitingApproval);

        // A reverted approval leaves the allowance untouched
        f.chain.fail_approve(false);
        f.chain.revert_next();
        assert_err!(f.swap.approve().await);
        assert_eq!(f.swap.allowance(), U256::ZERO);
        assert_eq!(f.sink.titles(), vec!["Approval failed", "Approval failed"]);
    }

    #[tokio::test]
    async fn test_native_input_refuses_approval() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();

        let err = assert_err!(f.swap.approve().await);
        assert!(matches!(err, SwapError::NotReady(_)));
        assert!(f.chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_swap_eth_for_tokens() {
        let mut f = fixture();
        let usdc = f.token("USDC");
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();
        let quote = assert_ok!(f.swap.refresh_quote().await).unwrap();

        let before = Utc::now();
        let outcome = assert_ok!(f.swap.execute_swap().await);

        assert_eq!(outcome.route, SwapRoute::EthForTokens);
        assert_eq!(outcome.call.path, vec![f.network.contracts.weth, usdc.address]);
        assert_eq!(outcome.call.amount_in, U256::from(10u128.pow(18)));
        assert_eq!(outcome.call.amount_out_min, quote.minimum_received);
        assert_eq!(outcome.call.to, OWNER);
        let deadline: u64 = outcome.call.deadline.to();
        let earliest = (before.timestamp() + SWAP_DEADLINE_SECS) as u64;
        assert!(deadline >= earliest && deadline <= earliest + 5);

        assert_eq!(f.chain.calls(), vec![WriteCall::EthForTokens(outcome.call.clone())]);
        assert_eq!(f.swap.from_amount(), "");
        assert_eq!(f.swap.to_amount(), "");
        assert!(f.swap.quote().is_none());
        assert_eq!(f.swap.state(), SwapState::Idle);

        let n = f.sink.all();
        assert_eq!(n[0].title, "Swap successful");
        assert!(n[0].description.starts_with("Swapped 1 ETH for "));
        assert!(n[0].description.ends_with(" USDC"));
    }

    #[tokio::test]
    async fn test_swap_tokens_for_eth() {
        let mut f = fixture();
        let usdc = f.token("USDC");
        f.chain.set_allowance(usdc.address, f.network.contracts.router, U256::MAX);
        select(&mut f, "USDC", "ETH");
        assert_ok!(f.swap.refresh_allowance().await);
        f.swap.set_from_amount("2500").unwrap();
        assert_ok!(f.swap.refresh_quote().await);

        let outcome = assert_ok!(f.swap.execute_swap().await);
        assert_eq!(outcome.route, SwapRoute::TokensForEth);
        assert_eq!(outcome.call.path, vec![usdc.address, f.network.contracts.weth]);
        assert_eq!(outcome.call.amount_in, U256::from(2_500_000_000u64));
    }

    #[tokio::test]
    async fn test_swap_tokens_for_tokens() {
        let mut f = fixture();
        let (usdc, dai) = (f.token("USDC"), f.token("DAI"));
        // DAI sorts below USDC, so it is token0
        f.chain.add_pair(DAI_USDC, dai.address, usdc.address, 10u128.pow(24), 10u128.pow(12));
        f.chain.set_allowance(dai.address, f.network.contracts.router, U256::MAX);
        select(&mut f, "DAI", "USDC");
        assert_ok!(f.swap.refresh_allowance().await);
        f.swap.set_from_amount("10").unwrap();
        let quote = assert_ok!(f.swap.refresh_quote().await).unwrap();
        // Near 1:1 pool keeps the trade close to 10 USDC
        assert!(quote.amount_out > U256::from(9_900_000u64));

        let outcome = assert_ok!(f.swap.execute_swap().await);
        assert_eq!(outcome.route, SwapRoute::TokensForTokens);
        assert_eq!(outcome.call.path, vec![dai.address, usdc.address]);
    }

    #[tokio::test]
    async fn test_failed_swap_keeps_quote() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();
        assert_ok!(f.swap.refresh_quote().await);
        f.chain.fail_swap(true);

        let err = assert_err!(f.swap.execute_swap().await);
        assert!(matches!(err, SwapError::SwapFailed(_)));
        assert!(!f.swap.is_executing());
        assert!(f.swap.quote().is_some());
        assert_eq!(f.swap.from_amount(), "1");
        assert_eq!(f.swap.state(), SwapState::Ready);
        assert_eq!(f.sink.titles(), vec!["Swap failed"]);
    }

    #[tokio::test]
    async fn test_swap_refused_until_ready() {
        let mut f = fixture();
        select(&mut f, "USDC", "ETH");
        f.swap.set_from_amount("100").unwrap();

        // No quote yet
        let err = assert_err!(f.swap.execute_swap().await);
        assert!(matches!(err, SwapError::NotReady(_)));

        // Quote held, allowance still zero
        assert_ok!(f.swap.refresh_quote().await);
        let err = assert_err!(f.swap.execute_swap().await);
        assert_eq!(err, SwapError::NotReady("token approval required"));
        assert!(f.chain.calls().is_empty());
    }

    #[test]
    fn test_same_token_rejected() {
        let mut f = fixture();
        let (eth, usdc) = (f.token("ETH"), f.token("USDC"));
        f.swap.select_from_token(eth.clone()).unwrap();

        let err = f.swap.select_to_token(eth).unwrap_err();
        assert_eq!(err, SwapError::SameToken("ETH".into()));
        assert!(f.swap.to_token().is_none());

        f.swap.select_to_token(usdc.clone()).unwrap();
        assert!(f.swap.select_from_token(usdc).is_err());
        assert_eq!(f.swap.from_token().unwrap().symbol, "ETH");
    }

    #[tokio::test]
    async fn test_switch_tokens_swaps_fields() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();
        let quote = assert_ok!(f.swap.refresh_quote().await).unwrap();

        f.swap.switch_tokens();

        assert_eq!(f.swap.from_token().unwrap().symbol, "USDC");
        assert_eq!(f.swap.to_token().unwrap().symbol, "ETH");
        assert_eq!(f.swap.from_amount(), quote.amount_out_formatted);
        assert_eq!(f.swap.to_amount(), "1");
        assert_eq!(f.swap.driving(), Side::To);
        assert!(f.swap.quote().is_none());
        assert_eq!(f.swap.action(), SwapAction::EnterAmount);
    }

    #[test]
    fn test_amount_input_filtering() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1.5").unwrap();
        f.swap.set_to_amount("3000").unwrap();

        assert!(f.swap.set_from_amount("1.2.3").is_err());
        assert_eq!(f.swap.from_amount(), "1.5");

        // Clearing one side clears the other
        f.swap.set_to_amount("").unwrap();
        assert_eq!(f.swap.from_amount(), "");
    }

    #[tokio::test]
    async fn test_slippage_rederives_minimum() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();
        let quote = assert_ok!(f.swap.refresh_quote().await).unwrap();

        f.swap.set_slippage(SlippageTolerance::from_percent(3.0).unwrap());
        let held = f.swap.quote().unwrap();
        assert_eq!(held.amount_out, quote.amount_out);
        assert_eq!(held.minimum_received, quote.amount_out * U256::from(97_000u64) / U256::from(100_000u64));
        assert!(held.minimum_received < quote.minimum_received);

        assert!(f.swap.set_custom_slippage("51").is_err());
        assert_eq!(f.swap.slippage().value().percent(), 3.0);
    }

    #[tokio::test]
    async fn test_live_router_quotes_match_local() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("3").unwrap();
        let local = assert_ok!(f.swap.refresh_quote().await).unwrap();

        let mut f = fixture();
        f.swap = f.swap.with_live_quotes(true);
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("3").unwrap();
        let live = assert_ok!(f.swap.refresh_quote().await).unwrap();

        assert_eq!(local, live);
    }

    #[test]
    fn test_action_progression() {
        let mut f = fixture();
        f.swap.disconnect();
        assert_eq!(f.swap.action(), SwapAction::ConnectWallet);
        assert_eq!(f.swap.action().to_string(), "Connect Wallet");

        f.swap.connect(OWNER, 56);
        assert_eq!(f.swap.action(), SwapAction::SwitchNetwork("Ethereum".into()));
        assert_eq!(f.swap.action().to_string(), "Switch to Ethereum");

        assert_ok!(f.swap.switch_network(None));
        assert_eq!(f.swap.action(), SwapAction::SelectTokens);

        select(&mut f, "ETH", "USDC");
        assert_eq!(f.swap.action(), SwapAction::EnterAmount);
    }

    #[test]
    fn test_network_switch_clears_selection() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();

        assert_eq!(assert_ok!(f.swap.switch_network(Some(11155111))), 11155111);
        assert!(f.swap.from_token().is_none());
        assert_eq!(f.swap.from_amount(), "");

        assert_eq!(f.swap.switch_network(Some(42)), Err(SwapError::UnsupportedNetwork(42)));
        assert_eq!(f.swap.session().chain_id(), Some(11155111));
    }

    #[tokio::test]
    async fn test_use_max_amount() {
        let mut f = fixture();
        f.chain.set_native_balance(U256::from(25 * 10u128.pow(17)));
        select(&mut f, "ETH", "USDC");

        let quote = assert_ok!(f.swap.use_max_amount().await).unwrap();
        assert_eq!(f.swap.from_amount(), "2.5");
        assert_eq!(quote.amount_in, U256::from(25 * 10u128.pow(17)));
    }

    #[tokio::test]
    async fn test_token_balance() {
        let f = fixture();
        let usdc = f.token("USDC");
        f.chain.set_balance(usdc.address, U256::from(42_000_000u64));

        assert_eq!(assert_ok!(f.swap.token_balance(&usdc).await), U256::from(42_000_000u64));
        assert_eq!(assert_ok!(f.swap.token_balance(&f.token("ETH")).await), U256::ZERO);
    }

    #[tokio::test]
    async fn test_new_account_on_same_chain_drops_allowance() {
        let mut f = fixture();
        let usdc = f.token("USDC");
        f.chain.set_allowance(usdc.address, f.network.contracts.router, U256::MAX);
        select(&mut f, "USDC", "ETH");
        assert_ok!(f.swap.refresh_allowance().await);
        f.swap.set_from_amount("100").unwrap();
        assert_ok!(f.swap.refresh_quote().await);
        assert_eq!(f.swap.action(), SwapAction::Swap);

        f.swap.connect(OTHER, 1);

        assert_eq!(f.swap.allowance(), U256::ZERO);
        assert_eq!(f.swap.from_token().unwrap().symbol, "USDC");
        assert_eq!(f.swap.action(), SwapAction::Approve);
        // The new owner has not approved anything on chain either
        assert_eq!(assert_ok!(f.swap.refresh_allowance().await), U256::ZERO);
    }

    #[tokio::test]
    async fn test_unquotable_amount_clears_derived_field() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();
        assert_ok!(f.swap.refresh_quote().await);

        f.swap.set_from_amount("0").unwrap();

        assert_eq!(assert_ok!(f.swap.refresh_quote().await), None);
        assert_eq!(f.swap.to_amount(), "");
        assert_eq!(f.swap.state(), SwapState::Idle);
        assert_eq!(f.swap.action(), SwapAction::EnterAmount);
        let err = assert_err!(f.swap.execute_swap().await);
        assert_eq!(err, SwapError::NotReady("enter an amount"));
    }

    #[tokio::test]
    async fn test_allowance_read_failure_is_reported() {
        let mut f = fixture();
        select(&mut f, "USDC", "ETH");
        f.swap.set_from_amount("100").unwrap();
        assert_ok!(f.swap.refresh_quote().await);
        f.chain.fail_allowance(true);

        let err = assert_err!(f.swap.refresh_allowance().await);

        assert!(matches!(err, SwapError::AllowanceCheckFailed(_)));
        assert!(err.is_retryable());
        assert_eq!(f.swap.allowance(), U256::ZERO);
        assert_eq!(f.swap.action(), SwapAction::Approve);
        assert_eq!(f.sink.titles(), vec!["Error checking allowance"]);
    }

    #[tokio::test]
    async fn test_allowance_reread_failure_after_approval() {
        let mut f = fixture();
        select(&mut f, "USDC", "ETH");
        f.swap.set_from_amount("100").unwrap();
        assert_ok!(f.swap.refresh_quote().await);
        f.chain.fail_allowance(true);

        // The approval itself succeeds; only the follow-up read fails
        assert_ok!(f.swap.approve().await);

        assert!(!f.swap.is_approving());
        assert_eq!(f.swap.allowance(), U256::ZERO);
        assert_eq!(f.swap.action(), SwapAction::Approve);
        assert_eq!(f.sink.titles(), vec!["Approval successful", "Error checking allowance"]);

        f.chain.fail_allowance(false);
        assert_eq!(assert_ok!(f.swap.refresh_allowance().await), U256::from(100_000_000u64));
        assert_eq!(f.swap.action(), SwapAction::Swap);
    }

    #[tokio::test]
    async fn test_approval_refused_when_allowance_covers_amount() {
        let mut f = fixture();
        let usdc = f.token("USDC");
        f.chain.set_allowance(usdc.address, f.network.contracts.router, U256::from(500_000_000u64));
        select(&mut f, "USDC", "ETH");
        assert_ok!(f.swap.refresh_allowance().await);
        f.swap.set_from_amount("100").unwrap();
        assert_ok!(f.swap.refresh_quote().await);

        let err = assert_err!(f.swap.approve().await);

        assert_eq!(err, SwapError::NotReady("allowance already sufficient"));
        assert!(f.chain.calls().is_empty());
        assert_eq!(f.swap.action(), SwapAction::Swap);
    }

    #[tokio::test]
    async fn test_slippage_preset_rederives_minimum() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_from_amount("1").unwrap();
        let quote = assert_ok!(f.swap.refresh_quote().await).unwrap();

        let value = assert_ok!(f.swap.select_slippage_preset(1.0));
        assert_eq!(value.percent(), 1.0);
        assert!(!f.swap.slippage().is_custom());
        assert_eq!(
            f.swap.quote().unwrap().minimum_received,
            quote.amount_out * U256::from(99_000u64) / U256::from(100_000u64)
        );

        let err = assert_err!(f.swap.select_slippage_preset(2.0));
        assert_eq!(err, SwapError::InvalidSlippage(SlippageError::NotPreset(2.0)));
        assert_eq!(f.swap.slippage().value().percent(), 1.0);
        assert_eq!(f.sink.titles(), vec!["Invalid slippage"]);
    }

    #[test]
    fn test_unrepresentable_amount_rejected() {
        let mut f = fixture();
        select(&mut f, "ETH", "USDC");
        f.swap.set_to_amount("1000").unwrap();

        let err = f.swap.set_to_amount("1000.0000001").unwrap_err();
        assert_eq!(err, SwapError::UnrepresentableAmount(AmountError::TooPrecise(6)));
        assert_eq!(f.swap.to_amount(), "1000");

        let err = f.swap.set_from_amount(&"9".repeat(80)).unwrap_err();
        assert_eq!(err, SwapError::UnrepresentableAmount(AmountError::TooLarge));
        assert_eq!(f.swap.from_amount(), "");
        assert_eq!(f.swap.driving(), Side::To);

        let n = f.sink.all();
        assert_eq!(n.len(), 2);
        assert_eq!(n[0].title, "Invalid amount");
        assert_eq!(n[0].description, "at most 6 decimal places are allowed");
        assert_eq!(n[1].description, "amount does not fit in 256 bits");
    }

    #[test]
    fn test_begin_quote_reports_unrepresentable_amount() {
        let mut f = fixture();
        select(&mut f, "USDC", "ETH");
        f.swap.from_amount = "1.0000001".to_string();

        assert!(f.swap.begin_quote().is_none());
        assert!(!f.swap.is_quoting());
        assert_eq!(f.sink.titles(), vec!["Invalid amount"]);
    }

    #[test]
    fn test_swap_deadline() {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(swap_deadline(now), U256::from(1_700_001_200u64));
    }
}
