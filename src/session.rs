//! Wallet session
//!
//! Explicit connection state passed to the orchestrator: which account is
//! connected and which chain it is on. The wallet protocol itself lives
//! outside this crate; this only mirrors what it reports.

use alloy_primitives::Address;
use tracing::{info, warn};

use crate::error::SwapError;
use crate::networks::{Network, NetworkRegistry};
use crate::notify::{Notification, Notifier};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletSession {
    account: Option<Address>,
    chain_id: Option<u64>,
}

impl WalletSession {
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// A session already connected, without notifications
    pub fn connected(account: Address, chain_id: u64) -> Self {
        Self { account: Some(account), chain_id: Some(chain_id) }
    }

    /// No account, but a chain to read quotes from
    pub fn read_only(chain_id: u64) -> Self {
        Self { account: None, chain_id: Some(chain_id) }
    }

    pub fn connect(
        &mut self,
        account: Address,
        chain_id: u64,
        registry: &NetworkRegistry,
        notifier: &dyn Notifier,
    ) {
        self.account = Some(account);
        self.chain_id = Some(chain_id);
        info!("Wallet {:?} connected on chain {}", account, chain_id);
        notifier.notify(Notification::info("Connected", "Wallet connected successfully"));

        if !registry.is_supported(chain_id) {
            notifier.notify(SwapError::UnsupportedNetwork(chain_id).notification());
        }
    }

    pub fn disconnect(&mut self, notifier: &dyn Notifier) {
        if self.account.take().is_some() {
            self.chain_id = None;
            notifier.notify(Notification::info("Disconnected", "Wallet disconnected"));
        }
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    /// The configured network the wallet is on, if any
    pub fn network<'a>(&self, registry: &'a NetworkRegistry) -> Option<&'a Network> {
        self.chain_id.and_then(|id| registry.find(id))
    }

    pub fn is_supported(&self, registry: &NetworkRegistry) -> bool {
        self.network(registry).is_some()
    }

    /// Move to `target`, or to the first configured network
    pub fn switch_network<'a>(
        &mut self,
        registry: &'a NetworkRegistry,
        target: Option<u64>,
        notifier: &dyn Notifier,
    ) -> Result<&'a Network, SwapError> {
        let network = match target {
            Some(chain_id) => match registry.require(chain_id) {
                Ok(network) => network,
                Err(e) => {
                    warn!("Refusing switch to chain {}", chain_id);
                    notifier.notify(Notification::error("Network Switch Failed", "Failed to switch network"));
                    return Err(e);
                }
            },
            None => registry.default_network(),
        };

        self.chain_id = Some(network.chain_id);
        info!("Switched to {} ({})", network.name, network.chain_id);
        notifier.notify(Notification::info("Network switched", format!("Switched to {}", network.name)));
        Ok(network)
    }
}
