//! Wallet Standard registration handshake.
//!
//! The wallet broadcasts `RegisterWallet` when it starts, and again for every `AppReady`
//! from an app that loaded later.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::core::events::SubscriptionId;
use crate::host::{HostEvent, HostPage};
use crate::provider::solana::SolanaProvider;

pub struct WalletStandardRegistration {
    host: Weak<HostPage>,
    wallet: Weak<SolanaProvider>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl WalletStandardRegistration {
    pub fn new(host: &Arc<HostPage>, wallet: &Arc<SolanaProvider>) -> Self {
        Self { host: Arc::downgrade(host), wallet: Arc::downgrade(wallet), subscription: Mutex::new(None) }
    }

    pub fn is_active(&self) -> bool {
        self.subscription.lock().is_some()
    }

    pub fn start(&self) -> bool {
        let host = match self.host.upgrade() {
            Some(host) => host,
            None => return false,
        };
        {
            let mut subscription = self.subscription.lock();
            if subscription.is_some() {
                return false;
            }
            let weak_host = self.host.clone();
            let weak_wallet = self.wallet.clone();
            let id = host.add_event_listener(move |event| {
                if !matches!(event, HostEvent::AppReady) {
                    return;
                }
                if let (Some(host), Some(wallet)) = (weak_host.upgrade(), weak_wallet.upgrade()) {
                    debug!(wallet = %wallet.wallet_id(), "registering with ready app");
                    host.dispatch_event(HostEvent::RegisterWallet(wallet));
                }
            });
            *subscription = Some(id);
        }
        if let Some(wallet) = self.wallet.upgrade() {
            host.dispatch_event(HostEvent::RegisterWallet(wallet));
        }
        true
    }

    pub fn stop(&self) -> bool {
        let id = match self.subscription.lock().take() {
            Some(id) => id,
            None => return false,
        };
        if let Some(host) = self.host.upgrade() {
            host.remove_event_listener(id);
        }
        true
    }
}

impl Drop for WalletStandardRegistration {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Broadcasts `AppReady` and collects the wallets that register in response.
pub fn app_ready(host: &HostPage) -> Vec<Arc<SolanaProvider>> {
    let found = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&found);
    let id = host.add_event_listener(move |event| {
        if let HostEvent::RegisterWallet(wallet) = event {
            sink.lock().push(Arc::clone(wallet));
        }
    });
    host.dispatch_event(HostEvent::AppReady);
    host.remove_event_listener(id);
    let wallets = found.lock().clone();
    wallets
}
