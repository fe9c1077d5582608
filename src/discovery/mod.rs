//! EIP-6963 multi-provider discovery.
//!
//! The announcer answers every `RequestProvider` broadcast on the host bus with exactly one
//! `AnnounceProvider`, and announces once on start so apps that asked before the wallet
//! loaded still see it.

pub mod wallet_standard;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::core::config::BrandingConfig;
use crate::core::events::SubscriptionId;
use crate::host::{HostEvent, HostPage};
use crate::provider::evm::EvmProvider;

pub use wallet_standard::WalletStandardRegistration;

/// EIP-6963 `EIP6963ProviderInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub uuid: String,
    pub name: String,
    pub icon: String,
    pub rdns: String,
}

impl ProviderInfo {
    /// Uses the configured uuid, or a fresh v4 uuid for this wallet instance.
    pub fn from_branding(branding: &BrandingConfig) -> Self {
        Self {
            uuid: branding.uuid.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: branding.name.clone(),
            icon: branding.icon.clone(),
            rdns: branding.rdns.clone(),
        }
    }
}

/// EIP-6963 `EIP6963ProviderDetail`.
#[derive(Clone)]
pub struct ProviderDetail {
    pub info: ProviderInfo,
    pub provider: Arc<EvmProvider>,
}

impl fmt::Debug for ProviderDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDetail")
            .field("info", &self.info)
            .field("wallet", &self.provider.wallet_id())
            .finish()
    }
}

pub struct Announcer {
    host: Weak<HostPage>,
    info: ProviderInfo,
    provider: Weak<EvmProvider>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl Announcer {
    pub fn new(host: &Arc<HostPage>, info: ProviderInfo, provider: &Arc<EvmProvider>) -> Self {
        Self {
            host: Arc::downgrade(host),
            info,
            provider: Arc::downgrade(provider),
            subscription: Mutex::new(None),
        }
    }

    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }

    pub fn is_active(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Subscribes to discovery requests and announces once. Returns `false` when already
    /// started.
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
            let weak_provider = self.provider.clone();
            let info = self.info.clone();
            let id = host.add_event_listener(move |event| {
                if !matches!(event, HostEvent::RequestProvider) {
                    return;
                }
                if let (Some(host), Some(provider)) = (weak_host.upgrade(), weak_provider.upgrade()) {
                    debug!(rdns = %info.rdns, "answering eip6963 request");
                    host.dispatch_event(HostEvent::AnnounceProvider(ProviderDetail { info: info.clone(), provider }));
                }
            });
            *subscription = Some(id);
        }
        self.announce();
        true
    }

    /// Removes only this announcer's listener. Returns `false` when not started.
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

    pub fn announce(&self) {
        if let (Some(host), Some(provider)) = (self.host.upgrade(), self.provider.upgrade()) {
            host.dispatch_event(HostEvent::AnnounceProvider(ProviderDetail { info: self.info.clone(), provider }));
        }
    }
}

impl Drop for Announcer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Collects announcements the way a dApp would: listen, then broadcast a request.
pub fn request_providers(host: &HostPage) -> Vec<ProviderDetail> {
    let found = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&found);
    let id = host.add_event_listener(move |event| {
        if let HostEvent::AnnounceProvider(detail) = event {
            sink.lock().push(detail.clone());
        }
    });
    host.dispatch_event(HostEvent::RequestProvider);
    host.remove_event_listener(id);
    let details = found.lock().clone();
    details
}
