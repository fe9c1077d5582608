//! The page a wallet is attached to.
//!
//! Holds everything a browser would provide: the current location, build-time environment
//! markers, the global scope providers are injected into, the global event bus used for
//! discovery, and `localStorage`. It is the only state shared between wallet instances.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::core::errors::{Result, WalletError};
use crate::core::events::{EventEmitter, SubscriptionId};
use crate::discovery::ProviderDetail;
use crate::provider::evm::EvmProvider;
use crate::provider::solana::SolanaProvider;
use crate::storage::MemoryStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub protocol: String,
    pub hostname: String,
    /// Explicit non-default port.
    pub port: Option<u16>,
    pub pathname: String,
    origin: String,
}

impl Location {
    /// Parses an absolute page URL. `file:` URLs carry an empty hostname.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| WalletError::Config(format!("invalid page url {}: {}", raw, e)))?;
        let hostname = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if hostname.is_empty() && url.scheme() != "file" {
            return Err(WalletError::Config(format!("page url has no host: {}", raw)));
        }
        Ok(Self {
            protocol: format!("{}:", url.scheme()),
            hostname,
            port: url.port(),
            pathname: url.path().to_string(),
            origin: url.origin().ascii_serialization(),
        })
    }

    /// `scheme://host[:port]`, or `null` for opaque origins.
    pub fn origin(&self) -> String {
        self.origin.clone()
    }
}

/// A provider object living in the page's global scope.
#[derive(Clone)]
pub enum InjectedProvider {
    Evm(Arc<EvmProvider>),
    Solana(Arc<SolanaProvider>),
    /// Installed by other code; identified by name only.
    External(String),
}

impl InjectedProvider {
    /// Identity comparison.
    pub fn same_as(&self, other: &InjectedProvider) -> bool {
        match (self, other) {
            (InjectedProvider::Evm(a), InjectedProvider::Evm(b)) => Arc::ptr_eq(a, b),
            (InjectedProvider::Solana(a), InjectedProvider::Solana(b)) => Arc::ptr_eq(a, b),
            (InjectedProvider::External(a), InjectedProvider::External(b)) => a == b,
            _ => false,
        }
    }

    pub fn as_evm(&self) -> Option<&Arc<EvmProvider>> {
        match self {
            InjectedProvider::Evm(provider) => Some(provider),
            _ => None,
        }
    }

    pub fn as_solana(&self) -> Option<&Arc<SolanaProvider>> {
        match self {
            InjectedProvider::Solana(provider) => Some(provider),
            _ => None,
        }
    }
}

impl fmt::Debug for InjectedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectedProvider::Evm(p) => write!(f, "Evm({})", p.wallet_id()),
            InjectedProvider::Solana(p) => write!(f, "Solana({})", p.wallet_id()),
            InjectedProvider::External(name) => write!(f, "External({})", name),
        }
    }
}

/// Value stored under a global path.
#[derive(Debug, Clone)]
pub enum GlobalValue {
    Single(InjectedProvider),
    /// Several coexisting providers, as multi-wallet pages expose them.
    List(Vec<InjectedProvider>),
}

impl GlobalValue {
    pub fn providers(&self) -> Vec<InjectedProvider> {
        match self {
            GlobalValue::Single(provider) => vec![provider.clone()],
            GlobalValue::List(list) => list.clone(),
        }
    }

    pub fn contains(&self, provider: &InjectedProvider) -> bool {
        self.providers().iter().any(|p| p.same_as(provider))
    }
}

/// Broadcasts on the page's global event bus.
#[derive(Clone)]
pub enum HostEvent {
    /// EIP-6963 `eip6963:requestProvider`.
    RequestProvider,
    /// EIP-6963 `eip6963:announceProvider`.
    AnnounceProvider(ProviderDetail),
    /// Wallet Standard `wallet-standard:app-ready`.
    AppReady,
    /// Wallet Standard `wallet-standard:register-wallet`.
    RegisterWallet(Arc<SolanaProvider>),
}

impl fmt::Debug for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::RequestProvider => f.write_str("RequestProvider"),
            HostEvent::AnnounceProvider(detail) => write!(f, "AnnounceProvider({})", detail.info.rdns),
            HostEvent::AppReady => f.write_str("AppReady"),
            HostEvent::RegisterWallet(wallet) => write!(f, "RegisterWallet({})", wallet.wallet_id()),
        }
    }
}

pub struct HostPage {
    location: RwLock<Location>,
    env: RwLock<HashMap<String, String>>,
    globals: Mutex<HashMap<String, GlobalValue>>,
    events: EventEmitter<HostEvent>,
    local_storage: Arc<MemoryStorage>,
}

impl HostPage {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            location: RwLock::new(Location::parse(url)?),
            env: RwLock::new(HashMap::new()),
            globals: Mutex::new(HashMap::new()),
            events: EventEmitter::new(),
            local_storage: Arc::new(MemoryStorage::new()),
        })
    }

    /// A page at `http://localhost:3000` with no environment markers.
    pub fn localhost() -> Self {
        Self {
            location: RwLock::new(Location {
                protocol: "http:".into(),
                hostname: "localhost".into(),
                port: Some(3000),
                pathname: "/".into(),
                origin: "http://localhost:3000".into(),
            }),
            env: RwLock::new(HashMap::new()),
            globals: Mutex::new(HashMap::new()),
            events: EventEmitter::new(),
            local_storage: Arc::new(MemoryStorage::new()),
        }
    }

    /// Copies the process environment in as build-time markers.
    pub fn with_process_env(self) -> Self {
        self.env.write().extend(std::env::vars());
        self
    }

    pub fn with_env(self, key: &str, value: &str) -> Self {
        self.set_env(key, value);
        self
    }

    pub fn set_env(&self, key: &str, value: &str) {
        self.env.write().insert(key.to_string(), value.to_string());
    }

    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env.read().get(key).cloned()
    }

    pub fn env_markers(&self) -> HashMap<String, String> {
        self.env.read().clone()
    }

    pub fn location(&self) -> Location {
        self.location.read().clone()
    }

    pub fn origin(&self) -> String {
        self.location.read().origin()
    }

    /// Simulates a navigation within the same page object (globals and storage persist).
    pub fn navigate(&self, url: &str) -> Result<()> {
        *self.location.write() = Location::parse(url)?;
        Ok(())
    }

    pub fn global(&self, path: &str) -> Option<GlobalValue> {
        self.globals.lock().get(path).cloned()
    }

    /// Stores `value` under `path`, returning what was there before.
    pub fn set_global(&self, path: &str, value: GlobalValue) -> Option<GlobalValue> {
        self.globals.lock().insert(path.to_string(), value)
    }

    pub fn remove_global(&self, path: &str) -> Option<GlobalValue> {
        self.globals.lock().remove(path)
    }

    /// Atomically rewrites a global slot.
    pub fn update_global<F>(&self, path: &str, f: F)
    where
        F: FnOnce(Option<GlobalValue>) -> Option<GlobalValue>,
    {
        let mut globals = self.globals.lock();
        let current = globals.remove(path);
        if let Some(next) = f(current) {
            globals.insert(path.to_string(), next);
        }
    }

    pub fn dispatch_event(&self, event: HostEvent) {
        self.events.emit(&event);
    }

    pub fn add_event_listener<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn remove_event_listener(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }

    pub fn local_storage(&self) -> Arc<MemoryStorage> {
        Arc::clone(&self.local_storage)
    }
}

impl Default for HostPage {
    fn default() -> Self {
        Self::localhost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let loc = Location::parse("https://app.uniswap.org/swap?x=1").unwrap();
        assert_eq!(loc.protocol, "https:");
        assert_eq!(loc.hostname, "app.uniswap.org");
        assert_eq!(loc.origin(), "https://app.uniswap.org");

        let local = Location::parse("http://localhost:5173").unwrap();
        assert_eq!(local.port, Some(5173));
        assert_eq!(local.origin(), "http://localhost:5173");

        let v6 = Location::parse("http://[::1]:8080/").unwrap();
        assert_eq!(v6.hostname, "[::1]");
        assert_eq!(v6.port, Some(8080));
    }

    #[test]
    fn test_file_origin_is_null() {
        let loc = Location::parse("file:///tmp/index.html").unwrap();
        assert_eq!(loc.hostname, "");
        assert_eq!(loc.origin(), "null");
    }

    #[test]
    fn test_rejects_missing_host() {
        assert!(Location::parse("localhost").is_err());
        assert!(Location::parse("https://").is_err());
    }

    #[test]
    fn test_query_and_fragment_stay_out_of_host() {
        let query = Location::parse("https://app.example.com?x=1").unwrap();
        assert_eq!(query.hostname, "app.example.com");
        assert_eq!(query.pathname, "/");
        assert_eq!(query.origin(), "https://app.example.com");

        let fragment = Location::parse("http://localhost:5173#/swap").unwrap();
        assert_eq!(fragment.hostname, "localhost");
        assert_eq!(fragment.origin(), "http://localhost:5173");
    }

    #[test]
    fn test_default_port_dropped_from_origin() {
        let loc = Location::parse("https://A.com:443/").unwrap();
        assert_eq!(loc.port, None);
        assert_eq!(loc.hostname, "a.com");
        assert_eq!(loc.origin(), "https://a.com");
        assert_eq!(Location::parse("http://a.com:80").unwrap().origin(), "http://a.com");
    }

    #[test]
    fn test_globals_round_trip() {
        let page = HostPage::localhost();
        let previous = page.set_global("ethereum", GlobalValue::Single(InjectedProvider::External("metamask".into())));
        assert!(previous.is_none());
        assert!(page.global("ethereum").unwrap().contains(&InjectedProvider::External("metamask".into())));
        assert!(page.remove_global("ethereum").is_some());
        assert!(page.global("ethereum").is_none());
    }
}
