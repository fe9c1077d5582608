//! The wallet instance: state, providers, discovery and host attachment under one owner.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{info, warn};

use crate::blockchain::RpcPool;
use crate::core::account::{Account, AccountStore};
use crate::core::chain::{Chain, ChainId, ChainRegistry, EvmChain, NativeCurrency, SolanaCluster};
use crate::core::config::{AccountConfig, AccountKind, EvmInjection, SolanaInjection, WalletConfig};
use crate::core::errors::{Result, WalletError};
use crate::core::events::SubscriptionId;
use crate::core::state::{StateManager, WalletState};
use crate::discovery::{Announcer, ProviderInfo, WalletStandardRegistration};
use crate::host::{HostPage, InjectedProvider};
use crate::provider::evm::{EvmProvider, EvmSettings};
use crate::provider::solana::{ConnectOptions, SolanaProvider, SolanaSettings};
use crate::provider::{ProviderContext, EVM_ACCOUNTS_PERMISSION, SOLANA_CONNECT_PERMISSION};
use crate::security::guard::SafetyGuard;
use crate::service::injection::ProviderRegistration;
use crate::storage::{KeyValueStorage, SessionStore};

pub use crate::core::config::DEFAULT_EVM_CHAIN;
const PRESET_EVM_CHAINS: [u64; 9] = [1, 11155111, 17000, 137, 8453, 84532, 10, 42161, 31337];
const PRESET_CLUSTERS: [&str; 4] = ["mainnet-beta", "devnet", "testnet", "localnet"];
pub const EVM_GLOBAL_PATH: &str = "ethereum";

pub struct HeadlessWallet {
    id: String,
    config: WalletConfig,
    host: Arc<HostPage>,
    ctx: Arc<ProviderContext>,
    evm: Arc<EvmProvider>,
    solana: Arc<SolanaProvider>,
    announcer: Announcer,
    wallet_standard: WalletStandardRegistration,
    registration: Mutex<ProviderRegistration>,
}

impl HeadlessWallet {
    /// Builds the wallet and restores a stored session for the page's origin, or connects
    /// right away when `autoConnect` is set.
    pub fn new(config: WalletConfig, host: Arc<HostPage>) -> Result<Self> {
        let id = config.id.clone().unwrap_or_else(|| config.branding.rdns.clone());
        let state = StateManager::new(
            initial_state(&config)?,
            Duration::from_millis(config.session.debounce_ms),
        )?;
        let guard = Arc::new(SafetyGuard::new(&config.production, Arc::clone(&host)));
        let sessions = if config.session.enabled {
            let storage: Arc<dyn KeyValueStorage> = host.local_storage();
            Some(SessionStore::new(storage, &config.session, &id)?)
        } else {
            None
        };
        let ctx = Arc::new(ProviderContext::new(
            id.clone(),
            state.clone(),
            guard,
            Arc::new(RpcPool::new()),
            Arc::clone(&host),
            sessions,
        ));

        let snapshot = state.snapshot();
        let evm_overrides: HashMap<u64, String> = snapshot
            .chains
            .evm_chains()
            .filter_map(|c| config.evm_transport_for(c.chain_id).map(|url| (c.chain_id, url)))
            .collect();
        let evm = EvmProvider::new(
            Arc::clone(&ctx),
            EvmSettings { simulate_transactions: config.evm.simulate_transactions, rpc_overrides: evm_overrides },
        );
        let solana_overrides: HashMap<String, String> = config
            .solana
            .rpc_url
            .iter()
            .map(|url| (config.solana.cluster.clone(), url.clone()))
            .collect();
        let solana = SolanaProvider::new(
            Arc::clone(&ctx),
            SolanaSettings {
                name: config.branding.name.clone(),
                icon: config.branding.icon.clone(),
                simulate_transactions: config.solana.simulate_transactions,
                rpc_overrides: solana_overrides,
            },
        );

        let weak_ctx: Weak<ProviderContext> = Arc::downgrade(&ctx);
        state.set_persistence(move |_| {
            if let Some(ctx) = weak_ctx.upgrade() {
                if let Err(err) = ctx.persist_session() {
                    warn!(wallet = %ctx.wallet_id, error = %err, "session persistence failed");
                }
            }
        });

        let announcer = Announcer::new(&host, ProviderInfo::from_branding(&config.branding), &evm);
        let wallet_standard = WalletStandardRegistration::new(&host, &solana);
        let wallet = Self {
            id,
            config,
            host,
            ctx,
            evm,
            solana,
            announcer,
            wallet_standard,
            registration: Mutex::new(ProviderRegistration::new()),
        };
        wallet.restore_or_connect()?;
        info!(wallet = %wallet.id, origin = %wallet.host.origin(), "headless wallet ready");
        Ok(wallet)
    }

    fn restore_or_connect(&self) -> Result<()> {
        if let Some(session) = self.ctx.load_session() {
            info!(wallet = %self.id, origin = %session.origin, "restoring session");
            if let Ok(chain_id) = crate::core::validation::parse_chain_id(&session.chain_id) {
                if self.ctx.state.snapshot().chains.get_evm(chain_id).is_some() {
                    self.ctx.state.switch_chain(&ChainId::Evm(chain_id))?;
                }
            }
            if session.permissions.iter().any(|p| p == EVM_ACCOUNTS_PERMISSION) {
                self.ctx.state.set_connected(true)?;
            }
            if session.permissions.iter().any(|p| p == SOLANA_CONNECT_PERMISSION) {
                if let Err(err) = self.solana.connect(ConnectOptions::trusted_only()) {
                    warn!(wallet = %self.id, error = %err, "solana session not restored");
                }
            }
            return Ok(());
        }
        if self.config.auto_connect {
            let snapshot = self.ctx.state.snapshot();
            if snapshot.accounts.list().iter().any(|a| a.evm().is_some()) {
                self.evm.connect()?;
            }
            if snapshot.accounts.list().iter().any(|a| a.solana().is_some()) {
                self.solana.connect(ConnectOptions::default())?;
            }
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<HostPage> {
        &self.host
    }

    pub fn evm(&self) -> &Arc<EvmProvider> {
        &self.evm
    }

    pub fn solana(&self) -> &Arc<SolanaProvider> {
        &self.solana
    }

    pub fn guard(&self) -> &SafetyGuard {
        &self.ctx.guard
    }

    pub fn rpc(&self) -> &RpcPool {
        &self.ctx.rpc
    }

    pub fn state(&self) -> WalletState {
        self.ctx.state.snapshot()
    }

    pub fn announcer(&self) -> &Announcer {
        &self.announcer
    }

    /// Attaches the providers to the host page and starts discovery.
    pub fn inject(&self) -> Result<()> {
        let mut registration = self.registration.lock();
        if !registration.is_empty() {
            return Err(WalletError::InvalidState(format!("wallet {} is already injected", self.id)));
        }
        let evm = InjectedProvider::Evm(Arc::clone(&self.evm));
        match self.config.injection.evm {
            EvmInjection::Replace => registration.attach_replace(&self.host, EVM_GLOBAL_PATH, evm),
            EvmInjection::Append => registration.attach_append(&self.host, EVM_GLOBAL_PATH, evm),
            EvmInjection::AnnounceOnly => {}
        }
        match self.config.injection.solana {
            SolanaInjection::Global => {
                let path = self.config.injection.solana_path.clone();
                registration.attach_replace(&self.host, &path, InjectedProvider::Solana(Arc::clone(&self.solana)));
            }
            SolanaInjection::WalletStandard => {}
        }
        registration.announcer_started = self.announcer.start();
        registration.wallet_standard_registered = self.wallet_standard.start();
        info!(
            wallet = %self.id,
            evm = ?self.config.injection.evm,
            solana = ?self.config.injection.solana,
            "providers injected"
        );
        Ok(())
    }

    /// Removes exactly what [`inject`](Self::inject) added and restores displaced globals.
    pub fn teardown(&self) {
        let mut registration = self.registration.lock();
        registration.detach_all(&self.host);
        if registration.announcer_started {
            self.announcer.stop();
            registration.announcer_started = false;
        }
        if registration.wallet_standard_registered {
            self.wallet_standard.stop();
            registration.wallet_standard_registered = false;
        }
        info!(wallet = %self.id, "providers removed");
    }

    pub fn is_injected(&self) -> bool {
        !self.registration.lock().is_empty()
    }

    pub fn add_account(&self, config: &AccountConfig) -> Result<Account> {
        self.ctx.state.add_account(config)
    }

    pub fn remove_account(&self, id: &str) -> Result<Account> {
        self.ctx.state.remove_account(id)
    }

    pub fn switch_account(&self, index: usize) -> Result<()> {
        self.ctx.state.switch_account(index).map(|_| ())
    }

    pub fn add_chain(&self, chain: Chain) -> Result<()> {
        self.ctx.state.add_chain(chain).map(|_| ())
    }

    pub fn switch_evm_chain(&self, chain_id: u64) -> Result<bool> {
        self.ctx.state.switch_chain(&ChainId::Evm(chain_id))
    }

    pub fn switch_solana_cluster(&self, name: &str) -> Result<bool> {
        self.ctx.state.switch_chain(&ChainId::Solana(name.to_string()))
    }

    pub fn lock(&self) -> Result<()> {
        self.ctx.state.set_locked(true).map(|_| ())
    }

    pub fn unlock(&self) -> Result<()> {
        self.ctx.state.set_locked(false).map(|_| ())
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&WalletState) + Send + Sync + 'static,
    {
        self.ctx.state.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.ctx.state.unsubscribe(id)
    }

    /// Disconnects both providers.
    pub fn disconnect(&self) -> Result<()> {
        self.evm.disconnect()?;
        self.solana.disconnect()
    }
}

impl Drop for HeadlessWallet {
    fn drop(&mut self) {
        if self.is_injected() {
            self.teardown();
        }
    }
}

fn initial_state(config: &WalletConfig) -> Result<WalletState> {
    let mut accounts = AccountStore::new();
    for account in &config.accounts {
        accounts.create(account)?;
    }
    if accounts.is_empty() {
        accounts.create(&AccountConfig::generated(AccountKind::Dual).with_label("Account 1"))?;
    }

    let mut chains = ChainRegistry::new();
    for chain_id in PRESET_EVM_CHAINS {
        if let Some(chain) = EvmChain::well_known(chain_id) {
            chains.register(Chain::Evm(chain))?;
        }
    }
    for extra in &config.evm.chains {
        let currency = match &extra.currency_symbol {
            Some(symbol) => NativeCurrency::new(symbol, symbol, 18),
            None => NativeCurrency::ether(),
        };
        let mut chain = EvmChain::new(extra.chain_id, &extra.name, currency);
        for url in &extra.rpc_urls {
            chain = chain.with_rpc(url);
        }
        for url in &extra.block_explorer_urls {
            chain = chain.with_explorer(&extra.name, url);
        }
        if extra.testnet {
            chain = chain.testnet();
        }
        chains.upsert_evm(chain)?;
    }
    let default_chain = config.evm.default_chain.unwrap_or(DEFAULT_EVM_CHAIN);
    chains.set_active(crate::core::chain::ChainFamily::Evm, &ChainId::Evm(default_chain))?;

    for name in PRESET_CLUSTERS {
        if let Some(cluster) = SolanaCluster::well_known(name) {
            chains.register(Chain::Solana(cluster))?;
        }
    }
    let cluster = config.solana.cluster.clone();
    if chains.get_solana(&cluster).is_none() {
        let endpoint = config.solana.rpc_url.clone().ok_or_else(|| {
            WalletError::Config(format!("custom Solana cluster '{}' needs an rpcUrl", cluster))
        })?;
        chains.register(Chain::Solana(SolanaCluster::new(&cluster, &endpoint)))?;
    }
    chains.set_active(crate::core::chain::ChainFamily::Solana, &ChainId::Solana(cluster))?;

    Ok(WalletState {
        accounts,
        active_account_index: Some(0),
        chains,
        is_connected: false,
        is_locked: false,
        is_initialized: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_generate_dual_account() {
        let wallet = HeadlessWallet::new(WalletConfig::default(), Arc::new(HostPage::localhost())).unwrap();
        let state = wallet.state();
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.accounts.list()[0].kind(), AccountKind::Dual);
        assert_eq!(state.chains.active_evm().unwrap().chain_id, DEFAULT_EVM_CHAIN);
        assert_eq!(state.chains.active_solana().unwrap().name, "devnet");
        assert!(state.is_initialized);
        assert!(!state.is_connected);
    }

    #[test]
    fn test_unknown_default_chain_rejected() {
        let mut config = WalletConfig::default();
        config.evm.default_chain = Some(999_999);
        let err = HeadlessWallet::new(config, Arc::new(HostPage::localhost())).err().unwrap();
        assert!(matches!(err, WalletError::ChainNotFound(_)));
    }

    #[test]
    fn test_custom_cluster_requires_endpoint() {
        let mut config = WalletConfig::default();
        config.solana.cluster = "my-validator".into();
        assert!(matches!(
            HeadlessWallet::new(config.clone(), Arc::new(HostPage::localhost())),
            Err(WalletError::Config(_))
        ));
        config.solana.rpc_url = Some("http://10.0.0.5:8899".into());
        let wallet = HeadlessWallet::new(config, Arc::new(HostPage::localhost())).unwrap();
        assert_eq!(wallet.state().chains.active_solana().unwrap().name, "my-validator");
    }
}
