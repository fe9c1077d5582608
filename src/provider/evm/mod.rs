//! EIP-1193 provider.
//!
//! Connection, account and chain events are derived from the shared [`WalletState`]: the
//! provider remembers what it last told listeners and, on every state publication, emits
//! only the differences. That keeps administrative changes (account switch, lock, chain
//! switch from either provider) and request-driven changes on one code path.

mod methods;
pub mod signing;
pub mod types;

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::core::errors::{codes, ProviderRpcError, Result, WalletError};
use crate::core::events::{EventEmitter, SubscriptionId};
use crate::core::state::WalletState;
use crate::provider::{ProviderContext, EVM_ACCOUNTS_PERMISSION};
use crate::security::error_sanitizer::sanitize_for_logging;
use crate::security::guard::SensitiveOperation;

pub use methods::SUPPORTED_METHODS;
pub use types::{ConnectInfo, EvmEvent, EvmEventKind, ProviderMessage, RequestArguments, WatchedAsset};

#[derive(Debug, Clone, Default)]
pub struct EvmSettings {
    /// Broadcast nothing; `eth_sendTransaction` returns the hash of the signed payload.
    pub simulate_transactions: bool,
    /// Per-chain RPC endpoints taking precedence over the chain's own `rpc_urls`.
    pub rpc_overrides: HashMap<u64, String>,
}

#[derive(Debug, Default)]
struct Emitted {
    connected: bool,
    accounts: Vec<String>,
    chain_id: Option<String>,
}

#[derive(Debug, Default)]
struct Ledger {
    /// Next nonce per (lowercase address, chain id) when no node is consulted.
    nonces: HashMap<(String, u64), u64>,
    watched_assets: Vec<WatchedAsset>,
}

pub struct EvmProvider {
    ctx: Arc<ProviderContext>,
    settings: EvmSettings,
    emitters: HashMap<EvmEventKind, EventEmitter<EvmEvent>>,
    emitted: Mutex<Emitted>,
    ledger: Mutex<Ledger>,
    state_subscription: Mutex<Option<SubscriptionId>>,
}

impl EvmProvider {
    pub fn new(ctx: Arc<ProviderContext>, settings: EvmSettings) -> Arc<Self> {
        let initial = ctx.state.snapshot();
        let provider = Arc::new(Self {
            emitters: EvmEventKind::ALL.iter().map(|k| (*k, EventEmitter::new())).collect(),
            emitted: Mutex::new(Emitted {
                connected: initial.is_connected,
                accounts: Self::visible_accounts(&initial),
                chain_id: initial.chains.active_evm().map(|c| c.chain_id_hex.clone()),
            }),
            ledger: Mutex::new(Ledger::default()),
            state_subscription: Mutex::new(None),
            ctx,
            settings,
        });
        let weak: Weak<Self> = Arc::downgrade(&provider);
        let id = provider.ctx.state.subscribe(move |state| {
            if let Some(provider) = weak.upgrade() {
                provider.sync_with_state(state);
            }
        });
        *provider.state_subscription.lock() = Some(id);
        provider
    }

    pub fn wallet_id(&self) -> &str {
        &self.ctx.wallet_id
    }

    pub(crate) fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.state.snapshot().is_connected
    }

    /// Addresses a dApp may see right now: empty while disconnected or locked.
    pub fn accounts(&self) -> Vec<String> {
        Self::visible_accounts(&self.ctx.state.snapshot())
    }

    fn visible_accounts(state: &WalletState) -> Vec<String> {
        if !state.is_connected || state.is_locked {
            return Vec::new();
        }
        let chain_id = state.chains.active_evm().map(|c| c.chain_id);
        state
            .ordered_accounts()
            .filter_map(|a| a.evm())
            .filter(|evm| chain_id.map(|id| evm.supports_chain(id)).unwrap_or(true))
            .map(|evm| evm.address().to_string())
            .collect()
    }

    pub fn chain_id(&self) -> Result<u64> {
        self.ctx
            .state
            .snapshot()
            .chains
            .active_evm()
            .map(|c| c.chain_id)
            .ok_or_else(|| WalletError::ChainNotFound("no active EVM chain".into()))
    }

    pub fn chain_id_hex(&self) -> Result<String> {
        Ok(crate::core::validation::chain_id_to_hex(self.chain_id()?))
    }

    /// RPC endpoint for `chain_id`: configured override first, then the chain's own list.
    pub fn endpoint_for(&self, chain_id: u64) -> Option<String> {
        self.settings.rpc_overrides.get(&chain_id).cloned().or_else(|| {
            self.ctx.state.snapshot().chains.get_evm(chain_id).and_then(|c| c.rpc_urls.first().cloned())
        })
    }

    pub fn simulates_transactions(&self) -> bool {
        self.settings.simulate_transactions
    }

    /// EIP-1193 entry point.
    pub async fn request(&self, args: RequestArguments) -> Result<Value> {
        debug!(wallet = %self.ctx.wallet_id, method = %args.method, "evm request");
        let handler = methods::handler(&args.method)
            .ok_or_else(|| WalletError::UnsupportedMethod(args.method.clone()))?;
        let result = handler(self, args.params).await;
        if let Err(err) = &result {
            debug!(
                method = %args.method,
                code = err.code(),
                error = %sanitize_for_logging(&err.to_string()),
                "evm request failed"
            );
        }
        result
    }

    /// Grants `eth_accounts` and marks the wallet connected. Returns the visible addresses.
    pub fn connect(&self) -> Result<Vec<String>> {
        let snapshot = self.ctx.state.snapshot();
        if snapshot.is_locked {
            return Err(WalletError::Unauthorized("wallet is locked".into()));
        }
        self.ctx.guard.assert_safe(SensitiveOperation::Connect)?;
        if snapshot.accounts.list().iter().all(|a| a.evm().is_none()) {
            return Err(WalletError::Unauthorized("no EVM accounts configured".into()));
        }
        self.ctx.grant(EVM_ACCOUNTS_PERMISSION);
        if !snapshot.is_connected {
            self.ctx.state.set_connected(true)?;
            info!(wallet = %self.ctx.wallet_id, "evm provider connected");
        }
        self.ctx.persist_session()?;
        Ok(self.accounts())
    }

    /// Ends the connection: emits `disconnect`, then `accountsChanged([])`, and clears the
    /// granted permissions and stored session. No-op while already disconnected.
    pub fn disconnect(&self) -> Result<()> {
        self.ctx.revoke(EVM_ACCOUNTS_PERMISSION);
        self.ctx.clear_session();
        if self.ctx.state.snapshot().is_connected {
            self.ctx.state.set_connected(false)?;
            info!(wallet = %self.ctx.wallet_id, "evm provider disconnected");
        }
        Ok(())
    }

    pub fn on<F>(&self, kind: EvmEventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&EvmEvent) + Send + Sync + 'static,
    {
        self.emitters[&kind].subscribe(listener)
    }

    pub fn remove_listener(&self, kind: EvmEventKind, id: SubscriptionId) -> bool {
        self.emitters[&kind].unsubscribe(id)
    }

    pub fn listener_count(&self, kind: EvmEventKind) -> usize {
        self.emitters[&kind].listener_count()
    }

    /// Delivers a `message` event (e.g. subscription notifications).
    pub fn send_message(&self, kind: &str, data: Value) {
        self.emit(EvmEvent::Message(ProviderMessage { kind: kind.to_string(), data }));
    }

    pub fn watched_assets(&self) -> Vec<WatchedAsset> {
        self.ledger.lock().watched_assets.clone()
    }

    fn emit(&self, event: EvmEvent) {
        self.emitters[&event.kind()].emit(&event);
    }

    fn sync_with_state(&self, state: &WalletState) {
        let chain_id = state.chains.active_evm().map(|c| c.chain_id_hex.clone());
        let accounts = Self::visible_accounts(state);
        let mut events = Vec::new();
        {
            let mut emitted = self.emitted.lock();
            let connecting = state.is_connected && !emitted.connected;
            let disconnecting = !state.is_connected && emitted.connected;

            if connecting {
                if let Some(chain) = &chain_id {
                    events.push(EvmEvent::Connect(ConnectInfo { chain_id: chain.clone() }));
                }
            }
            if disconnecting {
                events.push(EvmEvent::Disconnect(ProviderRpcError {
                    code: codes::DISCONNECTED,
                    message: "The provider is disconnected from all chains".into(),
                    data: None,
                }));
            }
            if chain_id != emitted.chain_id {
                if let Some(chain) = &chain_id {
                    events.push(EvmEvent::ChainChanged(chain.clone()));
                }
            }
            if disconnecting || accounts != emitted.accounts {
                events.push(EvmEvent::AccountsChanged(accounts.clone()));
            }

            emitted.connected = state.is_connected;
            emitted.accounts = accounts;
            emitted.chain_id = chain_id;
        }
        for event in events {
            self.emit(event);
        }
    }

    fn next_local_nonce(&self, address: &str, chain_id: u64) -> u64 {
        *self.ledger.lock().nonces.get(&(address.to_ascii_lowercase(), chain_id)).unwrap_or(&0)
    }

    fn record_nonce(&self, address: &str, chain_id: u64, used: u64) {
        let mut ledger = self.ledger.lock();
        let next = ledger.nonces.entry((address.to_ascii_lowercase(), chain_id)).or_insert(0);
        *next = (*next).max(used.saturating_add(1));
    }

    fn record_asset(&self, asset: WatchedAsset) {
        let mut ledger = self.ledger.lock();
        let exists = ledger.watched_assets.iter().any(|a| {
            a.chain_id == asset.chain_id && a.options.address.eq_ignore_ascii_case(&asset.options.address)
        });
        if !exists {
            ledger.watched_assets.push(asset);
        }
    }
}

impl Drop for EvmProvider {
    fn drop(&mut self) {
        if let Some(id) = self.state_subscription.lock().take() {
            self.ctx.state.unsubscribe(id);
        }
    }
}
