//! Wallet state and its single mutation funnel.
//!
//! Every transition goes through [`StateManager::update_state`]: the patch is merged into a
//! copy of the current state, active flags are normalised, invariants are checked, and only
//! then is the copy swapped in. Subscribers run after the lock is released, in registration
//! order, before `update_state` returns.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::account::{Account, AccountStore};
use crate::core::chain::{Chain, ChainFamily, ChainId, ChainRegistry, EvmChain};
use crate::core::config::AccountConfig;
use crate::core::errors::{Result, WalletError};
use crate::core::events::{EventEmitter, SubscriptionId};

#[derive(Debug, Clone, Default)]
pub struct WalletState {
    pub accounts: AccountStore,
    pub active_account_index: Option<usize>,
    pub chains: ChainRegistry,
    pub is_connected: bool,
    pub is_locked: bool,
    pub is_initialized: bool,
}

impl WalletState {
    pub fn active_account(&self) -> Option<&Account> {
        self.active_account_index.and_then(|i| self.accounts.list().get(i))
    }

    /// EVM addresses in account order, active account first.
    pub fn evm_addresses(&self) -> Vec<String> {
        self.ordered_accounts().filter_map(|a| a.evm_address().map(str::to_string)).collect()
    }

    pub fn solana_addresses(&self) -> Vec<String> {
        self.ordered_accounts().filter_map(|a| a.solana_address().map(str::to_string)).collect()
    }

    /// Accounts with the active one first, then the rest in store order.
    pub fn ordered_accounts(&self) -> impl Iterator<Item = &Account> {
        let active = self.active_account();
        active.into_iter().chain(
            self.accounts
                .list()
                .iter()
                .enumerate()
                .filter(move |(i, _)| Some(*i) != self.active_account_index)
                .map(|(_, a)| a),
        )
    }

    fn validate(&self) -> Result<()> {
        match (self.accounts.is_empty(), self.active_account_index) {
            (true, Some(index)) => {
                return Err(WalletError::InvalidState(format!(
                    "active index {} set with no accounts",
                    index
                )))
            }
            (false, None) => {
                return Err(WalletError::InvalidState("accounts present but none active".into()))
            }
            (false, Some(index)) if index >= self.accounts.len() => {
                return Err(WalletError::InvalidState(format!(
                    "active index {} out of bounds ({} accounts)",
                    index,
                    self.accounts.len()
                )))
            }
            _ => {}
        }
        for (i, account) in self.accounts.list().iter().enumerate() {
            if account.active != (Some(i) == self.active_account_index) {
                return Err(WalletError::InvalidState(format!(
                    "active flag of account {} disagrees with index",
                    account.id
                )));
            }
        }
        self.chains.validate()
    }

    fn normalise(&mut self) {
        if self.accounts.is_empty() {
            self.active_account_index = None;
        } else if self.active_account_index.is_none() {
            self.active_account_index = Some(0);
        }
        let active = self.active_account_index;
        for (i, account) in self.accounts.list_mut().iter_mut().enumerate() {
            account.active = Some(i) == active;
        }
    }
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub accounts: Option<AccountStore>,
    pub active_account_index: Option<Option<usize>>,
    pub chains: Option<ChainRegistry>,
    pub is_connected: Option<bool>,
    pub is_locked: Option<bool>,
    pub is_initialized: Option<bool>,
}

impl StatePatch {
    fn apply_to(self, state: &mut WalletState) {
        if let Some(accounts) = self.accounts {
            state.accounts = accounts;
        }
        if let Some(index) = self.active_account_index {
            state.active_account_index = index;
        }
        if let Some(chains) = self.chains {
            state.chains = chains;
        }
        if let Some(connected) = self.is_connected {
            state.is_connected = connected;
        }
        if let Some(locked) = self.is_locked {
            state.is_locked = locked;
        }
        if let Some(initialized) = self.is_initialized {
            state.is_initialized = initialized;
        }
    }
}

type PersistHook = Arc<dyn Fn(&WalletState) + Send + Sync>;

struct Inner {
    state: Mutex<WalletState>,
    emitter: EventEmitter<WalletState>,
    persist: Mutex<Option<PersistHook>>,
    debounce: Duration,
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct StateManager {
    inner: Arc<Inner>,
}

impl StateManager {
    pub fn new(initial: WalletState, debounce: Duration) -> Result<Self> {
        let mut initial = initial;
        initial.normalise();
        initial.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(initial),
                emitter: EventEmitter::new(),
                persist: Mutex::new(None),
                debounce,
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Installs the callback run (debounced) after each successful update.
    pub fn set_persistence<F>(&self, hook: F)
    where
        F: Fn(&WalletState) + Send + Sync + 'static,
    {
        *self.inner.persist.lock() = Some(Arc::new(hook));
    }

    pub fn snapshot(&self) -> WalletState {
        self.inner.state.lock().clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&WalletState) + Send + Sync + 'static,
    {
        self.inner.emitter.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.emitter.unsubscribe(id)
    }

    pub fn update_state(&self, patch: StatePatch) -> Result<WalletState> {
        let next = {
            let mut guard = self.inner.state.lock();
            let mut candidate = guard.clone();
            patch.apply_to(&mut candidate);
            candidate.normalise();
            candidate.validate()?;
            *guard = candidate.clone();
            candidate
        };
        debug!(
            accounts = next.accounts.len(),
            active = ?next.active_account_index,
            connected = next.is_connected,
            "state updated"
        );
        self.inner.emitter.emit(&next);
        self.schedule_persist();
        Ok(next)
    }

    fn schedule_persist(&self) {
        let hook = match self.inner.persist.lock().clone() {
            Some(hook) => hook,
            None => return,
        };
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !self.inner.debounce.is_zero() => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move {
                    tokio::time::sleep(inner.debounce).await;
                    if inner.generation.load(Ordering::SeqCst) == generation {
                        let snapshot = inner.state.lock().clone();
                        hook(&snapshot);
                    }
                });
            }
            _ => {
                let snapshot = self.snapshot();
                hook(&snapshot);
            }
        }
    }

    pub fn add_account(&self, config: &AccountConfig) -> Result<Account> {
        let mut accounts = self.snapshot().accounts;
        let account = accounts.create(config)?;
        self.update_state(StatePatch { accounts: Some(accounts), ..Default::default() })?;
        info!(account = %account.id, "account added");
        Ok(account)
    }

    pub fn remove_account(&self, id: &str) -> Result<Account> {
        let current = self.snapshot();
        let mut accounts = current.accounts;
        let position = accounts
            .position(id)
            .ok_or_else(|| WalletError::AccountNotFound(id.to_string()))?;
        let removed = accounts.remove(id)?;
        let index = match current.active_account_index {
            _ if accounts.is_empty() => None,
            Some(active) if position < active => Some(active - 1),
            Some(active) => Some(active.min(accounts.len() - 1)),
            None => Some(0),
        };
        self.update_state(StatePatch {
            accounts: Some(accounts),
            active_account_index: Some(index),
            ..Default::default()
        })?;
        info!(account = %removed.id, "account removed");
        Ok(removed)
    }

    pub fn switch_account(&self, index: usize) -> Result<WalletState> {
        let len = self.inner.state.lock().accounts.len();
        if index >= len {
            return Err(WalletError::AccountNotFound(format!(
                "account index {} out of range ({} accounts)",
                index, len
            )));
        }
        self.update_state(StatePatch { active_account_index: Some(Some(index)), ..Default::default() })
    }

    pub fn add_chain(&self, chain: Chain) -> Result<WalletState> {
        let mut chains = self.snapshot().chains;
        chains.register(chain)?;
        self.update_state(StatePatch { chains: Some(chains), ..Default::default() })
    }

    /// Registers or merges an EVM chain; returns `true` when it was new.
    pub fn upsert_evm_chain(&self, chain: EvmChain) -> Result<bool> {
        let mut chains = self.snapshot().chains;
        let added = chains.upsert_evm(chain)?;
        self.update_state(StatePatch { chains: Some(chains), ..Default::default() })?;
        Ok(added)
    }

    pub fn remove_chain(&self, id: &ChainId) -> Result<Chain> {
        let mut chains = self.snapshot().chains;
        let removed = chains.remove(id)?;
        self.update_state(StatePatch { chains: Some(chains), ..Default::default() })?;
        Ok(removed)
    }

    /// Activates a registered chain. Returns `false` when it was already active.
    pub fn switch_chain(&self, id: &ChainId) -> Result<bool> {
        let mut chains = self.snapshot().chains;
        if chains.get(id).is_none() {
            return Err(WalletError::ChainNotFound(id.to_string()));
        }
        let family = id.family();
        if chains.active(family).map(Chain::id).as_ref() == Some(id) {
            return Ok(false);
        }
        chains.set_active(family, id)?;
        self.update_state(StatePatch { chains: Some(chains), ..Default::default() })?;
        info!(chain = %id, "active chain switched");
        Ok(true)
    }

    pub fn active_chain(&self, family: ChainFamily) -> Option<Chain> {
        self.inner.state.lock().chains.active(family).cloned()
    }

    pub fn set_connected(&self, connected: bool) -> Result<WalletState> {
        self.update_state(StatePatch { is_connected: Some(connected), ..Default::default() })
    }

    pub fn set_locked(&self, locked: bool) -> Result<WalletState> {
        self.update_state(StatePatch { is_locked: Some(locked), ..Default::default() })
    }

    pub fn set_initialized(&self) -> Result<WalletState> {
        self.update_state(StatePatch { is_initialized: Some(true), ..Default::default() })
    }
}
