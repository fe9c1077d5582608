//! Provider surfaces exposed to host applications.
//!
//! Both providers share one [`ProviderContext`]: the wallet's state, its safety guard, the
//! RPC pool, granted permissions and the session store.

pub mod evm;
pub mod solana;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::blockchain::RpcPool;
use crate::core::chain::{Chain, ChainFamily};
use crate::core::errors::Result;
use crate::core::state::StateManager;
use crate::host::HostPage;
use crate::security::guard::SafetyGuard;
use crate::storage::session_store::{Session, SessionStore};

/// Capability name of the EVM account permission (EIP-2255).
pub const EVM_ACCOUNTS_PERMISSION: &str = "eth_accounts";
/// Capability name recorded when a Solana app connects.
pub const SOLANA_CONNECT_PERMISSION: &str = "standard:connect";

/// EIP-2255 permission object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    pub parent_capability: String,
    pub invoker: String,
    pub caveats: Vec<Value>,
    pub date: i64,
}

pub struct ProviderContext {
    pub wallet_id: String,
    pub state: StateManager,
    pub guard: Arc<SafetyGuard>,
    pub rpc: Arc<RpcPool>,
    pub host: Arc<HostPage>,
    sessions: Option<SessionStore>,
    permissions: Mutex<BTreeMap<String, Permission>>,
}

impl ProviderContext {
    pub fn new(
        wallet_id: String,
        state: StateManager,
        guard: Arc<SafetyGuard>,
        rpc: Arc<RpcPool>,
        host: Arc<HostPage>,
        sessions: Option<SessionStore>,
    ) -> Self {
        Self { wallet_id, state, guard, rpc, host, sessions, permissions: Mutex::new(BTreeMap::new()) }
    }

    pub fn grant(&self, capability: &str) -> Permission {
        let permission = Permission {
            id: uuid::Uuid::new_v4().to_string(),
            parent_capability: capability.to_string(),
            invoker: self.host.origin(),
            caveats: Vec::new(),
            date: chrono::Utc::now().timestamp_millis(),
        };
        self.permissions
            .lock()
            .entry(capability.to_string())
            .or_insert(permission)
            .clone()
    }

    pub fn revoke(&self, capability: &str) -> bool {
        self.permissions.lock().remove(capability).is_some()
    }

    pub fn has_permission(&self, capability: &str) -> bool {
        self.permissions.lock().contains_key(capability)
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.lock().keys().cloned().collect()
    }

    /// Granted permissions; `eth_accounts` carries the currently visible addresses as caveat.
    pub fn permissions(&self, evm_accounts: &[String]) -> Vec<Permission> {
        self.permissions
            .lock()
            .values()
            .cloned()
            .map(|mut p| {
                if p.parent_capability == EVM_ACCOUNTS_PERMISSION {
                    p.caveats = vec![json!({ "type": "restrictReturnedAccounts", "value": evm_accounts })];
                }
                p
            })
            .collect()
    }

    pub fn sessions_enabled(&self) -> bool {
        self.sessions.is_some()
    }

    /// Writes the current connection to the session store, or clears it when nothing is
    /// granted any more.
    pub fn persist_session(&self) -> Result<()> {
        let sessions = match &self.sessions {
            Some(sessions) => sessions,
            None => return Ok(()),
        };
        let permissions = self.permission_names();
        if permissions.is_empty() {
            sessions.clear();
            return Ok(());
        }
        let state = self.state.snapshot();
        let mut accounts = state.evm_addresses();
        accounts.extend(state.solana_addresses());
        let chain_id = match state.chains.active(ChainFamily::Evm) {
            Some(Chain::Evm(chain)) => chain.chain_id_hex.clone(),
            _ => String::new(),
        };
        sessions.create(accounts, chain_id, permissions, &self.host.origin())?;
        Ok(())
    }

    pub fn clear_session(&self) {
        if let Some(sessions) = &self.sessions {
            sessions.clear();
            debug!(wallet = %self.wallet_id, "session cleared");
        }
    }

    /// Loads a stored session for the page's current origin. Sessions naming accounts this
    /// wallet no longer holds are discarded.
    pub fn load_session(&self) -> Option<Session> {
        let sessions = self.sessions.as_ref()?;
        let session = sessions.load(&self.host.origin())?;
        let state = self.state.snapshot();
        let known = session.accounts.iter().any(|address| state.accounts.find_by_address(address).is_some());
        if !known {
            warn!(wallet = %self.wallet_id, "stored session references unknown accounts; discarding");
            sessions.clear();
            return None;
        }
        for capability in &session.permissions {
            self.grant(capability);
        }
        Some(session)
    }
}
