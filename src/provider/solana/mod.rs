//! Wallet Standard provider for Solana.
//!
//! Unlike the EVM side, the connection flag is local to this provider: an app can hold a
//! Solana connection while the EVM provider is disconnected. Trust for silent reconnects
//! comes from the `standard:connect` permission, which survives in the stored session.

pub mod transaction;
pub mod types;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::core::account::{Account, SolanaKeyPair};
use crate::core::chain::SolanaCluster;
use crate::core::config::{AccountConfig, AccountKind};
use crate::core::errors::{Result, WalletError};
use crate::core::events::{EventEmitter, SubscriptionId};
use crate::core::state::WalletState;
use crate::provider::{ProviderContext, SOLANA_CONNECT_PERMISSION};
use crate::security::guard::SensitiveOperation;

pub use transaction::SolanaTransaction;
pub use types::{
    ConnectOptions, ConnectOutput, SendOptions, SignAndSendTransactionInput, SignAndSendTransactionOutput,
    SignMessageInput, SignMessageOutput, SignTransactionInput, SignTransactionOutput, SolanaEvent,
    SolanaEventKind, WalletAccount, FEATURES,
};

#[derive(Debug, Clone)]
pub struct SolanaSettings {
    pub name: String,
    pub icon: String,
    /// Return the locally computed signature instead of submitting.
    pub simulate_transactions: bool,
    /// Endpoint per cluster name, taking precedence over the cluster's own endpoint.
    pub rpc_overrides: HashMap<String, String>,
}

impl Default for SolanaSettings {
    fn default() -> Self {
        Self {
            name: "Headless Wallet".to_string(),
            icon: String::new(),
            simulate_transactions: true,
            rpc_overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Emitted {
    connected: bool,
    accounts: Vec<String>,
    cluster: Option<String>,
}

pub struct SolanaProvider {
    ctx: Arc<ProviderContext>,
    settings: SolanaSettings,
    emitters: HashMap<SolanaEventKind, EventEmitter<SolanaEvent>>,
    emitted: Mutex<Emitted>,
    state_subscription: Mutex<Option<SubscriptionId>>,
}

impl SolanaProvider {
    pub fn new(ctx: Arc<ProviderContext>, settings: SolanaSettings) -> Arc<Self> {
        let cluster = ctx.state.snapshot().chains.active_solana().map(|c| c.name.clone());
        let provider = Arc::new(Self {
            emitters: SolanaEventKind::ALL.iter().map(|k| (*k, EventEmitter::new())).collect(),
            emitted: Mutex::new(Emitted { connected: false, accounts: Vec::new(), cluster }),
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

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn icon(&self) -> &str {
        &self.settings.icon
    }

    pub fn version(&self) -> &'static str {
        "1.0.0"
    }

    pub fn features(&self) -> Vec<String> {
        FEATURES.iter().map(|f| f.to_string()).collect()
    }

    /// Wallet Standard chains of every registered cluster.
    pub fn chains(&self) -> Vec<String> {
        self.ctx.state.snapshot().chains.solana_clusters().map(SolanaCluster::standard_chain).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.emitted.lock().connected
    }

    pub fn simulates_transactions(&self) -> bool {
        self.settings.simulate_transactions
    }

    /// Visible base58 addresses, active account first. Empty while disconnected or locked.
    pub fn addresses(&self) -> Vec<String> {
        Self::visible_addresses(&self.ctx.state.snapshot(), self.is_connected())
    }

    pub fn public_key(&self) -> Option<String> {
        self.addresses().into_iter().next()
    }

    pub fn accounts(&self) -> Vec<WalletAccount> {
        let state = self.ctx.state.snapshot();
        Self::wallet_accounts(&state, &Self::visible_addresses(&state, self.is_connected()))
    }

    fn visible_addresses(state: &WalletState, connected: bool) -> Vec<String> {
        if !connected || state.is_locked {
            return Vec::new();
        }
        let cluster = state.chains.active_solana().map(|c| c.name.clone());
        state
            .ordered_accounts()
            .filter_map(|a| a.solana())
            .filter(|keys| cluster.as_deref().map(|c| keys.supports_cluster(c)).unwrap_or(true))
            .map(|keys| keys.address().to_string())
            .collect()
    }

    fn wallet_accounts(state: &WalletState, addresses: &[String]) -> Vec<WalletAccount> {
        let account_features: Vec<String> =
            FEATURES.iter().filter(|f| f.starts_with("solana:")).map(|f| f.to_string()).collect();
        addresses
            .iter()
            .filter_map(|address| state.accounts.find_by_address(address))
            .filter_map(|account| {
                let keys = account.solana()?;
                Some(WalletAccount {
                    address: keys.address().to_string(),
                    public_key: keys.public_key_bytes().to_vec(),
                    chains: state
                        .chains
                        .solana_clusters()
                        .filter(|c| keys.supports_cluster(&c.name))
                        .map(SolanaCluster::standard_chain)
                        .collect(),
                    features: account_features.clone(),
                    label: account.label.clone(),
                })
            })
            .collect()
    }

    /// `standard:connect`. With `only_if_trusted`, succeeds only for an app that connected
    /// before (4001 otherwise). Creates a Solana account when the wallet has none.
    pub fn connect(&self, options: ConnectOptions) -> Result<ConnectOutput> {
        let snapshot = self.ctx.state.snapshot();
        if snapshot.is_locked {
            return Err(WalletError::Unauthorized("wallet is locked".into()));
        }
        if self.is_connected() {
            return Ok(ConnectOutput { accounts: self.accounts() });
        }
        if options.only_if_trusted && !self.ctx.has_permission(SOLANA_CONNECT_PERMISSION) {
            return Err(WalletError::UserRejected("app is not trusted; connect without onlyIfTrusted".into()));
        }
        self.ctx.guard.assert_safe(SensitiveOperation::Connect)?;

        if snapshot.accounts.list().iter().all(|a| a.solana().is_none()) {
            let account = self
                .ctx
                .state
                .add_account(&AccountConfig::generated(AccountKind::Solana).with_label("Solana"))?;
            info!(wallet = %self.ctx.wallet_id, account = %account.id, "created default Solana account");
        }

        let state = self.ctx.state.snapshot();
        let addresses = Self::visible_addresses(&state, true);
        let public_key = addresses.first().cloned().ok_or_else(|| {
            WalletError::AccountNotFound(format!(
                "no Solana account usable on cluster {}",
                state.chains.active_solana().map(|c| c.name.as_str()).unwrap_or("-")
            ))
        })?;

        self.ctx.grant(SOLANA_CONNECT_PERMISSION);
        let changed = {
            let mut emitted = self.emitted.lock();
            emitted.connected = true;
            emitted.cluster = state.chains.active_solana().map(|c| c.name.clone());
            let changed = emitted.accounts != addresses;
            emitted.accounts = addresses.clone();
            changed
        };
        info!(wallet = %self.ctx.wallet_id, public_key = %public_key, "solana provider connected");
        self.emit(SolanaEvent::Connect { public_key });
        let accounts = Self::wallet_accounts(&state, &addresses);
        if changed {
            self.emit(SolanaEvent::Change { accounts: accounts.clone() });
        }
        self.ctx.persist_session()?;
        Ok(ConnectOutput { accounts })
    }

    /// `standard:disconnect`. Emits `disconnect` then `change` with no accounts.
    pub fn disconnect(&self) -> Result<()> {
        let was_connected = {
            let mut emitted = self.emitted.lock();
            let was = emitted.connected;
            emitted.connected = false;
            emitted.accounts.clear();
            was
        };
        self.ctx.revoke(SOLANA_CONNECT_PERMISSION);
        self.ctx.persist_session()?;
        if was_connected {
            info!(wallet = %self.ctx.wallet_id, "solana provider disconnected");
            self.emit(SolanaEvent::Disconnect);
            self.emit(SolanaEvent::Change { accounts: Vec::new() });
        }
        Ok(())
    }

    /// `solana:signMessage`. All inputs are checked before anything is signed.
    pub async fn sign_message(&self, inputs: Vec<SignMessageInput>) -> Result<Vec<SignMessageOutput>> {
        let accounts = inputs
            .iter()
            .map(|input| self.visible_account(&input.account, None))
            .collect::<Result<Vec<_>>>()?;
        self.ctx.guard.assert_safe(SensitiveOperation::Sign)?;
        inputs
            .into_iter()
            .zip(accounts)
            .map(|(input, account)| {
                let signature = solana_keys(&account)?.sign(&input.message);
                Ok(SignMessageOutput {
                    signed_message: input.message,
                    signature: signature.to_vec(),
                    signature_type: "ed25519".to_string(),
                })
            })
            .collect()
    }

    /// `solana:signTransaction`. Signatures land in each signer's slot; nothing is submitted.
    pub async fn sign_transaction(&self, inputs: Vec<SignTransactionInput>) -> Result<Vec<SignTransactionOutput>> {
        let prepared = inputs
            .iter()
            .map(|input| self.prepare(&input.account, &input.transaction, input.chain.as_deref()))
            .collect::<Result<Vec<_>>>()?;
        self.ctx.guard.assert_safe(SensitiveOperation::Sign)?;
        prepared
            .into_iter()
            .map(|(account, mut tx, _)| {
                tx.sign_with(solana_keys(&account)?)?;
                Ok(SignTransactionOutput { signed_transaction: tx.to_bytes() })
            })
            .collect()
    }

    pub async fn sign_all_transactions(
        &self,
        inputs: Vec<SignTransactionInput>,
    ) -> Result<Vec<SignTransactionOutput>> {
        self.sign_transaction(inputs).await
    }

    /// `solana:signAndSendTransaction`. Submits through `sendTransaction`, or returns the
    /// local signature when simulating.
    pub async fn sign_and_send_transaction(
        &self,
        input: SignAndSendTransactionInput,
    ) -> Result<SignAndSendTransactionOutput> {
        let (account, mut tx, cluster) = self.prepare(&input.account, &input.transaction, input.chain.as_deref())?;
        self.ctx.guard.assert_safe(SensitiveOperation::SendTransaction)?;
        let signature = tx.sign_with(solana_keys(&account)?)?;
        // The transaction id is the fee payer's signature, which may not be ours.
        let local = tx.signature().copied().unwrap_or(signature);
        let local = bs58::encode(local).into_string();

        if self.settings.simulate_transactions {
            info!(wallet = %self.ctx.wallet_id, cluster = %cluster.name, signature = %local, "simulated solana transaction");
            return Ok(SignAndSendTransactionOutput { signature: local });
        }

        let endpoint = self
            .settings
            .rpc_overrides
            .get(&cluster.name)
            .cloned()
            .unwrap_or_else(|| cluster.endpoint.clone());
        self.ctx.guard.assert_safe(SensitiveOperation::NetworkCall)?;
        let mut config = serde_json::to_value(input.options.unwrap_or_default())?;
        config["encoding"] = json!("base64");
        let result = self
            .ctx
            .rpc
            .request(&endpoint, "sendTransaction", json!([BASE64.encode(tx.to_bytes()), config]))
            .await?;
        let signature = result.as_str().map(str::to_string).unwrap_or(local);
        info!(wallet = %self.ctx.wallet_id, cluster = %cluster.name, signature = %signature, "submitted solana transaction");
        Ok(SignAndSendTransactionOutput { signature })
    }

    /// Phantom-style JSON surface used by the bridge.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        debug!(wallet = %self.ctx.wallet_id, method, "solana request");
        let params = params.unwrap_or(Value::Null);
        match method {
            "connect" => {
                let options: ConnectOptions =
                    if params.is_null() { ConnectOptions::default() } else { serde_json::from_value(params)? };
                self.connect(options)?;
                Ok(json!({ "publicKey": self.public_key() }))
            }
            "disconnect" => {
                self.disconnect()?;
                Ok(Value::Null)
            }
            "getAccounts" => Ok(json!(self.addresses())),
            "signMessage" => {
                let account = self.default_address()?;
                let message = decode_bytes(field(&params, &["message"])?)?;
                let output = self.sign_message(vec![SignMessageInput { account: account.clone(), message }]).await?;
                let signature = output.first().map(|o| bs58::encode(&o.signature).into_string());
                Ok(json!({ "publicKey": account, "signature": signature }))
            }
            "signTransaction" => {
                let account = self.default_address()?;
                let bytes = transaction_param(&params)?;
                let (signed, signature) = self.sign_for_request(&account, &bytes)?;
                Ok(json!({
                    "publicKey": account,
                    "signature": bs58::encode(signature).into_string(),
                    "transaction": bs58::encode(signed).into_string(),
                }))
            }
            "signAllTransactions" => {
                let account = self.default_address()?;
                let decoded = transactions_param(&params)?;
                for bytes in &decoded {
                    self.prepare(&account, bytes, None)?;
                }
                let mut signatures = Vec::with_capacity(decoded.len());
                let mut transactions = Vec::with_capacity(decoded.len());
                for bytes in &decoded {
                    let (signed, signature) = self.sign_for_request(&account, bytes)?;
                    signatures.push(bs58::encode(signature).into_string());
                    transactions.push(bs58::encode(signed).into_string());
                }
                Ok(json!({ "publicKey": account, "signatures": signatures, "transactions": transactions }))
            }
            "signAndSendTransaction" => {
                let account = self.default_address()?;
                let transaction = transaction_param(&params)?;
                let options = match params.get("options") {
                    Some(raw) if !raw.is_null() => Some(serde_json::from_value::<SendOptions>(raw.clone())?),
                    _ => None,
                };
                let output = self
                    .sign_and_send_transaction(SignAndSendTransactionInput {
                        account: account.clone(),
                        transaction,
                        chain: None,
                        options,
                    })
                    .await?;
                Ok(json!({ "publicKey": account, "signature": output.signature }))
            }
            other => Err(WalletError::UnsupportedMethod(other.to_string())),
        }
    }

    pub fn on<F>(&self, kind: SolanaEventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&SolanaEvent) + Send + Sync + 'static,
    {
        self.emitters[&kind].subscribe(listener)
    }

    pub fn remove_listener(&self, kind: SolanaEventKind, id: SubscriptionId) -> bool {
        self.emitters[&kind].unsubscribe(id)
    }

    pub fn listener_count(&self, kind: SolanaEventKind) -> usize {
        self.emitters[&kind].listener_count()
    }

    fn emit(&self, event: SolanaEvent) {
        self.emitters[&event.kind()].emit(&event);
    }

    fn sync_with_state(&self, state: &WalletState) {
        let cluster = state.chains.active_solana().map(|c| c.name.clone());
        let event = {
            let mut emitted = self.emitted.lock();
            let addresses = Self::visible_addresses(state, emitted.connected);
            let changed = emitted.connected && (addresses != emitted.accounts || cluster != emitted.cluster);
            emitted.accounts = addresses.clone();
            emitted.cluster = cluster;
            changed.then(|| SolanaEvent::Change { accounts: Self::wallet_accounts(state, &addresses) })
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn default_address(&self) -> Result<String> {
        self.public_key()
            .ok_or_else(|| WalletError::AccountNotFound("no connected Solana account".into()))
    }

    /// Cluster named by a Wallet Standard chain id, or the active cluster.
    fn resolve_cluster(state: &WalletState, chain: Option<&str>) -> Result<SolanaCluster> {
        match chain {
            None => state
                .chains
                .active_solana()
                .cloned()
                .ok_or_else(|| WalletError::ChainNotFound("no active Solana cluster".into())),
            Some(chain) => state
                .chains
                .solana_clusters()
                .find(|c| c.standard_chain() == chain || format!("solana:{}", c.name) == chain)
                .cloned()
                .ok_or_else(|| WalletError::UnsupportedChain(chain.to_string())),
        }
    }

    fn visible_account(&self, address: &str, cluster: Option<&SolanaCluster>) -> Result<Account> {
        let state = self.ctx.state.snapshot();
        if !Self::visible_addresses(&state, self.is_connected()).iter().any(|a| a == address) {
            return Err(WalletError::AccountNotFound(address.to_string()));
        }
        let account = state
            .accounts
            .find_by_address(address)
            .cloned()
            .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))?;
        if let Some(cluster) = cluster {
            if !solana_keys(&account)?.supports_cluster(&cluster.name) {
                return Err(WalletError::AccountNotFound(format!("{} on {}", address, cluster.name)));
            }
        }
        Ok(account)
    }

    fn prepare(
        &self,
        address: &str,
        transaction: &[u8],
        chain: Option<&str>,
    ) -> Result<(Account, SolanaTransaction, SolanaCluster)> {
        let cluster = Self::resolve_cluster(&self.ctx.state.snapshot(), chain)?;
        let account = self.visible_account(address, Some(&cluster))?;
        let tx = SolanaTransaction::from_bytes(transaction)?;
        tx.signer_slot(&solana_keys(&account)?.public_key_bytes())?;
        Ok((account, tx, cluster))
    }

    fn sign_for_request(&self, address: &str, transaction: &[u8]) -> Result<(Vec<u8>, [u8; 64])> {
        let (account, mut tx, _) = self.prepare(address, transaction, None)?;
        self.ctx.guard.assert_safe(SensitiveOperation::Sign)?;
        let signature = tx.sign_with(solana_keys(&account)?)?;
        Ok((tx.to_bytes(), signature))
    }
}

impl Drop for SolanaProvider {
    fn drop(&mut self) {
        if let Some(id) = self.state_subscription.lock().take() {
            self.ctx.state.unsubscribe(id);
        }
    }
}

fn solana_keys(account: &Account) -> Result<&SolanaKeyPair> {
    account
        .solana()
        .ok_or_else(|| WalletError::AccountNotFound(format!("account {} has no Solana key", account.id)))
}

fn field<'v>(params: &'v Value, names: &[&str]) -> Result<&'v Value> {
    names
        .iter()
        .find_map(|name| params.get(*name))
        .ok_or_else(|| WalletError::InvalidParams(format!("missing parameter '{}'", names[0])))
}

/// A serialized transaction under `transaction`, or a bare message under `message` that
/// gets empty signature slots.
fn transaction_param(params: &Value) -> Result<Vec<u8>> {
    if let Some(transaction) = params.get("transaction") {
        return decode_bytes(transaction);
    }
    let message = decode_bytes(field(params, &["transaction", "message"])?)?;
    Ok(SolanaTransaction::unsigned(message)?.to_bytes())
}

fn transactions_param(params: &Value) -> Result<Vec<Vec<u8>>> {
    let as_list = |value: &Value| -> Result<Vec<Vec<u8>>> {
        value
            .as_array()
            .ok_or_else(|| WalletError::InvalidParams("expected an array of transactions".into()))?
            .iter()
            .map(decode_bytes)
            .collect()
    };
    if let Some(transactions) = params.get("transactions") {
        return as_list(transactions);
    }
    as_list(field(params, &["transactions", "messages"])?)?
        .into_iter()
        .map(|message| SolanaTransaction::unsigned(message).map(|tx| tx.to_bytes()))
        .collect()
}

/// Byte payloads arrive as JSON byte arrays or base58 strings.
fn decode_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(encoded) => bs58::decode(encoded)
            .into_vec()
            .map_err(|_| WalletError::InvalidParams("payload is not valid base58".into())),
        Value::Array(_) => Ok(serde_json::from_value(value.clone())?),
        _ => Err(WalletError::InvalidParams("expected a base58 string or byte array".into())),
    }
}
