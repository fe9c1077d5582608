//! `request` method table.
//!
//! Each entry maps a JSON-RPC method name to a handler returning a boxed future. Names not
//! in the table are answered with `UnsupportedMethod` (4200) by the caller.

use ethers::types::U256;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::info;

use super::signing::{self, FeeFields, Fees};
use super::types::{AddChainParams, SwitchChainParams, TransactionParams, WatchAssetParams, WatchedAsset};
use super::EvmProvider;
use crate::core::account::Account;
use crate::core::chain::{ChainId, EvmChain, NativeCurrency};
use crate::core::errors::{Result, WalletError};
use crate::core::validation::{is_canonical_chain_id_hex, parse_chain_id, parse_prefixed_hex, validate_ethereum_address};
use crate::provider::EVM_ACCOUNTS_PERMISSION;
use crate::security::guard::SensitiveOperation;

pub(super) type Handler = for<'a> fn(&'a EvmProvider, Option<Value>) -> BoxFuture<'a, Result<Value>>;

macro_rules! passthrough {
    ($($handler:ident => $method:literal),* $(,)?) => {
        $(
            fn $handler(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
                Box::pin(forward(p, $method, params))
            }
        )*
    };
}

passthrough! {
    eth_get_balance => "eth_getBalance",
    eth_block_number => "eth_blockNumber",
    eth_get_transaction_count => "eth_getTransactionCount",
    eth_gas_price => "eth_gasPrice",
    eth_estimate_gas => "eth_estimateGas",
    eth_call => "eth_call",
    eth_get_transaction_receipt => "eth_getTransactionReceipt",
    eth_get_transaction_by_hash => "eth_getTransactionByHash",
    eth_get_block_by_number => "eth_getBlockByNumber",
    eth_fee_history => "eth_feeHistory",
    eth_max_priority_fee_per_gas => "eth_maxPriorityFeePerGas",
}

static HANDLERS: Lazy<HashMap<&'static str, Handler>> = Lazy::new(|| {
    let entries: [(&'static str, Handler); 29] = [
        ("eth_requestAccounts", eth_request_accounts),
        ("eth_accounts", eth_accounts),
        ("eth_chainId", eth_chain_id),
        ("net_version", net_version),
        ("eth_coinbase", eth_coinbase),
        ("personal_sign", personal_sign),
        ("eth_sign", eth_sign),
        ("eth_signTypedData", eth_sign_typed_data),
        ("eth_signTypedData_v3", eth_sign_typed_data),
        ("eth_signTypedData_v4", eth_sign_typed_data),
        ("eth_sendTransaction", eth_send_transaction),
        ("eth_signTransaction", eth_sign_transaction),
        ("wallet_switchEthereumChain", wallet_switch_ethereum_chain),
        ("wallet_addEthereumChain", wallet_add_ethereum_chain),
        ("wallet_getPermissions", wallet_get_permissions),
        ("wallet_requestPermissions", wallet_request_permissions),
        ("wallet_revokePermissions", wallet_revoke_permissions),
        ("wallet_watchAsset", wallet_watch_asset),
        ("eth_getBalance", eth_get_balance),
        ("eth_blockNumber", eth_block_number),
        ("eth_getTransactionCount", eth_get_transaction_count),
        ("eth_gasPrice", eth_gas_price),
        ("eth_estimateGas", eth_estimate_gas),
        ("eth_call", eth_call),
        ("eth_getTransactionReceipt", eth_get_transaction_receipt),
        ("eth_getTransactionByHash", eth_get_transaction_by_hash),
        ("eth_getBlockByNumber", eth_get_block_by_number),
        ("eth_feeHistory", eth_fee_history),
        ("eth_maxPriorityFeePerGas", eth_max_priority_fee_per_gas),
    ];
    entries.into_iter().collect()
});

/// Every method `request` understands.
pub static SUPPORTED_METHODS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut names: Vec<&'static str> = HANDLERS.keys().copied().collect();
    names.sort_unstable();
    names
});

pub(super) fn handler(method: &str) -> Option<Handler> {
    HANDLERS.get(method).copied()
}

fn params_array(params: Option<Value>) -> Vec<Value> {
    match params {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}

fn param_at<T: DeserializeOwned>(params: &[Value], index: usize, name: &str) -> Result<T> {
    let value = params
        .get(index)
        .cloned()
        .ok_or_else(|| WalletError::InvalidParams(format!("missing parameter '{}'", name)))?;
    serde_json::from_value(value).map_err(|e| WalletError::InvalidParams(format!("invalid '{}': {}", name, e)))
}

fn str_at<'v>(params: &'v [Value], index: usize, name: &str) -> Result<&'v str> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| WalletError::InvalidParams(format!("parameter '{}' must be a string", name)))
}

/// Resolves `address` to one of the accounts currently exposed to the dApp.
/// Runs before any key material is touched.
fn authorized_account(p: &EvmProvider, address: &str) -> Result<Account> {
    if !signing::is_address_like(address) {
        return Err(WalletError::InvalidParams(format!("invalid address {}", address)));
    }
    if !p.accounts().iter().any(|a| a.eq_ignore_ascii_case(address)) {
        return Err(WalletError::Unauthorized(format!(
            "the requested account {} has not been authorized",
            address
        )));
    }
    p.context()
        .state
        .snapshot()
        .accounts
        .find_by_address(address)
        .filter(|a| a.evm().is_some())
        .cloned()
        .ok_or_else(|| WalletError::AccountNotFound(address.to_string()))
}

fn evm_keys(account: &Account) -> Result<&crate::core::account::EvmKeyPair> {
    account
        .evm()
        .ok_or_else(|| WalletError::AccountNotFound(format!("account {} has no EVM key", account.id)))
}

async fn forward(p: &EvmProvider, method: &'static str, params: Option<Value>) -> Result<Value> {
    let chain_id = p.chain_id()?;
    let endpoint = p
        .endpoint_for(chain_id)
        .ok_or_else(|| WalletError::Network(format!("no RPC endpoint configured for chain {}", chain_id)))?;
    p.context().guard.assert_safe(SensitiveOperation::NetworkCall)?;
    let params = params.unwrap_or_else(|| json!([]));
    p.context().rpc.request(&endpoint, method, params).await
}

async fn rpc_call(p: &EvmProvider, endpoint: &str, method: &str, params: Value) -> Result<Value> {
    p.context().guard.assert_safe(SensitiveOperation::NetworkCall)?;
    p.context().rpc.request(endpoint, method, params).await
}

fn eth_request_accounts(p: &EvmProvider, _params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { Ok(json!(p.connect()?)) })
}

fn eth_accounts(p: &EvmProvider, _params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { Ok(json!(p.accounts())) })
}

fn eth_chain_id(p: &EvmProvider, _params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { Ok(json!(p.chain_id_hex()?)) })
}

fn net_version(p: &EvmProvider, _params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { Ok(json!(p.chain_id()?.to_string())) })
}

fn eth_coinbase(p: &EvmProvider, _params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { Ok(p.accounts().into_iter().next().map(Value::String).unwrap_or(Value::Null)) })
}

fn personal_sign(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let params = params_array(params);
        let first = str_at(&params, 0, "message")?;
        let second = str_at(&params, 1, "address")?;
        // Standard order is [message, address]; some dApps send [address, message].
        let knows = |addr: &str| p.accounts().iter().any(|a| a.eq_ignore_ascii_case(addr));
        let (message, address) = if signing::is_address_like(second)
            && (!signing::is_address_like(first) || knows(second))
        {
            (first, second)
        } else if signing::is_address_like(first) {
            (second, first)
        } else {
            return Err(WalletError::InvalidParams("personal_sign expects [message, address]".into()));
        };

        let account = authorized_account(p, address)?;
        p.context().guard.assert_safe(SensitiveOperation::Sign)?;
        let chain_id = p.chain_id()?;
        let signature = signing::personal_sign(evm_keys(&account)?, chain_id, &signing::decode_message(message)).await?;
        Ok(json!(signature))
    })
}

fn eth_sign(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let params = params_array(params);
        let address = str_at(&params, 0, "address")?;
        let digest = parse_prefixed_hex(str_at(&params, 1, "hash")?)?;
        let account = authorized_account(p, address)?;
        p.context().guard.assert_safe(SensitiveOperation::Sign)?;
        let signature = signing::sign_digest(evm_keys(&account)?, p.chain_id()?, &digest)?;
        Ok(json!(signature))
    })
}

fn eth_sign_typed_data(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let params = params_array(params);
        let address = str_at(&params, 0, "address")?;
        let payload = params
            .get(1)
            .ok_or_else(|| WalletError::InvalidParams("missing parameter 'typedData'".into()))?;
        let account = authorized_account(p, address)?;
        p.context().guard.assert_safe(SensitiveOperation::Sign)?;
        let signature = signing::sign_typed_data(evm_keys(&account)?, p.chain_id()?, payload).await?;
        Ok(json!(signature))
    })
}

struct SignedTransaction {
    raw: ethers::types::Bytes,
    hash: ethers::types::H256,
    from: String,
    chain_id: u64,
    nonce: u64,
    endpoint: Option<String>,
}

async fn sign_transaction_request(
    p: &EvmProvider,
    params: Option<Value>,
    operation: SensitiveOperation,
) -> Result<SignedTransaction> {
    let params = params_array(params);
    let tx: TransactionParams = param_at(&params, 0, "transaction")?;
    let account = authorized_account(p, &tx.from)?;
    let chain_id = p.chain_id()?;
    if let Some(requested) = &tx.chain_id {
        if signing::parse_quantity(requested)? != U256::from(chain_id) {
            return Err(WalletError::InvalidParams(format!(
                "transaction chainId does not match active chain {}",
                chain_id
            )));
        }
    }
    p.context().guard.assert_safe(operation)?;

    let endpoint = if p.simulates_transactions() { None } else { p.endpoint_for(chain_id) };

    let nonce = match (&tx.nonce, &endpoint) {
        (Some(nonce), _) => nonce_from(signing::parse_quantity(nonce)?)?,
        (None, Some(url)) => {
            let count = rpc_call(p, url, "eth_getTransactionCount", json!([tx.from, "pending"])).await?;
            nonce_from(signing::parse_quantity(&count)?)?
        }
        (None, None) => p.next_local_nonce(&tx.from, chain_id),
    };

    let gas = match (&tx.gas, &endpoint) {
        (Some(gas), _) => signing::parse_quantity(gas)?,
        (None, Some(url)) => {
            let mut call = Map::new();
            call.insert("from".into(), json!(tx.from));
            if let Some(to) = &tx.to {
                call.insert("to".into(), json!(to));
            }
            if let Some(value) = &tx.value {
                call.insert("value".into(), value.clone());
            }
            if let Some(data) = &tx.data {
                call.insert("data".into(), json!(data));
            }
            let estimate = rpc_call(p, url, "eth_estimateGas", json!([Value::Object(call)])).await?;
            signing::parse_quantity(&estimate)?
        }
        (None, None) => signing::default_gas(&tx),
    };

    let fees = match &tx.gas_price {
        Some(price) => Fees::Legacy { gas_price: signing::parse_quantity(price)? },
        None => {
            let priority = match (&tx.max_priority_fee_per_gas, &endpoint) {
                (Some(v), _) => signing::parse_quantity(v)?,
                (None, Some(url)) => {
                    signing::parse_quantity(&rpc_call(p, url, "eth_maxPriorityFeePerGas", json!([])).await?)?
                }
                (None, None) => U256::from(signing::DEFAULT_PRIORITY_FEE),
            };
            let max_fee = match (&tx.max_fee_per_gas, &endpoint) {
                (Some(v), _) => signing::parse_quantity(v)?,
                (None, Some(url)) => {
                    let base = signing::parse_quantity(&rpc_call(p, url, "eth_gasPrice", json!([])).await?)?;
                    base.checked_mul(U256::from(2u8)).and_then(|fee| fee.checked_add(priority)).ok_or_else(|| {
                        WalletError::InvalidTransaction("fee estimate overflows 256 bits".into())
                    })?
                }
                (None, None) => U256::from(signing::DEFAULT_MAX_FEE).max(priority),
            };
            if max_fee < priority {
                return Err(WalletError::InvalidTransaction(
                    "maxFeePerGas is lower than maxPriorityFeePerGas".into(),
                ));
            }
            Fees::Eip1559 { max_fee_per_gas: max_fee, max_priority_fee_per_gas: priority }
        }
    };

    let typed = signing::build_transaction(&tx, chain_id, &FeeFields { gas, nonce: U256::from(nonce), fees })?;
    let (raw, hash) = signing::sign_transaction(evm_keys(&account)?, chain_id, &typed).await?;
    Ok(SignedTransaction { raw, hash, from: tx.from, chain_id, nonce, endpoint })
}

/// Account nonces are 64-bit; larger values cannot be committed to a transaction.
fn nonce_from(value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(WalletError::InvalidParams(format!("nonce {} exceeds 2^64 - 1", value)));
    }
    Ok(value.as_u64())
}

fn eth_send_transaction(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let signed = sign_transaction_request(p, params, SensitiveOperation::SendTransaction).await?;
        let raw_hex = format!("0x{}", hex::encode(&signed.raw));
        let local_hash = format!("{:?}", signed.hash);

        let result = if p.simulates_transactions() {
            json!(local_hash)
        } else {
            let endpoint = signed.endpoint.as_deref().ok_or_else(|| {
                WalletError::Network(format!("no RPC endpoint to broadcast on chain {}", signed.chain_id))
            })?;
            rpc_call(p, endpoint, "eth_sendRawTransaction", json!([raw_hex])).await?
        };
        p.record_nonce(&signed.from, signed.chain_id, signed.nonce);
        info!(
            from = %signed.from,
            chain = signed.chain_id,
            nonce = signed.nonce,
            simulated = p.simulates_transactions(),
            "transaction submitted"
        );
        Ok(result)
    })
}

fn eth_sign_transaction(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let signed = sign_transaction_request(p, params, SensitiveOperation::Sign).await?;
        Ok(json!(format!("0x{}", hex::encode(&signed.raw))))
    })
}

fn wallet_switch_ethereum_chain(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let params = params_array(params);
        let request: SwitchChainParams = param_at(&params, 0, "chain")?;
        let chain_id = parse_chain_id(&request.chain_id)
            .map_err(|_| WalletError::InvalidParams(format!("invalid chainId {}", request.chain_id)))?;
        let state = &p.context().state;
        if state.snapshot().chains.get_evm(chain_id).is_none() {
            return Err(WalletError::ChainNotFound(format!(
                "Unrecognized chain ID \"{}\". Try adding the chain using wallet_addEthereumChain first.",
                request.chain_id
            )));
        }
        state.switch_chain(&ChainId::Evm(chain_id))?;
        Ok(Value::Null)
    })
}

fn wallet_add_ethereum_chain(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let params = params_array(params);
        let request: AddChainParams = param_at(&params, 0, "chain")?;
        if !is_canonical_chain_id_hex(&request.chain_id) {
            return Err(WalletError::InvalidParams(format!(
                "chainId must be a 0x-prefixed hex string without leading zeros, got {}",
                request.chain_id
            )));
        }
        let chain_id = parse_chain_id(&request.chain_id)?;
        if request.chain_name.trim().is_empty() {
            return Err(WalletError::InvalidParams("chainName is required".into()));
        }
        let rpc_urls: Vec<String> = request
            .rpc_urls
            .iter()
            .filter(|u| u.starts_with("https://") || u.starts_with("http://"))
            .cloned()
            .collect();
        let state = &p.context().state;
        let known = state.snapshot().chains.get_evm(chain_id).is_some();
        if !known && rpc_urls.is_empty() {
            return Err(WalletError::InvalidParams("rpcUrls must contain at least one http(s) URL".into()));
        }

        let currency = match &request.native_currency {
            Some(c) if c.symbol.is_empty() || c.symbol.len() > 6 => {
                return Err(WalletError::InvalidParams(format!("invalid nativeCurrency symbol {}", c.symbol)))
            }
            Some(c) => NativeCurrency::new(&c.name, &c.symbol, c.decimals),
            None => NativeCurrency::ether(),
        };
        let mut chain = EvmChain::new(chain_id, request.chain_name.trim(), currency);
        chain.rpc_urls = rpc_urls;
        for url in &request.block_explorer_urls {
            chain = chain.with_explorer(&request.chain_name, url);
        }
        let added = state.upsert_evm_chain(chain)?;
        info!(chain = chain_id, added, "wallet_addEthereumChain");
        state.switch_chain(&ChainId::Evm(chain_id))?;
        Ok(Value::Null)
    })
}

fn evm_permissions(p: &EvmProvider) -> Value {
    let permissions: Vec<_> = p
        .context()
        .permissions(&p.accounts())
        .into_iter()
        .filter(|perm| perm.parent_capability == EVM_ACCOUNTS_PERMISSION)
        .collect();
    json!(permissions)
}

fn requested_capabilities(params: Option<Value>) -> Result<Vec<String>> {
    let params = params_array(params);
    let object = params
        .first()
        .and_then(Value::as_object)
        .ok_or_else(|| WalletError::InvalidParams("expected a permission request object".into()))?;
    if object.is_empty() {
        return Err(WalletError::InvalidParams("permission request is empty".into()));
    }
    object
        .keys()
        .map(|name| {
            if name == EVM_ACCOUNTS_PERMISSION {
                Ok(name.clone())
            } else {
                Err(WalletError::InvalidParams(format!("unsupported permission {}", name)))
            }
        })
        .collect()
}

fn wallet_get_permissions(p: &EvmProvider, _params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move { Ok(evm_permissions(p)) })
}

fn wallet_request_permissions(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        requested_capabilities(params)?;
        p.connect()?;
        Ok(evm_permissions(p))
    })
}

fn wallet_revoke_permissions(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        requested_capabilities(params)?;
        p.disconnect()?;
        Ok(Value::Null)
    })
}

fn wallet_watch_asset(p: &EvmProvider, params: Option<Value>) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        let params = params_array(params);
        let request: WatchAssetParams = param_at(&params, 0, "asset")?;
        if !request.kind.eq_ignore_ascii_case("ERC20") {
            return Err(WalletError::InvalidParams(format!("asset type {} is not supported", request.kind)));
        }
        validate_ethereum_address(&request.options.address)?;
        let symbol_len = request.options.symbol.chars().count();
        if symbol_len == 0 || symbol_len > 11 {
            return Err(WalletError::InvalidParams("symbol must be 1 to 11 characters".into()));
        }
        if request.options.decimals > 36 {
            return Err(WalletError::InvalidParams("decimals must be at most 36".into()));
        }
        p.record_asset(WatchedAsset { chain_id: p.chain_id()?, options: request.options });
        Ok(json!(true))
    })
}
