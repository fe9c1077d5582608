//! EVM signing primitives on top of `ethers`.

use ethers::signers::Signer;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, NameOrAddress, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use serde_json::Value;
use std::str::FromStr;

use crate::core::account::EvmKeyPair;
use crate::core::errors::{Result, WalletError};
use crate::provider::evm::types::TransactionParams;

/// Accepts `0x` hex, decimal strings and JSON numbers.
pub fn parse_quantity(value: &Value) -> Result<U256> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| WalletError::InvalidParams(format!("invalid quantity {}", n))),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some("") => Ok(U256::zero()),
                Some(hex) => U256::from_str_radix(hex, 16)
                    .map_err(|_| WalletError::InvalidParams(format!("invalid hex quantity {}", s))),
                None => U256::from_dec_str(s)
                    .map_err(|_| WalletError::InvalidParams(format!("invalid quantity {}", s))),
            }
        }
        other => Err(WalletError::InvalidParams(format!("invalid quantity {}", other))),
    }
}

pub fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|_| WalletError::InvalidParams(format!("invalid address {}", value)))
}

pub fn is_address_like(value: &str) -> bool {
    let body = match value.strip_prefix("0x") {
        Some(body) => body,
        None => return false,
    };
    body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit())
}

/// `personal_sign` payloads are hex when `0x`-prefixed and valid, UTF-8 text otherwise.
pub fn decode_message(raw: &str) -> Vec<u8> {
    if let Some(body) = raw.strip_prefix("0x") {
        if body.len() % 2 == 0 {
            if let Ok(bytes) = hex::decode(body) {
                return bytes;
            }
        }
    }
    raw.as_bytes().to_vec()
}

fn signature_hex(sig: &ethers::types::Signature) -> String {
    format!("0x{}", hex::encode(sig.to_vec()))
}

/// EIP-191 `personal_sign`.
pub async fn personal_sign(keys: &EvmKeyPair, chain_id: u64, message: &[u8]) -> Result<String> {
    let wallet = keys.signer(chain_id)?;
    let sig = wallet
        .sign_message(message)
        .await
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    Ok(signature_hex(&sig))
}

/// `eth_sign`: signs a 32-byte digest without any prefix.
pub fn sign_digest(keys: &EvmKeyPair, chain_id: u64, digest: &[u8]) -> Result<String> {
    if digest.len() != 32 {
        return Err(WalletError::InvalidParams(format!(
            "eth_sign expects a 32-byte hash, got {} bytes",
            digest.len()
        )));
    }
    let wallet = keys.signer(chain_id)?;
    let sig = wallet
        .sign_hash(H256::from_slice(digest))
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    Ok(signature_hex(&sig))
}

/// EIP-712 structured data. The domain's `chainId`, when present, must equal `chain_id`.
pub async fn sign_typed_data(keys: &EvmKeyPair, chain_id: u64, payload: &Value) -> Result<String> {
    let typed: TypedData = match payload {
        Value::String(raw) => serde_json::from_str(raw)?,
        Value::Object(_) => serde_json::from_value(payload.clone())?,
        Value::Array(_) => {
            return Err(WalletError::InvalidParams("legacy (v1) typed data is not supported".into()))
        }
        other => return Err(WalletError::InvalidParams(format!("invalid typed data {}", other))),
    };
    if let Some(domain_chain) = typed.domain.chain_id {
        if domain_chain != U256::from(chain_id) {
            return Err(WalletError::InvalidParams(format!(
                "typed data chainId {} does not match active chain {}",
                domain_chain, chain_id
            )));
        }
    }
    let wallet = keys.signer(chain_id)?;
    let sig = wallet
        .sign_typed_data(&typed)
        .await
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    Ok(signature_hex(&sig))
}

/// Gas and fee values resolved before signing.
#[derive(Debug, Clone)]
pub struct FeeFields {
    pub gas: U256,
    pub nonce: U256,
    pub fees: Fees,
}

#[derive(Debug, Clone)]
pub enum Fees {
    Legacy { gas_price: U256 },
    Eip1559 { max_fee_per_gas: U256, max_priority_fee_per_gas: U256 },
}

pub const DEFAULT_TRANSFER_GAS: u64 = 21_000;
pub const DEFAULT_CALL_GAS: u64 = 300_000;
pub const DEFAULT_PRIORITY_FEE: u64 = 1_500_000_000;
pub const DEFAULT_MAX_FEE: u64 = 30_000_000_000;

pub fn default_gas(params: &TransactionParams) -> U256 {
    let has_data = params.data.as_deref().map(|d| d != "0x" && !d.is_empty()).unwrap_or(false);
    if has_data || params.to.is_none() {
        U256::from(DEFAULT_CALL_GAS)
    } else {
        U256::from(DEFAULT_TRANSFER_GAS)
    }
}

/// Builds the typed transaction for `params` on `chain_id`.
pub fn build_transaction(params: &TransactionParams, chain_id: u64, fields: &FeeFields) -> Result<TypedTransaction> {
    let from = parse_address(&params.from)?;
    let to = params.to.as_deref().map(parse_address).transpose()?;
    let value = params.value.as_ref().map(parse_quantity).transpose()?.unwrap_or_default();
    let data = match params.data.as_deref() {
        Some(raw) => Bytes::from(crate::core::validation::parse_prefixed_hex(raw)?),
        None => Bytes::default(),
    };

    let tx: TypedTransaction = match fields.fees {
        Fees::Legacy { gas_price } => {
            let mut tx = TransactionRequest::new()
                .from(from)
                .value(value)
                .data(data)
                .gas(fields.gas)
                .gas_price(gas_price)
                .nonce(fields.nonce)
                .chain_id(chain_id);
            if let Some(to) = to {
                tx = tx.to(NameOrAddress::Address(to));
            }
            tx.into()
        }
        Fees::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas } => {
            let mut tx = Eip1559TransactionRequest::new()
                .from(from)
                .value(value)
                .data(data)
                .gas(fields.gas)
                .max_fee_per_gas(max_fee_per_gas)
                .max_priority_fee_per_gas(max_priority_fee_per_gas)
                .nonce(fields.nonce)
                .chain_id(chain_id);
            if let Some(to) = to {
                tx = tx.to(NameOrAddress::Address(to));
            }
            tx.into()
        }
    };
    Ok(tx)
}

/// Signs and RLP-encodes; returns the raw transaction and its hash.
pub async fn sign_transaction(keys: &EvmKeyPair, chain_id: u64, tx: &TypedTransaction) -> Result<(Bytes, H256)> {
    let wallet = keys.signer(chain_id)?;
    let sig = wallet
        .sign_transaction(tx)
        .await
        .map_err(|e| WalletError::InvalidTransaction(format!("signing failed: {}", e)))?;
    let raw = tx.rlp_signed(&sig);
    let hash = H256::from(keccak256(&raw));
    Ok((raw, hash))
}
