//! Account store: key material and derived addresses.
//!
//! Accounts are a tagged union over EVM-only, Solana-only and dual-chain key payloads.
//! Key bytes live in [`SecretBytes`], so they are wiped when the last clone of an account
//! drops and never show up in `Debug` output.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer as _, SigningKey};
use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::Address;
use rand::rngs::OsRng;
use secrecy::ExposeSecret;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::core::config::{AccountConfig, AccountKind};
use crate::core::errors::{Result, WalletError};
use crate::security::memory_protection::SecretBytes;

/// secp256k1 key and its EIP-55 address.
pub struct EvmKeyPair {
    secret: SecretBytes<32>,
    address: Address,
    checksum_address: String,
    chain_ids: Vec<u64>,
}

impl EvmKeyPair {
    pub fn from_private_key(raw: &str, chain_ids: Vec<u64>) -> Result<Self> {
        let body = raw.trim();
        let body = body.strip_prefix("0x").unwrap_or(body);
        if body.len() != 64 {
            return Err(WalletError::InvalidAccountFormat(
                "EVM private key must be 32 bytes of hex".to_string(),
            ));
        }
        let decoded = Zeroizing::new(hex::decode(body).map_err(|_| {
            WalletError::InvalidAccountFormat("EVM private key is not valid hex".to_string())
        })?);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Self::from_bytes(SecretBytes::new(bytes), chain_ids)
    }

    pub fn generate(chain_ids: Vec<u64>) -> Result<Self> {
        let key = k256::SecretKey::random(&mut OsRng);
        let bytes: [u8; 32] = key.to_bytes().into();
        Self::from_bytes(SecretBytes::new(bytes), chain_ids)
    }

    fn from_bytes(secret: SecretBytes<32>, chain_ids: Vec<u64>) -> Result<Self> {
        let address = secret.with_secret(|bytes| {
            k256::SecretKey::from_slice(bytes).map_err(|_| {
                WalletError::InvalidAccountFormat(
                    "EVM private key is outside the secp256k1 range".to_string(),
                )
            })?;
            LocalWallet::from_bytes(bytes)
                .map(|wallet| wallet.address())
                .map_err(|e| WalletError::InvalidAccountFormat(e.to_string()))
        })?;
        let checksum_address = ethers::utils::to_checksum(&address, None);
        Ok(Self { secret, address, checksum_address, chain_ids })
    }

    /// EIP-55 checksummed address.
    pub fn address(&self) -> &str {
        &self.checksum_address
    }

    pub fn h160(&self) -> Address {
        self.address
    }

    pub fn chain_ids(&self) -> &[u64] {
        &self.chain_ids
    }

    /// Empty chain list means the key is usable on every chain.
    pub fn supports_chain(&self, chain_id: u64) -> bool {
        self.chain_ids.is_empty() || self.chain_ids.contains(&chain_id)
    }

    pub(crate) fn signer(&self, chain_id: u64) -> Result<LocalWallet> {
        self.secret.with_secret(|bytes| {
            LocalWallet::from_bytes(bytes)
                .map(|wallet| wallet.with_chain_id(chain_id))
                .map_err(|e| WalletError::Internal(format!("Failed to build signer: {}", e)))
        })
    }
}

/// ed25519 seed and its base58 public key.
pub struct SolanaKeyPair {
    secret: SecretBytes<32>,
    public_key: [u8; 32],
    address: String,
    clusters: Vec<String>,
}

impl SolanaKeyPair {
    /// Accepts base58, hex or a JSON byte array of a 32-byte seed or 64-byte keypair.
    pub fn from_secret_key(raw: &str, clusters: Vec<String>) -> Result<Self> {
        let raw = raw.trim();
        let decoded: Zeroizing<Vec<u8>> = Zeroizing::new(if raw.starts_with('[') {
            serde_json::from_str::<Vec<u8>>(raw).map_err(|_| {
                WalletError::InvalidAccountFormat("Solana key byte array is malformed".to_string())
            })?
        } else if let Some(hex_body) = Self::hex_body(raw) {
            hex::decode(hex_body).map_err(|_| {
                WalletError::InvalidAccountFormat("Solana key is not valid hex".to_string())
            })?
        } else {
            bs58::decode(raw).into_vec().map_err(|_| {
                WalletError::InvalidAccountFormat("Solana key is not valid base58".to_string())
            })?
        });

        let mut seed = [0u8; 32];
        match decoded.len() {
            32 => seed.copy_from_slice(&decoded),
            64 => seed.copy_from_slice(&decoded[..32]),
            n => {
                return Err(WalletError::InvalidAccountFormat(format!(
                    "Solana key must be 32 or 64 bytes, got {}",
                    n
                )))
            }
        }
        let keypair = Self::from_seed(SecretBytes::new(seed), clusters);
        if decoded.len() == 64 && decoded[32..] != keypair.public_key {
            return Err(WalletError::InvalidAccountFormat(
                "Solana keypair public half does not match its secret".to_string(),
            ));
        }
        Ok(keypair)
    }

    fn hex_body(raw: &str) -> Option<&str> {
        let body = raw.strip_prefix("0x").unwrap_or(raw);
        let is_hex = body.chars().all(|c| c.is_ascii_hexdigit());
        (is_hex && (body.len() == 64 || body.len() == 128)).then_some(body)
    }

    pub fn generate(clusters: Vec<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_seed(SecretBytes::new(signing_key.to_bytes()), clusters)
    }

    fn from_seed(secret: SecretBytes<32>, clusters: Vec<String>) -> Self {
        let public_key = secret.with_secret(|seed| SigningKey::from_bytes(seed).verifying_key().to_bytes());
        let address = bs58::encode(public_key).into_string();
        Self { secret, public_key, address, clusters }
    }

    /// Base58 public key.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key
    }

    pub fn clusters(&self) -> &[String] {
        &self.clusters
    }

    pub fn supports_cluster(&self, cluster: &str) -> bool {
        self.clusters.is_empty() || self.clusters.iter().any(|c| c == cluster)
    }

    pub(crate) fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.secret.with_secret(|seed| SigningKey::from_bytes(seed).sign(message).to_bytes())
    }
}

/// Chain-specific key payload.
pub enum AccountKeys {
    Evm(EvmKeyPair),
    Solana(SolanaKeyPair),
    Dual { evm: EvmKeyPair, solana: SolanaKeyPair },
}

impl AccountKeys {
    pub fn kind(&self) -> AccountKind {
        match self {
            AccountKeys::Evm(_) => AccountKind::Evm,
            AccountKeys::Solana(_) => AccountKind::Solana,
            AccountKeys::Dual { .. } => AccountKind::Dual,
        }
    }
}

#[derive(Clone)]
pub struct Account {
    pub id: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    keys: Arc<AccountKeys>,
}

impl Account {
    pub fn kind(&self) -> AccountKind {
        self.keys.kind()
    }

    pub fn keys(&self) -> &AccountKeys {
        &self.keys
    }

    pub fn evm(&self) -> Option<&EvmKeyPair> {
        match self.keys.as_ref() {
            AccountKeys::Evm(evm) | AccountKeys::Dual { evm, .. } => Some(evm),
            AccountKeys::Solana(_) => None,
        }
    }

    pub fn solana(&self) -> Option<&SolanaKeyPair> {
        match self.keys.as_ref() {
            AccountKeys::Solana(solana) | AccountKeys::Dual { solana, .. } => Some(solana),
            AccountKeys::Evm(_) => None,
        }
    }

    pub fn evm_address(&self) -> Option<&str> {
        self.evm().map(EvmKeyPair::address)
    }

    pub fn solana_address(&self) -> Option<&str> {
        self.solana().map(SolanaKeyPair::address)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind())
            .field("evm", &self.evm_address())
            .field("solana", &self.solana_address())
            .field("active", &self.active)
            .finish()
    }
}

/// Ordered collection of accounts with unique ids.
#[derive(Clone, Debug, Default)]
pub struct AccountStore {
    accounts: Vec<Account>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an account from config, generating any key material that is not supplied.
    pub fn create(&mut self, config: &AccountConfig) -> Result<Account> {
        let id = config.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if self.find(&id).is_some() {
            return Err(WalletError::AccountAlreadyExists(id));
        }

        let evm = || match &config.private_key {
            Some(key) => EvmKeyPair::from_private_key(key.expose_secret(), config.chain_ids.clone()),
            None => EvmKeyPair::generate(config.chain_ids.clone()),
        };
        let solana = || match &config.secret_key {
            Some(key) => SolanaKeyPair::from_secret_key(key.expose_secret(), config.clusters.clone()),
            None => Ok(SolanaKeyPair::generate(config.clusters.clone())),
        };
        let keys = match config.kind {
            AccountKind::Evm => AccountKeys::Evm(evm()?),
            AccountKind::Solana => AccountKeys::Solana(solana()?),
            AccountKind::Dual => AccountKeys::Dual { evm: evm()?, solana: solana()? },
        };

        let account = Account {
            id,
            label: config.label.clone(),
            created_at: Utc::now(),
            active: false,
            keys: Arc::new(keys),
        };
        if let Some(duplicate) = self.accounts.iter().find(|existing| {
            (account.evm_address().is_some() && existing.evm_address() == account.evm_address())
                || (account.solana_address().is_some()
                    && existing.solana_address() == account.solana_address())
        }) {
            return Err(WalletError::AccountAlreadyExists(format!(
                "key already registered as account {}",
                duplicate.id
            )));
        }
        self.accounts.push(account.clone());
        Ok(account)
    }

    pub fn list(&self) -> &[Account] {
        &self.accounts
    }

    pub(crate) fn list_mut(&mut self) -> &mut [Account] {
        &mut self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.accounts.iter().position(|a| a.id == id)
    }

    /// EVM addresses compare case-insensitively, Solana keys exactly.
    pub fn find_by_address(&self, address: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| {
            a.evm_address().map(|evm| evm.eq_ignore_ascii_case(address)).unwrap_or(false)
                || a.solana_address() == Some(address)
        })
    }

    pub fn remove(&mut self, id: &str) -> Result<Account> {
        let index = self
            .position(id)
            .ok_or_else(|| WalletError::AccountNotFound(id.to_string()))?;
        Ok(self.accounts.remove(index))
    }
}
