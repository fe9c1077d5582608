//! Sealing of persisted session payloads.
//!
//! AES-256-GCM under a key derived (HKDF-SHA256) from the wallet id. Anyone who knows the
//! wallet id can open a payload, so this gives tamper detection rather than secrecy.
//! Output format: base64(nonce(12) || ciphertext).

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::core::errors::{Result, WalletError};

const KDF_SALT: &[u8] = b"headless-wallet/session-seal";
const AAD: &[u8] = b"headless-wallet/session/v1";
const NONCE_LEN: usize = 12;

pub struct SessionCipher {
    key: Zeroizing<[u8; 32]>,
}

impl SessionCipher {
    pub fn for_wallet(wallet_id: &str) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), wallet_id.as_bytes());
        let mut key = Zeroizing::new([0u8; 32]);
        hk.expand(b"session-key", key.as_mut())
            .map_err(|_| WalletError::Internal("session key derivation failed".into()))?;
        Ok(Self { key })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(self.key.as_ref())
            .map_err(|_| WalletError::Session("invalid key length".into()))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, Payload { msg: plaintext, aad: AAD })
            .map_err(|_| WalletError::Session("sealing failed".into()))?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(out))
    }

    pub fn open(&self, sealed: &str) -> Result<Zeroizing<Vec<u8>>> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(sealed.trim())
            .map_err(|_| WalletError::Session("payload is not base64".into()))?;
        if raw.len() <= NONCE_LEN {
            return Err(WalletError::Session("payload too short".into()));
        }
        let cipher = Aes256Gcm::new_from_slice(self.key.as_ref())
            .map_err(|_| WalletError::Session("invalid key length".into()))?;
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad: AAD })
            .map_err(|_| WalletError::Session("payload failed authentication".into()))?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let cipher = SessionCipher::for_wallet("wallet-a").unwrap();
        let sealed = cipher.seal(b"{\"version\":1}").unwrap();
        assert!(!sealed.contains("version"));
        assert_eq!(cipher.open(&sealed).unwrap().as_slice(), b"{\"version\":1}");
    }

    #[test]
    fn test_other_wallet_cannot_open() {
        let sealed = SessionCipher::for_wallet("wallet-a").unwrap().seal(b"data").unwrap();
        assert!(SessionCipher::for_wallet("wallet-b").unwrap().open(&sealed).is_err());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let cipher = SessionCipher::for_wallet("wallet-a").unwrap();
        let sealed = cipher.seal(b"data").unwrap();
        let mut raw = base64::engine::general_purpose::STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::STANDARD.encode(raw);
        assert!(cipher.open(&tampered).is_err());
        assert!(cipher.open("not base64 !!").is_err());
    }
}
