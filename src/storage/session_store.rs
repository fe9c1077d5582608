//! Session persistence across page reloads.
//!
//! A session is written when a dApp first connects and read back when a wallet is built
//! on the same page. It is only trusted when the version, expiry and origin all check
//! out; anything else clears the stored entry.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::config::SessionConfig;
use crate::core::errors::{Result, WalletError};
use crate::storage::cipher::SessionCipher;
use crate::storage::KeyValueStorage;

pub const SESSION_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub version: u32,
    pub accounts: Vec<String>,
    pub chain_id: String,
    pub permissions: Vec<String>,
    pub origin: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Why a stored session was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRejection {
    Undecodable,
    VersionMismatch(u32),
    Expired,
    OriginMismatch { stored: String, current: String },
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    cipher: SessionCipher,
    ttl: ChronoDuration,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, config: &SessionConfig, wallet_id: &str) -> Result<Self> {
        let ttl = ChronoDuration::try_seconds(config.ttl_secs as i64)
            .ok_or_else(|| WalletError::Config(format!("session ttl {} out of range", config.ttl_secs)))?;
        Ok(Self {
            storage,
            key: format!("{}:{}", config.storage_key, wallet_id),
            cipher: SessionCipher::for_wallet(wallet_id)?,
            ttl,
        })
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Builds a fresh session expiring after the configured TTL and stores it.
    pub fn create(
        &self,
        accounts: Vec<String>,
        chain_id: String,
        permissions: Vec<String>,
        origin: &str,
    ) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            version: SESSION_VERSION,
            accounts,
            chain_id,
            permissions,
            origin: origin.to_string(),
            timestamp: now.timestamp_millis(),
            expires_at: (now + self.ttl).timestamp_millis(),
        };
        self.save(&session)?;
        Ok(session)
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_vec(session)?;
        let sealed = self.cipher.seal(&json)?;
        self.storage.set_item(&self.key, &sealed);
        debug!(key = %self.key, accounts = session.accounts.len(), "session saved");
        Ok(())
    }

    /// Returns the stored session if it is valid for `origin`; clears it otherwise.
    pub fn load(&self, origin: &str) -> Option<Session> {
        match self.validate(origin)? {
            Ok(session) => Some(session),
            Err(rejection) => {
                warn!(key = %self.key, reason = ?rejection, "discarding persisted session");
                self.clear();
                None
            }
        }
    }

    fn validate(&self, origin: &str) -> Option<std::result::Result<Session, SessionRejection>> {
        let sealed = self.storage.get_item(&self.key)?;
        let session = match self
            .cipher
            .open(&sealed)
            .ok()
            .and_then(|plain| serde_json::from_slice::<Session>(&plain).ok())
        {
            Some(session) => session,
            None => return Some(Err(SessionRejection::Undecodable)),
        };
        if session.version != SESSION_VERSION {
            return Some(Err(SessionRejection::VersionMismatch(session.version)));
        }
        if session.is_expired_at(Utc::now().timestamp_millis()) {
            return Some(Err(SessionRejection::Expired));
        }
        if session.origin != origin {
            return Some(Err(SessionRejection::OriginMismatch {
                stored: session.origin,
                current: origin.to_string(),
            }));
        }
        Some(Ok(session))
    }

    pub fn clear(&self) {
        self.storage.remove_item(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store(storage: Arc<MemoryStorage>) -> SessionStore {
        SessionStore::new(storage, &SessionConfig::default(), "test-wallet").unwrap()
    }

    #[test]
    fn test_round_trip_same_origin() {
        let storage = Arc::new(MemoryStorage::new());
        let sessions = store(Arc::clone(&storage));
        let saved = sessions
            .create(vec!["0xabc".into()], "0x1".into(), vec!["eth_accounts".into()], "http://localhost:3000")
            .unwrap();
        assert_eq!(sessions.load("http://localhost:3000"), Some(saved));
    }

    #[test]
    fn test_payload_is_not_plaintext() {
        let storage = Arc::new(MemoryStorage::new());
        let sessions = store(Arc::clone(&storage));
        sessions.create(vec!["0xabc".into()], "0x1".into(), vec![], "http://localhost").unwrap();
        let raw = storage.get_item(sessions.storage_key()).unwrap();
        assert!(!raw.contains("0xabc"));
    }

    #[test]
    fn test_version_mismatch_clears() {
        let storage = Arc::new(MemoryStorage::new());
        let sessions = store(Arc::clone(&storage));
        let mut session =
            sessions.create(vec![], "0x1".into(), vec![], "http://localhost").unwrap();
        session.version = 0;
        sessions.save(&session).unwrap();
        assert!(sessions.load("http://localhost").is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_expired_clears() {
        let storage = Arc::new(MemoryStorage::new());
        let sessions = store(Arc::clone(&storage));
        let mut session =
            sessions.create(vec![], "0x1".into(), vec![], "http://localhost").unwrap();
        session.expires_at = session.timestamp - 1;
        sessions.save(&session).unwrap();
        assert!(sessions.load("http://localhost").is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_garbage_clears() {
        let storage = Arc::new(MemoryStorage::new());
        let sessions = store(Arc::clone(&storage));
        storage.set_item(sessions.storage_key(), "garbage");
        assert!(sessions.load("http://localhost").is_none());
        assert!(storage.is_empty());
    }
}
