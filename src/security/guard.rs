//! Gate in front of every sensitive wallet operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::config::{ProductionConfig, SafetyMode};
use crate::core::errors::{Result, WalletError};
use crate::host::HostPage;
use crate::network::rate_limit::RateLimiter;
use crate::security::environment::{EnvironmentCheck, EnvironmentClassifier, ExecutionContext};
use crate::security::memory_protection::secure_wipe;

/// Operation classes with their own rate-limit bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SensitiveOperation {
    Sign,
    SendTransaction,
    NetworkCall,
    Connect,
}

impl fmt::Display for SensitiveOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensitiveOperation::Sign => "sign",
            SensitiveOperation::SendTransaction => "sendTransaction",
            SensitiveOperation::NetworkCall => "networkCall",
            SensitiveOperation::Connect => "connect",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Warn,
    Block,
}

pub struct SafetyGuard {
    host: Arc<HostPage>,
    classifier: EnvironmentClassifier,
    mode: SafetyMode,
    limiter: RateLimiter<SensitiveOperation>,
}

impl SafetyGuard {
    pub fn new(config: &ProductionConfig, host: Arc<HostPage>) -> Self {
        Self {
            host,
            classifier: EnvironmentClassifier::new(config),
            mode: config.mode,
            limiter: RateLimiter::new(config.rate_limit.max_operations, config.rate_limit.window()),
        }
    }

    pub fn mode(&self) -> SafetyMode {
        self.mode
    }

    /// Classifies the page as it is right now.
    pub fn check_environment(&self) -> EnvironmentCheck {
        self.classifier.classify(&ExecutionContext::from_host(&self.host))
    }

    pub fn verdict(&self, check: &EnvironmentCheck) -> Verdict {
        match self.mode {
            SafetyMode::Permissive if check.has_production_signal() => Verdict::Warn,
            SafetyMode::Permissive => Verdict::Allow,
            SafetyMode::Standard if !check.is_valid => Verdict::Block,
            SafetyMode::Standard if check.has_production_signal() => Verdict::Warn,
            SafetyMode::Standard => Verdict::Allow,
            SafetyMode::Strict if check.has_production_signal() || !check.is_valid => Verdict::Block,
            SafetyMode::Strict => Verdict::Allow,
        }
    }

    /// Environment gate followed by the rate limit for `operation`.
    pub fn assert_safe(&self, operation: SensitiveOperation) -> Result<()> {
        let check = self.check_environment();
        match self.verdict(&check) {
            Verdict::Block => {
                warn!(
                    %operation,
                    confidence = check.confidence,
                    mode = ?self.mode,
                    "blocked: execution context looks like production"
                );
                return Err(WalletError::ProductionEnvironment(format!(
                    "{} refused (confidence {:.2}): {}",
                    operation,
                    check.confidence,
                    check.reasons.join("; ")
                )));
            }
            Verdict::Warn => {
                warn!(%operation, confidence = check.confidence, reasons = ?check.reasons, "production signals present");
            }
            Verdict::Allow => {}
        }
        if !self.limiter.allow(&operation) {
            warn!(%operation, "rate limit exceeded");
            return Err(WalletError::RateLimited(operation.to_string()));
        }
        debug!(%operation, "safety check passed");
        Ok(())
    }

    /// Multi-pass overwrite of a buffer that held key material.
    pub fn wipe(&self, buf: &mut [u8]) {
        secure_wipe(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RateLimitConfig;

    fn guard(mode: SafetyMode, url: &str) -> SafetyGuard {
        let config = ProductionConfig { mode, ..ProductionConfig::default() };
        SafetyGuard::new(&config, Arc::new(HostPage::new(url).unwrap()))
    }

    #[test]
    fn test_policy_decides_outcome_for_same_host() {
        let url = "https://app.uniswap.org";
        assert!(guard(SafetyMode::Strict, url).assert_safe(SensitiveOperation::Sign).is_err());
        assert!(guard(SafetyMode::Standard, url).assert_safe(SensitiveOperation::Sign).is_ok());
        assert!(guard(SafetyMode::Permissive, url).assert_safe(SensitiveOperation::Sign).is_ok());
    }

    #[test]
    fn test_strict_allows_localhost() {
        assert!(guard(SafetyMode::Strict, "http://localhost:3000").assert_safe(SensitiveOperation::Connect).is_ok());
    }

    #[test]
    fn test_rate_limit_per_operation() {
        let config = ProductionConfig {
            rate_limit: RateLimitConfig { max_operations: 2, window_secs: 60 },
            ..ProductionConfig::default()
        };
        let guard = SafetyGuard::new(&config, Arc::new(HostPage::localhost()));
        assert!(guard.assert_safe(SensitiveOperation::Sign).is_ok());
        assert!(guard.assert_safe(SensitiveOperation::Sign).is_ok());
        let err = guard.assert_safe(SensitiveOperation::Sign).unwrap_err();
        assert!(matches!(err, WalletError::RateLimited(_)));
        assert_eq!(err.code(), -32005);
        assert!(guard.assert_safe(SensitiveOperation::NetworkCall).is_ok());
    }
}
