//! Error and log message redaction.
//!
//! Anything that might carry key material is scrubbed before it is attached to an error
//! payload or written to a log line.

use once_cell::sync::Lazy;
use regex::Regex;

/// 32-byte hex, `0x`-prefixed or bare, following a key label such as `private key:`,
/// `secretKey=` or `"privateKey":"`.
const KEY_HEX: &str = r#"(?i)(?P<label>\b(?:private[ _-]?key|secret[ _-]?key|seed|key)\b[\s:="']{0,4})(?:0x)?[0-9a-f]{64}\b"#;

static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // 32-byte hex after a key label; hashes and digests elsewhere stay readable
        (KEY_HEX, "${label}[REDACTED_PRIVATE_KEY]"),
        // base58 ed25519 keypair (64 bytes)
        (r"\b[1-9A-HJ-NP-Za-km-z]{86,90}\b", "[REDACTED_SECRET_KEY]"),
        // JSON byte array keypair export
        (r"\[(\s*\d{1,3}\s*,){31,63}\s*\d{1,3}\s*\]", "[REDACTED_KEY_BYTES]"),
        // BIP-39 mnemonic
        (r"\b([a-z]{3,8}\s+){11,23}[a-z]{3,8}\b", "[REDACTED_MNEMONIC]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

static LOG_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (KEY_HEX, "${label}[REDACTED_PRIVATE_KEY]"),
        (r"\b[1-9A-HJ-NP-Za-km-z]{86,90}\b", "[REDACTED_BASE58_KEY]"),
        (r"\b([a-z]{3,8}\s+){11,23}[a-z]{3,8}\b", "[MNEMONIC_PHRASE]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Redact an error message before it leaves the wallet.
pub fn sanitize_error_message(message: &str) -> String {
    SENSITIVE_PATTERNS
        .iter()
        .fold(message.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

/// Lighter redaction for internal logs; keeps addresses and hashes readable.
pub fn sanitize_for_logging(message: &str) -> String {
    LOG_PATTERNS.iter().fold(message.to_string(), |acc, (pattern, replacement)| {
        pattern.replace_all(&acc, *replacement).into_owned()
    })
}
