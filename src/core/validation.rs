use regex::Regex;
use sha3::{Digest, Keccak256};
use once_cell::sync::Lazy;

use crate::core::errors::{Result, WalletError};

static ETH_ADDRESS_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").ok());
static HEX_CHAIN_ID_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^0x(0|[1-9a-f][0-9a-f]*)$").ok());

/// Validates an Ethereum address. Mixed-case input must carry a valid EIP-55 checksum.
pub fn validate_ethereum_address(address: &str) -> Result<()> {
    let matches = ETH_ADDRESS_RE.as_ref().map(|re| re.is_match(address)).unwrap_or(false);
    if !matches {
        return Err(WalletError::InvalidParams(format!("Invalid Ethereum address: {}", address)));
    }
    let body = &address[2..];
    let is_all_lower = body.chars().all(|c| !c.is_ascii_uppercase());
    let is_all_upper = body.chars().all(|c| !c.is_ascii_lowercase());
    if is_all_lower || is_all_upper {
        return Ok(());
    }
    if !is_eip55_checksum_valid(address) {
        return Err(WalletError::InvalidParams(format!(
            "Invalid EIP-55 checksum for address: {}",
            address
        )));
    }
    Ok(())
}

fn is_eip55_checksum_valid(addr: &str) -> bool {
    let body = &addr[2..];
    let hash = Keccak256::digest(body.to_lowercase().as_bytes());
    body.chars().enumerate().all(|(i, ch)| {
        let nibble = (hash[i / 2] >> (4 * (1 - (i % 2)))) & 0x0f;
        match ch {
            'a'..='f' => nibble < 8,
            'A'..='F' => nibble >= 8,
            _ => true,
        }
    })
}

/// Validates a base58 Solana public key (32 bytes decoded).
pub fn validate_solana_address(address: &str) -> Result<()> {
    if address.len() < 32 || address.len() > 44 {
        return Err(WalletError::InvalidParams(format!("Invalid Solana address length: {}", address)));
    }
    match bs58::decode(address).into_vec() {
        Ok(decoded) if decoded.len() == 32 => Ok(()),
        Ok(_) => Err(WalletError::InvalidParams("Invalid Solana address decoded length".into())),
        Err(_) => Err(WalletError::InvalidParams("Invalid base58 encoding".into())),
    }
}

/// Canonical EIP-695 hex form of a chain id: `0x`-prefixed lowercase, no leading zeros.
pub fn chain_id_to_hex(chain_id: u64) -> String {
    format!("0x{:x}", chain_id)
}

/// True if `hex` is the canonical encoding produced by [`chain_id_to_hex`].
pub fn is_canonical_chain_id_hex(hex: &str) -> bool {
    HEX_CHAIN_ID_RE.as_ref().map(|re| re.is_match(hex)).unwrap_or(false)
}

/// Parses a chain id given as `0x` hex or a decimal string.
pub fn parse_chain_id(value: &str) -> Result<u64> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|_| WalletError::InvalidChain(format!("Invalid chain id: {}", value)))
}

/// Decodes `0x`-prefixed hex; input without the prefix is rejected.
pub fn parse_prefixed_hex(value: &str) -> Result<Vec<u8>> {
    let body = value
        .strip_prefix("0x")
        .ok_or_else(|| WalletError::InvalidParams(format!("Expected 0x-prefixed hex: {}", value)))?;
    hex::decode(body).map_err(|e| WalletError::InvalidParams(format!("Invalid hex data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_address_accepted() {
        assert!(validate_ethereum_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").is_ok());
        assert!(validate_ethereum_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").is_ok());
    }

    #[test]
    fn test_bad_checksum_rejected() {
        assert!(validate_ethereum_address("0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266").is_err());
        assert!(validate_ethereum_address("0x1234").is_err());
    }

    #[test]
    fn test_chain_id_hex() {
        assert_eq!(chain_id_to_hex(1), "0x1");
        assert_eq!(chain_id_to_hex(11155111), "0xaa36a7");
        assert!(is_canonical_chain_id_hex("0xaa36a7"));
        assert!(!is_canonical_chain_id_hex("0x01"));
        assert!(!is_canonical_chain_id_hex("0xAA36A7"));
    }

    #[test]
    fn test_parse_chain_id_forms() {
        assert_eq!(parse_chain_id("0x89").unwrap(), 137);
        assert_eq!(parse_chain_id("137").unwrap(), 137);
        assert!(parse_chain_id("polygon").is_err());
    }

    #[test]
    fn test_solana_address() {
        let key = bs58::encode([3u8; 32]).into_string();
        assert!(validate_solana_address(&key).is_ok());
        assert!(validate_solana_address("not-base58-0OIl").is_err());
    }
}
