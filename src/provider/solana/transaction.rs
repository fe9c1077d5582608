//! Solana transaction wire format.
//!
//! `[compact-u16 signature count][64-byte signatures][message]`. A message whose first byte
//! has the high bit set is versioned (`0x80` = v0); the header and account keys follow the
//! version byte in the same layout as a legacy message.

use crate::core::account::SolanaKeyPair;
use crate::core::errors::{Result, WalletError};

pub const SIGNATURE_LEN: usize = 64;
pub const PUBKEY_LEN: usize = 32;
const VERSION_PREFIX: u8 = 0x80;
const SYSTEM_PROGRAM_ID: [u8; PUBKEY_LEN] = [0u8; PUBKEY_LEN];
const SYSTEM_TRANSFER: u32 = 2;

pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(3);
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return out;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Returns the decoded value and the number of bytes consumed.
pub fn decode_compact_u16(bytes: &[u8]) -> Result<(u16, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            if value > u16::MAX as u32 {
                break;
            }
            return Ok((value as u16, i + 1));
        }
    }
    Err(WalletError::InvalidTransaction("malformed compact-u16 length".into()))
}

/// Message header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaTransaction {
    pub signatures: Vec<[u8; SIGNATURE_LEN]>,
    pub message: Vec<u8>,
}

impl SolanaTransaction {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (count, offset) = decode_compact_u16(bytes)?;
        let sig_end = offset + count as usize * SIGNATURE_LEN;
        if bytes.len() < sig_end {
            return Err(WalletError::InvalidTransaction("transaction truncated in signatures".into()));
        }
        let signatures = bytes[offset..sig_end]
            .chunks_exact(SIGNATURE_LEN)
            .map(|chunk| {
                let mut sig = [0u8; SIGNATURE_LEN];
                sig.copy_from_slice(chunk);
                sig
            })
            .collect();
        let tx = Self { signatures, message: bytes[sig_end..].to_vec() };
        let header = tx.header()?;
        if tx.signatures.len() != header.num_required_signatures as usize {
            return Err(WalletError::InvalidTransaction(format!(
                "transaction carries {} signature slots, message requires {}",
                tx.signatures.len(),
                header.num_required_signatures
            )));
        }
        Ok(tx)
    }

    /// Wraps a bare message with empty signature slots.
    pub fn unsigned(message: Vec<u8>) -> Result<Self> {
        let mut tx = Self { signatures: Vec::new(), message };
        let required = tx.header()?.num_required_signatures as usize;
        tx.signatures = vec![[0u8; SIGNATURE_LEN]; required];
        Ok(tx)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = encode_compact_u16(self.signatures.len() as u16);
        for sig in &self.signatures {
            out.extend_from_slice(sig);
        }
        out.extend_from_slice(&self.message);
        out
    }

    pub fn is_versioned(&self) -> bool {
        self.message.first().map(|b| b & VERSION_PREFIX != 0).unwrap_or(false)
    }

    fn body(&self) -> Result<&[u8]> {
        let body = if self.is_versioned() {
            let version = self.message[0] & !VERSION_PREFIX;
            if version != 0 {
                return Err(WalletError::InvalidTransaction(format!(
                    "unsupported message version {}",
                    version
                )));
            }
            &self.message[1..]
        } else {
            &self.message[..]
        };
        Ok(body)
    }

    pub fn header(&self) -> Result<MessageHeader> {
        let body = self.body()?;
        if body.len() < 3 {
            return Err(WalletError::InvalidTransaction("message header truncated".into()));
        }
        Ok(MessageHeader {
            num_required_signatures: body[0],
            num_readonly_signed: body[1],
            num_readonly_unsigned: body[2],
        })
    }

    /// Static account keys in message order.
    pub fn account_keys(&self) -> Result<Vec<[u8; PUBKEY_LEN]>> {
        let body = self.body()?;
        let rest = body
            .get(3..)
            .ok_or_else(|| WalletError::InvalidTransaction("message header truncated".into()))?;
        let (count, offset) = decode_compact_u16(rest)?;
        let end = offset + count as usize * PUBKEY_LEN;
        if rest.len() < end {
            return Err(WalletError::InvalidTransaction("message truncated in account keys".into()));
        }
        Ok(rest[offset..end]
            .chunks_exact(PUBKEY_LEN)
            .map(|chunk| {
                let mut key = [0u8; PUBKEY_LEN];
                key.copy_from_slice(chunk);
                key
            })
            .collect())
    }

    /// Signature slot of `public_key` among the required signers.
    pub fn signer_slot(&self, public_key: &[u8; PUBKEY_LEN]) -> Result<usize> {
        let required = self.header()?.num_required_signatures as usize;
        self.account_keys()?
            .iter()
            .take(required)
            .position(|key| key == public_key)
            .ok_or_else(|| {
                WalletError::InvalidTransaction(format!(
                    "{} is not a required signer of this transaction",
                    bs58::encode(public_key).into_string()
                ))
            })
    }

    /// Signs the message and stores the signature at the key's slot.
    pub fn sign_with(&mut self, keypair: &SolanaKeyPair) -> Result<[u8; SIGNATURE_LEN]> {
        let slot = self.signer_slot(&keypair.public_key_bytes())?;
        let signature = keypair.sign(&self.message);
        self.signatures[slot] = signature;
        Ok(signature)
    }

    /// First signature; the transaction id once submitted.
    pub fn signature(&self) -> Option<&[u8; SIGNATURE_LEN]> {
        self.signatures.first()
    }
}

/// Legacy message for a System Program transfer of `lamports` from `from` to `to`.
pub fn transfer_message(
    from: &[u8; PUBKEY_LEN],
    to: &[u8; PUBKEY_LEN],
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Vec<u8> {
    let mut message = vec![1u8, 0, 1];
    message.extend(encode_compact_u16(3));
    message.extend_from_slice(from);
    message.extend_from_slice(to);
    message.extend_from_slice(&SYSTEM_PROGRAM_ID);
    message.extend_from_slice(recent_blockhash);

    let mut data = SYSTEM_TRANSFER.to_le_bytes().to_vec();
    data.extend_from_slice(&lamports.to_le_bytes());

    message.extend(encode_compact_u16(1));
    message.push(2);
    message.extend(encode_compact_u16(2));
    message.extend_from_slice(&[0, 1]);
    message.extend(encode_compact_u16(data.len() as u16));
    message.extend_from_slice(&data);
    message
}
