// src/security/memory_protection.rs
//! Memory hygiene for key material.

use rand::RngCore;
use std::ptr;
use std::sync::atomic::{fence, Ordering};
use zeroize::Zeroize;

/// Fixed overwrite patterns applied before the random and final zero passes.
const WIPE_PATTERNS: [u8; 3] = [0xFF, 0xAA, 0x55];

fn volatile_fill(buf: &mut [u8], value: u8) {
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { ptr::write_volatile(byte, value) };
    }
    fence(Ordering::SeqCst);
}

/// Multi-pass overwrite of a buffer holding secrets.
///
/// Passes: 0xFF, 0xAA, 0x55, random bytes, then zero. Volatile writes plus a fence keep the
/// compiler from eliding the intermediate passes.
pub fn secure_wipe(buf: &mut [u8]) {
    if buf.is_empty() {
        return;
    }
    for pattern in WIPE_PATTERNS {
        volatile_fill(buf, pattern);
    }
    rand::thread_rng().fill_bytes(buf);
    fence(Ordering::SeqCst);
    buf.zeroize();
}

/// Fixed-size secret that is wiped with [`secure_wipe`] on drop and never printed.
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> SecretBytes<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Scoped access so callers do not hold copies longer than needed.
    pub fn with_secret<R>(&self, f: impl FnOnce(&[u8; N]) -> R) -> R {
        f(&self.bytes)
    }

    pub fn len(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<const N: usize> Drop for SecretBytes<N> {
    fn drop(&mut self) {
        secure_wipe(&mut self.bytes);
    }
}

impl<const N: usize> std::fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes<{}>(<redacted>)", N)
    }
}
