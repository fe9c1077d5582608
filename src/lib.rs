//! In-process browser wallet emulator.
//!
//! A [`HeadlessWallet`] exposes an EIP-1193 provider, EIP-6963 discovery and a Solana
//! Wallet Standard provider on a modelled [`HostPage`], backed by real keys so signatures
//! verify on-chain. The safety guard refuses to operate on pages that look like production.

pub mod blockchain;
pub mod core;
pub mod discovery;
pub mod host;
pub mod logging;
pub mod network;
pub mod provider;
pub mod security;
pub mod service;
pub mod storage;

pub use crate::core::config::WalletConfig;
pub use crate::core::errors::{Result, WalletError};
pub use crate::host::HostPage;
pub use crate::provider::evm::{EvmProvider, RequestArguments};
pub use crate::provider::solana::SolanaProvider;
pub use crate::service::{HeadlessWallet, WalletBridge};
