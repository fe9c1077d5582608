//! Chain registry: EVM chains and Solana clusters, one active network per family.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::{Result, WalletError};
use crate::core::validation::{chain_id_to_hex, is_canonical_chain_id_hex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn new(name: &str, symbol: &str, decimals: u8) -> Self {
        Self { name: name.to_string(), symbol: symbol.to_string(), decimals }
    }

    pub fn ether() -> Self {
        Self::new("Ether", "ETH", 18)
    }

    pub fn sol() -> Self {
        Self::new("Solana", "SOL", 9)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExplorer {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmChain {
    pub chain_id: u64,
    pub chain_id_hex: String,
    pub name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorers: Vec<BlockExplorer>,
    pub testnet: bool,
}

impl EvmChain {
    pub fn new(chain_id: u64, name: &str, native_currency: NativeCurrency) -> Self {
        Self {
            chain_id,
            chain_id_hex: chain_id_to_hex(chain_id),
            name: name.to_string(),
            native_currency,
            rpc_urls: Vec::new(),
            block_explorers: Vec::new(),
            testnet: false,
        }
    }

    pub fn with_rpc(mut self, url: &str) -> Self {
        self.rpc_urls.push(url.to_string());
        self
    }

    pub fn with_explorer(mut self, name: &str, url: &str) -> Self {
        self.block_explorers.push(BlockExplorer { name: name.to_string(), url: url.to_string() });
        self
    }

    pub fn testnet(mut self) -> Self {
        self.testnet = true;
        self
    }

    /// Preset definition for chains dApps commonly target.
    pub fn well_known(chain_id: u64) -> Option<Self> {
        let chain = match chain_id {
            1 => Self::new(1, "Ethereum", NativeCurrency::ether())
                .with_rpc("https://eth.llamarpc.com")
                .with_explorer("Etherscan", "https://etherscan.io"),
            10 => Self::new(10, "OP Mainnet", NativeCurrency::ether())
                .with_rpc("https://mainnet.optimism.io")
                .with_explorer("Optimism Explorer", "https://optimistic.etherscan.io"),
            137 => Self::new(137, "Polygon", NativeCurrency::new("POL", "POL", 18))
                .with_rpc("https://polygon-rpc.com")
                .with_explorer("PolygonScan", "https://polygonscan.com"),
            8453 => Self::new(8453, "Base", NativeCurrency::ether())
                .with_rpc("https://mainnet.base.org")
                .with_explorer("Basescan", "https://basescan.org"),
            42161 => Self::new(42161, "Arbitrum One", NativeCurrency::ether())
                .with_rpc("https://arb1.arbitrum.io/rpc")
                .with_explorer("Arbiscan", "https://arbiscan.io"),
            17000 => Self::new(17000, "Holesky", NativeCurrency::ether())
                .with_rpc("https://ethereum-holesky-rpc.publicnode.com")
                .with_explorer("Etherscan", "https://holesky.etherscan.io")
                .testnet(),
            84532 => Self::new(84532, "Base Sepolia", NativeCurrency::ether())
                .with_rpc("https://sepolia.base.org")
                .with_explorer("Basescan", "https://sepolia.basescan.org")
                .testnet(),
            11155111 => Self::new(11155111, "Sepolia", NativeCurrency::ether())
                .with_rpc("https://rpc.sepolia.org")
                .with_explorer("Etherscan", "https://sepolia.etherscan.io")
                .testnet(),
            31337 => Self::new(31337, "Anvil", NativeCurrency::ether())
                .with_rpc("http://127.0.0.1:8545")
                .testnet(),
            _ => return None,
        };
        Some(chain)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaCluster {
    pub name: String,
    pub endpoint: String,
    pub display_name: String,
    pub native_currency: NativeCurrency,
    pub block_explorers: Vec<BlockExplorer>,
    pub testnet: bool,
}

impl SolanaCluster {
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            display_name: name.to_string(),
            native_currency: NativeCurrency::sol(),
            block_explorers: vec![BlockExplorer {
                name: "Solana Explorer".to_string(),
                url: "https://explorer.solana.com".to_string(),
            }],
            testnet: name != "mainnet-beta",
        }
    }

    pub fn well_known(name: &str) -> Option<Self> {
        let (endpoint, display) = match name {
            "mainnet-beta" => ("https://api.mainnet-beta.solana.com", "Solana Mainnet"),
            "devnet" => ("https://api.devnet.solana.com", "Solana Devnet"),
            "testnet" => ("https://api.testnet.solana.com", "Solana Testnet"),
            "localnet" => ("http://127.0.0.1:8899", "Solana Localnet"),
            _ => return None,
        };
        let mut cluster = Self::new(name, endpoint);
        cluster.display_name = display.to_string();
        Some(cluster)
    }

    /// Wallet Standard chain identifier, e.g. `solana:devnet`.
    pub fn standard_chain(&self) -> String {
        let short = match self.name.as_str() {
            "mainnet-beta" => "mainnet",
            other => other,
        };
        format!("solana:{}", short)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

/// Registry key: numeric id for EVM chains, cluster name for Solana.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainId {
    Evm(u64),
    Solana(String),
}

impl ChainId {
    pub fn family(&self) -> ChainFamily {
        match self {
            ChainId::Evm(_) => ChainFamily::Evm,
            ChainId::Solana(_) => ChainFamily::Solana,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Evm(id) => write!(f, "eip155:{}", id),
            ChainId::Solana(name) => write!(f, "solana:{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Chain {
    Evm(EvmChain),
    Solana(SolanaCluster),
}

impl Chain {
    pub fn id(&self) -> ChainId {
        match self {
            Chain::Evm(chain) => ChainId::Evm(chain.chain_id),
            Chain::Solana(cluster) => ChainId::Solana(cluster.name.clone()),
        }
    }

    pub fn family(&self) -> ChainFamily {
        self.id().family()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: Vec<Chain>,
    active_evm: Option<u64>,
    active_solana: Option<String>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a chain. The first chain of a family becomes that family's active chain.
    pub fn register(&mut self, chain: Chain) -> Result<()> {
        let id = chain.id();
        if self.get(&id).is_some() {
            return Err(WalletError::InvalidChain(format!("{} is already registered", id)));
        }
        if let Chain::Evm(evm) = &chain {
            if !is_canonical_chain_id_hex(&evm.chain_id_hex)
                || evm.chain_id_hex != chain_id_to_hex(evm.chain_id)
            {
                return Err(WalletError::InvalidChain(format!(
                    "hex id {} does not encode chain {}",
                    evm.chain_id_hex, evm.chain_id
                )));
            }
        }
        match &id {
            ChainId::Evm(chain_id) if self.active_evm.is_none() => self.active_evm = Some(*chain_id),
            ChainId::Solana(name) if self.active_solana.is_none() => {
                self.active_solana = Some(name.clone())
            }
            _ => {}
        }
        self.chains.push(chain);
        Ok(())
    }

    /// Registers a new EVM chain or merges RPC URLs and explorers into an existing one.
    /// Returns `true` when the chain was not known before.
    pub fn upsert_evm(&mut self, incoming: EvmChain) -> Result<bool> {
        let existing = self.chains.iter_mut().find_map(|chain| match chain {
            Chain::Evm(evm) if evm.chain_id == incoming.chain_id => Some(evm),
            _ => None,
        });
        match existing {
            Some(evm) => {
                for url in incoming.rpc_urls {
                    if !evm.rpc_urls.contains(&url) {
                        evm.rpc_urls.push(url);
                    }
                }
                for explorer in incoming.block_explorers {
                    if !evm.block_explorers.contains(&explorer) {
                        evm.block_explorers.push(explorer);
                    }
                }
                Ok(false)
            }
            None => {
                self.register(Chain::Evm(incoming))?;
                Ok(true)
            }
        }
    }

    /// Removes a chain; if it was active, the next chain of the same family takes over.
    pub fn remove(&mut self, id: &ChainId) -> Result<Chain> {
        let index = self
            .chains
            .iter()
            .position(|c| &c.id() == id)
            .ok_or_else(|| WalletError::ChainNotFound(id.to_string()))?;
        let removed = self.chains.remove(index);
        match id {
            ChainId::Evm(chain_id) if self.active_evm == Some(*chain_id) => {
                let next = self.evm_chains().next().map(|c| c.chain_id);
                self.active_evm = next;
            }
            ChainId::Solana(name) if self.active_solana.as_deref() == Some(name.as_str()) => {
                let next = self.solana_clusters().next().map(|c| c.name.clone());
                self.active_solana = next;
            }
            _ => {}
        }
        Ok(removed)
    }

    pub fn list(&self) -> &[Chain] {
        &self.chains
    }

    pub fn get(&self, id: &ChainId) -> Option<&Chain> {
        self.chains.iter().find(|c| &c.id() == id)
    }

    pub fn get_evm(&self, chain_id: u64) -> Option<&EvmChain> {
        self.evm_chains().find(|c| c.chain_id == chain_id)
    }

    pub fn get_solana(&self, name: &str) -> Option<&SolanaCluster> {
        self.solana_clusters().find(|c| c.name == name)
    }

    pub fn evm_chains(&self) -> impl Iterator<Item = &EvmChain> {
        self.chains.iter().filter_map(|c| match c {
            Chain::Evm(evm) => Some(evm),
            Chain::Solana(_) => None,
        })
    }

    pub fn solana_clusters(&self) -> impl Iterator<Item = &SolanaCluster> {
        self.chains.iter().filter_map(|c| match c {
            Chain::Solana(cluster) => Some(cluster),
            Chain::Evm(_) => None,
        })
    }

    pub fn set_active(&mut self, family: ChainFamily, id: &ChainId) -> Result<()> {
        if id.family() != family {
            return Err(WalletError::InvalidChain(format!("{} is not a {:?} chain", id, family)));
        }
        if self.get(id).is_none() {
            return Err(WalletError::ChainNotFound(id.to_string()));
        }
        match id {
            ChainId::Evm(chain_id) => self.active_evm = Some(*chain_id),
            ChainId::Solana(name) => self.active_solana = Some(name.clone()),
        }
        Ok(())
    }

    pub fn active(&self, family: ChainFamily) -> Option<&Chain> {
        let id = match family {
            ChainFamily::Evm => ChainId::Evm(self.active_evm?),
            ChainFamily::Solana => ChainId::Solana(self.active_solana.clone()?),
        };
        self.get(&id)
    }

    pub fn active_evm(&self) -> Option<&EvmChain> {
        self.active_evm.and_then(|id| self.get_evm(id))
    }

    pub fn active_solana(&self) -> Option<&SolanaCluster> {
        self.active_solana.as_deref().and_then(|name| self.get_solana(name))
    }

    /// Checks that every active pointer references a registered chain.
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = self.active_evm {
            if self.get_evm(id).is_none() {
                return Err(WalletError::InvalidState(format!("active EVM chain {} is not registered", id)));
            }
        }
        if let Some(name) = &self.active_solana {
            if self.get_solana(name).is_none() {
                return Err(WalletError::InvalidState(format!(
                    "active Solana cluster {} is not registered",
                    name
                )));
            }
        }
        Ok(())
    }
}
