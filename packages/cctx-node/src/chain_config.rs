//! Observed chain configuration
//!
//! Chains are declared as `CHAINS_COUNT` followed by `CHAIN_{i}_*` groups,
//! 1-indexed. Contract addresses and tickers normally come from the
//! consensus chain params; the optional local values here override them.

use std::collections::HashSet;
use std::str::FromStr;

use alloy::primitives::Address;
use eyre::{eyre, Result};

use crate::rpc::evm::parse_rpc_urls;
use crate::types::{ChainId, ChainParams};

/// Where to resume scanning on startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFrom {
    /// Start at the current chain height
    Latest,
    /// Start after this block
    Block(u64),
}

impl FromStr for ScanFrom {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(ScanFrom::Latest);
        }
        s.parse::<u64>()
            .map(ScanFrom::Block)
            .map_err(|_| eyre!("scan-from must be \"latest\" or a block number, got {:?}", s))
    }
}

/// Configuration for a single observed chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    /// Human-readable name (e.g., "ethereum", "bsc")
    pub name: String,
    /// EIP-155 chain id
    pub chain_id: ChainId,
    /// RPC endpoints, tried in order
    pub rpc_urls: Vec<String>,
    /// Local override of the consensus confirmation count
    pub confirmation_count: Option<u64>,
    /// Upper bound on blocks scanned per inbound tick
    pub max_blocks_per_batch: u64,
    /// Whether this chain is active
    pub enabled: bool,
    pub connector_address: Option<String>,
    pub custody_address: Option<String>,
    pub gateway_address: Option<String>,
    /// `CHAIN_{chain_id}_SCAN_FROM_BLOCK`
    pub scan_from: Option<ScanFrom>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            chain_id: 0,
            rpc_urls: Vec::new(),
            confirmation_count: None,
            max_blocks_per_batch: default_max_blocks_per_batch(),
            enabled: true,
            connector_address: None,
            custody_address: None,
            gateway_address: None,
            scan_from: None,
        }
    }
}

fn default_max_blocks_per_batch() -> u64 {
    100
}

impl ChainConfig {
    /// Apply local overrides on top of consensus chain params
    pub fn apply_overrides(&self, mut params: ChainParams) -> ChainParams {
        if let Some(count) = self.confirmation_count {
            params.confirmation_count = count;
        }
        if let Some(addr) = &self.connector_address {
            params.connector_contract_address = addr.clone();
        }
        if let Some(addr) = &self.custody_address {
            params.erc20_custody_contract_address = addr.clone();
        }
        if let Some(addr) = &self.gateway_address {
            params.gateway_address = addr.clone();
        }
        params
    }

    /// Starting params before the consensus chain is queried
    pub fn initial_params(&self) -> ChainParams {
        self.apply_overrides(ChainParams::default_for(self.chain_id))
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_urls.is_empty() {
            return Err(eyre!("Chain {} has no RPC URL", self.name));
        }
        if self.max_blocks_per_batch == 0 {
            return Err(eyre!("Chain {} max blocks per batch must be > 0", self.name));
        }
        for (what, addr) in [
            ("connector", &self.connector_address),
            ("custody", &self.custody_address),
            ("gateway", &self.gateway_address),
        ] {
            if let Some(addr) = addr {
                Address::from_str(addr).map_err(|e| {
                    eyre!("Invalid {} address for chain {}: {} ({})", what, self.name, addr, e)
                })?;
            }
        }
        Ok(())
    }
}

/// Validate a set of chains: non-empty, unique ids, each valid
pub fn validate_chains(chains: &[ChainConfig]) -> Result<()> {
    if chains.is_empty() {
        return Err(eyre!("At least one chain must be configured"));
    }

    let mut seen_ids = HashSet::new();
    for chain in chains {
        if !seen_ids.insert(chain.chain_id) {
            return Err(eyre!("Duplicate chain ID: {}", chain.chain_id));
        }
        chain.validate()?;
    }
    Ok(())
}

/// Load chain configs from environment variables
pub fn load_from_env() -> Result<Vec<ChainConfig>> {
    load_with(|key| std::env::var(key).ok())
}

/// Load chain configs through an arbitrary variable lookup
pub fn load_with<F>(lookup: F) -> Result<Vec<ChainConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let count: usize = match lookup("CHAINS_COUNT") {
        Some(s) => s
            .trim()
            .parse()
            .map_err(|_| eyre!("Invalid CHAINS_COUNT: {}", s))?,
        None => return Err(eyre!("CHAINS_COUNT environment variable is required")),
    };

    let mut chains = Vec::with_capacity(count);

    for i in 1..=count {
        let prefix = format!("CHAIN_{}", i);
        let var = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix));

        let name = var("NAME").unwrap_or_else(|| format!("chain_{}", i));

        let chain_id: ChainId = var("CHAIN_ID")
            .ok_or_else(|| eyre!("Missing {}_CHAIN_ID", prefix))?
            .trim()
            .parse()
            .map_err(|_| eyre!("Invalid {}_CHAIN_ID", prefix))?;

        let rpc_urls = parse_rpc_urls(
            &var("RPC_URL").ok_or_else(|| eyre!("Missing {}_RPC_URL", prefix))?,
        );

        let confirmation_count = match var("CONFIRMATION_COUNT") {
            Some(s) => Some(
                s.trim()
                    .parse()
                    .map_err(|_| eyre!("Invalid {}_CONFIRMATION_COUNT", prefix))?,
            ),
            None => None,
        };

        let max_blocks_per_batch: u64 = var("MAX_BLOCKS_PER_BATCH")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or_else(default_max_blocks_per_batch);

        let enabled: bool = var("ENABLED")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(true);

        let scan_from = lookup(&format!("CHAIN_{}_SCAN_FROM_BLOCK", chain_id))
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<ScanFrom>())
            .transpose()?;

        chains.push(ChainConfig {
            name,
            chain_id,
            rpc_urls,
            confirmation_count,
            max_blocks_per_batch,
            enabled,
            connector_address: var("CONNECTOR_ADDRESS"),
            custody_address: var("CUSTODY_ADDRESS"),
            gateway_address: var("GATEWAY_ADDRESS"),
            scan_from,
        });
    }

    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_two_chains() {
        let vars = env(&[
            ("CHAINS_COUNT", "2"),
            ("CHAIN_1_NAME", "ethereum"),
            ("CHAIN_1_CHAIN_ID", "1"),
            ("CHAIN_1_RPC_URL", "https://a.example, https://b.example"),
            ("CHAIN_1_CONFIRMATION_COUNT", "14"),
            ("CHAIN_2_CHAIN_ID", "56"),
            ("CHAIN_2_RPC_URL", "https://bsc.example"),
            ("CHAIN_2_ENABLED", "false"),
            ("CHAIN_56_SCAN_FROM_BLOCK", "latest"),
        ]);
        let chains = load_with(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].name, "ethereum");
        assert_eq!(chains[0].rpc_urls.len(), 2);
        assert_eq!(chains[0].confirmation_count, Some(14));
        assert_eq!(chains[0].scan_from, None);
        assert_eq!(chains[1].name, "chain_2");
        assert!(!chains[1].enabled);
        assert_eq!(chains[1].scan_from, Some(ScanFrom::Latest));
        validate_chains(&chains).unwrap();
    }

    #[test]
    fn test_missing_rpc_url() {
        let vars = env(&[("CHAINS_COUNT", "1"), ("CHAIN_1_CHAIN_ID", "1")]);
        assert!(load_with(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_scan_from_parse() {
        assert_eq!("latest".parse::<ScanFrom>().unwrap(), ScanFrom::Latest);
        assert_eq!("LATEST".parse::<ScanFrom>().unwrap(), ScanFrom::Latest);
        assert_eq!("1234".parse::<ScanFrom>().unwrap(), ScanFrom::Block(1234));
        assert!("yesterday".parse::<ScanFrom>().is_err());
    }

    #[test]
    fn test_duplicate_chain_ids_rejected() {
        let chain = ChainConfig {
            chain_id: 5,
            rpc_urls: vec!["http://localhost:8545".to_string()],
            ..Default::default()
        };
        assert!(validate_chains(&[chain.clone(), chain]).is_err());
        assert!(validate_chains(&[]).is_err());
    }

    #[test]
    fn test_malformed_override_address_rejected() {
        let chain = ChainConfig {
            chain_id: 5,
            rpc_urls: vec!["http://localhost:8545".to_string()],
            custody_address: Some("0x1234".to_string()),
            ..Default::default()
        };
        assert!(chain.validate().is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let chain = ChainConfig {
            chain_id: 5,
            confirmation_count: Some(3),
            gateway_address: Some("0x0000000000000000000000000000000000000009".to_string()),
            ..Default::default()
        };
        let params = chain.initial_params();
        assert_eq!(params.chain_id, 5);
        assert_eq!(params.confirmation_count, 3);
        assert_eq!(
            params.gateway_address,
            "0x0000000000000000000000000000000000000009"
        );
    }
}
