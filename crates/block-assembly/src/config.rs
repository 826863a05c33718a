//! Configuration types for block assembly

use crate::domain::{
    BudgetEnforcer, CoinbaseParams, CoinbaseReservation, FeeRate, Height, LockTimeFlags,
    PackageSelector,
};
use crate::error::{AssemblyError, Result};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Runtime configuration for block assembly
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Package selection and budgets
    pub selector: SelectorConfig,

    /// Proof-of-work search and coinbase payout
    pub mining: MiningConfig,

    /// Network consensus parameters
    pub consensus: ConsensusConfig,
}

impl AssemblerConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AssemblyError::InvalidConfig(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let s = &self.selector;
        if s.max_block_weight > crate::MAX_BLOCK_WEIGHT {
            return Err(AssemblyError::InvalidConfig(format!(
                "max_block_weight {} exceeds consensus maximum {}",
                s.max_block_weight,
                crate::MAX_BLOCK_WEIGHT
            )));
        }
        if s.coinbase_reserved_weight >= s.max_block_weight {
            return Err(AssemblyError::InvalidConfig(format!(
                "coinbase reservation {} leaves no room under max_block_weight {}",
                s.coinbase_reserved_weight, s.max_block_weight
            )));
        }
        if s.max_block_sigops_cost > crate::MAX_BLOCK_SIGOPS_COST
            || s.coinbase_reserved_sigops >= s.max_block_sigops_cost
        {
            return Err(AssemblyError::InvalidConfig(format!(
                "sigop budget {} (reserved {}) outside 1..={}",
                s.max_block_sigops_cost,
                s.coinbase_reserved_sigops,
                crate::MAX_BLOCK_SIGOPS_COST
            )));
        }
        if s.max_candidates_considered == 0 {
            return Err(AssemblyError::InvalidConfig(
                "max_candidates_considered must be positive".into(),
            ));
        }
        if self.mining.workers == 0 {
            return Err(AssemblyError::InvalidConfig("mining.workers must be positive".into()));
        }
        if self.consensus.pow_limit.is_zero() {
            return Err(AssemblyError::InvalidConfig("pow_limit must be non-zero".into()));
        }
        if self.consensus.halving_interval == 0 {
            return Err(AssemblyError::InvalidConfig("halving_interval must be positive".into()));
        }
        Ok(())
    }

    /// Budget enforcer for these limits
    pub fn budget_enforcer(&self) -> BudgetEnforcer {
        BudgetEnforcer::new(
            self.selector.max_block_weight,
            self.selector.max_block_sigops_cost,
            FeeRate(self.selector.block_min_fee_rate),
        )
    }

    /// Package selector for these limits
    pub fn package_selector(&self) -> PackageSelector {
        PackageSelector::new(
            self.budget_enforcer(),
            self.selector.lock_time_flags,
            self.selector.max_candidates_considered,
            CoinbaseReservation {
                weight: self.selector.coinbase_reserved_weight,
                sigop_cost: self.selector.coinbase_reserved_sigops,
            },
        )
    }

    /// Coinbase and header parameters
    pub fn coinbase_params(&self) -> CoinbaseParams {
        CoinbaseParams {
            block_version: self.consensus.block_version,
            payout_script: self.mining.payout_script.clone(),
            extra_nonce: self.mining.extra_nonce,
            halving_interval: self.consensus.halving_interval,
        }
    }
}

/// Selection limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Maximum block weight including the coinbase reservation
    pub max_block_weight: u64,

    /// Maximum block sigop cost including the coinbase reservation
    pub max_block_sigops_cost: u64,

    /// Minimum package fee rate (base units per 1000 weight)
    pub block_min_fee_rate: u64,

    /// Weight kept free for the coinbase
    pub coinbase_reserved_weight: u64,

    /// Sigop cost kept free for the coinbase
    pub coinbase_reserved_sigops: u64,

    /// Packages popped per round before giving up
    pub max_candidates_considered: usize,

    /// Lock-time evaluation switches
    pub lock_time_flags: LockTimeFlags,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let reservation = CoinbaseReservation::default();
        Self {
            max_block_weight: crate::DEFAULT_BLOCK_MAX_WEIGHT,
            max_block_sigops_cost: crate::MAX_BLOCK_SIGOPS_COST,
            block_min_fee_rate: crate::DEFAULT_BLOCK_MIN_FEE_RATE,
            coinbase_reserved_weight: reservation.weight,
            coinbase_reserved_sigops: reservation.sigop_cost,
            max_candidates_considered: crate::DEFAULT_MAX_CANDIDATES_CONSIDERED,
            lock_time_flags: LockTimeFlags::default(),
        }
    }
}

/// Proof-of-work search configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Worker threads (default: num_cpus)
    pub workers: usize,

    /// Coinbase output script, hex encoded in JSON
    #[serde(with = "hex_bytes")]
    pub payout_script: Vec<u8>,

    /// Extra nonce committed in the coinbase
    pub extra_nonce: u32,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            payout_script: Vec::new(),
            extra_nonce: 0,
        }
    }
}

/// Network consensus parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Easiest allowed target
    pub pow_limit: U256,

    /// Blocks between subsidy halvings
    pub halving_interval: Height,

    /// Header version
    pub block_version: i32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            pow_limit: U256::MAX >> 1,
            halving_interval: crate::domain::template::DEFAULT_HALVING_INTERVAL,
            block_version: 4,
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AssemblerConfig::default();
        assert_eq!(config.selector.max_block_weight, crate::DEFAULT_BLOCK_MAX_WEIGHT);
        assert_eq!(config.selector.coinbase_reserved_weight, 4_000);
        assert!(config.mining.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{
            "selector": { "max_block_weight": 1000000, "block_min_fee_rate": 0 },
            "mining": { "workers": 2, "payout_script": "51" }
        }"#;
        let config = AssemblerConfig::from_json(json).unwrap();
        assert_eq!(config.selector.max_block_weight, 1_000_000);
        assert_eq!(config.selector.block_min_fee_rate, 0);
        assert_eq!(config.selector.max_block_sigops_cost, crate::MAX_BLOCK_SIGOPS_COST);
        assert_eq!(config.mining.payout_script, vec![0x51]);
        assert_eq!(config.coinbase_params().payout_script, vec![0x51]);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let too_heavy = r#"{ "selector": { "max_block_weight": 4000001 } }"#;
        assert!(matches!(
            AssemblerConfig::from_json(too_heavy),
            Err(AssemblyError::InvalidConfig(_))
        ));

        let mut config = AssemblerConfig::default();
        config.selector.coinbase_reserved_weight = config.selector.max_block_weight;
        assert!(config.validate().is_err());

        let mut config = AssemblerConfig::default();
        config.mining.workers = 0;
        assert!(config.validate().is_err());

        assert!(AssemblerConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_hex_script() {
        let mut config = AssemblerConfig::default();
        config.mining.payout_script = vec![0x76, 0xa9];
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"76a9\""));
        assert_eq!(AssemblerConfig::from_json(&json).unwrap(), config);
    }
}
