//! Consensus configuration
//!
//! Defaults mirror mainnet parameters: ten obligations validators with a
//! seven vote threshold, twenty checkpointing validators with thirteen, and a
//! checkpoint every fourth block.

use serde::{Deserialize, Serialize};

use crate::domain::QuorumType;
use crate::error::ConfigError;

/// Committee sizes and thresholds for one quorum type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumSizes {
    /// Number of validators drawn per quorum
    pub validators: usize,
    /// Signatures needed for a checkpoint or state change
    pub min_votes: usize,
    /// Floor on the number of workers tested
    pub min_workers: usize,
    /// Workers tested scale as one in `nth_of_network` of the candidates
    pub nth_of_network: usize,
}

impl QuorumSizes {
    /// Smallest active set that yields a quorum.
    pub fn min_nodes(&self) -> usize {
        self.validators + 1
    }

    fn validate(&self, quorum: &'static str) -> Result<(), ConfigError> {
        if self.validators == 0 {
            return Err(ConfigError::NoValidators { quorum });
        }
        if self.min_votes == 0 || self.min_votes > self.validators {
            return Err(ConfigError::MinVotesOutOfRange {
                quorum,
                min_votes: self.min_votes,
                validators: self.validators,
            });
        }
        if self.nth_of_network == 0 {
            return Err(ConfigError::ZeroValue {
                field: "nth_of_network",
            });
        }
        Ok(())
    }
}

/// Swarm partitioning thresholds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Below this many active nodes no swarm exists
    pub min_swarm_size: usize,
    /// Target members per swarm
    pub ideal_swarm_size: usize,
    /// Excess unit over the ideal size; one full new swarm by default
    pub excess_base: usize,
    /// Excess units needed before another swarm is opened
    pub new_swarm_excess_multiple: usize,
}

impl SwarmConfig {
    /// Surplus over `swarms * ideal_swarm_size` that opens a new swarm.
    pub fn split_threshold(&self) -> usize {
        self.excess_base * self.new_swarm_excess_multiple
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            min_swarm_size: 5,
            ideal_swarm_size: 7,
            excess_base: 7,
            new_swarm_excess_multiple: 1,
        }
    }
}

/// Hard fork versions at which features switch on
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardForkRules {
    /// Registrations, quorums and state changes
    pub service_nodes: u8,
    /// Swarm assignment
    pub swarms: u8,
    /// Checkpoint quorums and checkpoint votes
    pub checkpointing: u8,
}

impl Default for HardForkRules {
    fn default() -> Self {
        Self {
            service_nodes: 9,
            swarms: 10,
            checkpointing: 12,
        }
    }
}

/// Consensus configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNodeConfig {
    pub obligations: QuorumSizes,
    pub checkpointing: QuorumSizes,
    /// Checkpoint quorums exist at heights divisible by this
    pub checkpoint_interval: u64,
    /// Blocks a state change stays valid after its quorum height
    pub state_change_tx_lifetime: u64,
    /// Quorum at height h is seeded by the block hash at h - offset
    pub quorum_seed_offset: u64,
    /// Block hashes and quorums kept per fork
    pub history_window: u64,
    /// Blocks a registration's stake stays locked
    pub stake_lock_blocks: u64,
    /// Depth below the canonical tip at which alternative forks are dropped
    pub fork_retention: u64,
    pub swarm: SwarmConfig,
    pub hard_forks: HardForkRules,
}

impl Default for ServiceNodeConfig {
    fn default() -> Self {
        Self {
            obligations: QuorumSizes {
                validators: 10,
                min_votes: 7,
                min_workers: 50,
                nth_of_network: 100,
            },
            checkpointing: QuorumSizes {
                validators: 20,
                min_votes: 13,
                min_workers: 1,
                nth_of_network: 100,
            },
            checkpoint_interval: 4,
            state_change_tx_lifetime: 60,
            quorum_seed_offset: 1,
            history_window: 720,
            stake_lock_blocks: 21_600,
            fork_retention: 720,
            swarm: SwarmConfig::default(),
            hard_forks: HardForkRules::default(),
        }
    }
}

impl ServiceNodeConfig {
    /// Committee sizes for `quorum_type`.
    pub fn sizes(&self, quorum_type: QuorumType) -> &QuorumSizes {
        match quorum_type {
            QuorumType::Obligations => &self.obligations,
            QuorumType::Checkpointing => &self.checkpointing,
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SNQ_CHECKPOINT_INTERVAL` and `SNQ_TX_LIFETIME` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(interval) = parse_override("SNQ_CHECKPOINT_INTERVAL", &lookup)? {
            self.checkpoint_interval = interval;
        }
        if let Some(lifetime) = parse_override("SNQ_TX_LIFETIME", &lookup)? {
            self.state_change_tx_lifetime = lifetime;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.obligations.validate("obligations")?;
        self.checkpointing.validate("checkpointing")?;

        if self.checkpoint_interval == 0 {
            return Err(ConfigError::ZeroValue {
                field: "checkpoint_interval",
            });
        }
        if self.swarm.ideal_swarm_size == 0 {
            return Err(ConfigError::ZeroValue {
                field: "ideal_swarm_size",
            });
        }
        if self.swarm.split_threshold() == 0 {
            return Err(ConfigError::ZeroValue {
                field: "excess_base",
            });
        }
        if self.stake_lock_blocks == 0 {
            return Err(ConfigError::ZeroValue {
                field: "stake_lock_blocks",
            });
        }

        // Validating a state change needs its quorum and the quorum's seed.
        let min_history = self.state_change_tx_lifetime + self.quorum_seed_offset + 1;
        if self.history_window < min_history {
            return Err(ConfigError::WindowTooSmall {
                field: "history_window",
                value: self.history_window,
                min: min_history,
            });
        }
        if self.fork_retention < self.checkpoint_interval * 2 {
            return Err(ConfigError::WindowTooSmall {
                field: "fork_retention",
                value: self.fork_retention,
                min: self.checkpoint_interval * 2,
            });
        }
        Ok(())
    }
}

fn parse_override(
    var: &'static str,
    lookup: &impl Fn(&'static str) -> Option<String>,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}
