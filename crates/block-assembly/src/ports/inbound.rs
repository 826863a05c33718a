//! Inbound ports (driving side - API)

use crate::domain::{
    BlockTemplate, InclusionBatch, MinedBlock, MiningState, SelectionStop, SkippedCandidate,
};
use crate::error::Result;
use crate::ports::outbound::SubmissionReceipt;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use primitive_types::H256;
use std::sync::Arc;
use uuid::Uuid;

/// Primary port: block assembly service
#[async_trait]
pub trait BlockAssemblyService: Send + Sync {
    /// Select transactions from the pool and finalize a template
    async fn build_template(&self) -> Result<AssembledTemplate>;

    /// Search for a proof-of-work solution for `template`
    async fn mine_template(&self, template: Arc<BlockTemplate>) -> Result<MinedBlock>;

    /// Build, mine, submit and report one block
    async fn produce_block(&self) -> Result<ProducedBlock>;

    /// Cancel a running search; returns whether one was running
    async fn cancel_mining(&self) -> bool;

    /// Current status
    async fn status(&self) -> AssemblyStatus;
}

/// Result of one selection round
#[derive(Clone, Debug)]
pub struct AssembledTemplate {
    /// Round identifier for log correlation
    pub round_id: Uuid,

    /// Frozen template
    pub template: Arc<BlockTemplate>,

    /// Why selection stopped
    pub stop: SelectionStop,

    /// Candidates skipped this round
    pub skipped: Vec<SkippedCandidate>,

    /// Packages considered
    pub considered: usize,

    /// Included hashes for the pool owner
    pub inclusion: InclusionBatch,
}

/// A block that was mined and handed onward
#[derive(Clone, Debug)]
pub struct ProducedBlock {
    /// Round identifier
    pub round_id: Uuid,

    /// Mined block
    pub block: MinedBlock,

    /// Submission result
    pub receipt: SubmissionReceipt,
}

/// Assembly status
#[derive(Clone, Debug, PartialEq)]
pub struct AssemblyStatus {
    /// A proof-of-work search is running
    pub mining: bool,

    /// State of the last or current search
    pub mining_state: MiningState,

    /// Selection rounds completed
    pub rounds_completed: u64,

    /// Blocks mined this session
    pub blocks_mined: u64,

    /// Last round identifier
    pub last_round_id: Option<Uuid>,

    /// Height of the last template
    pub last_template_height: Option<u32>,

    /// Hash of the last mined block
    pub last_block_hash: Option<H256>,

    /// When the last block was mined
    pub last_block_at: Option<DateTime<Utc>>,

    /// Hash rate of the last search (nonces per second)
    pub hashrate: Option<f64>,
}

impl Default for AssemblyStatus {
    fn default() -> Self {
        Self {
            mining: false,
            mining_state: MiningState::Idle,
            rounds_completed: 0,
            blocks_mined: 0,
            last_round_id: None,
            last_template_height: None,
            last_block_hash: None,
            last_block_at: None,
            hashrate: None,
        }
    }
}
