//! Block assembly service
//!
//! Orchestrates one round: chain tip → package selection → template
//! finalization → proof-of-work search → submission → inclusion report.
//! Selection and mining are CPU bound and run on `spawn_blocking`.

use crate::{
    config::AssemblerConfig,
    domain::{
        invariants::validate_block_template, mine_parallel, BlockTemplate, CancelFlag,
        ChainContext, MinedBlock, MiningState, NonceRange, PackageSelector,
    },
    error::{AssemblyError, Result},
    metrics::Metrics,
    ports::{
        AssembledTemplate, AssemblyStatus, BlockAssemblyService, BlockSubmitter,
        CandidatePoolView, ChainContextProvider, InclusionReporter, ProducedBlock, PuzzleSolver,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Source of the candidate block time (UNIX seconds)
pub type TimeSource = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Collaborators the assembler drives
#[derive(Clone)]
pub struct AssemblerPorts {
    /// Pending transaction pool
    pub pool: Arc<dyn CandidatePoolView>,
    /// Chain tip and confirmed outputs
    pub chain: Arc<dyn ChainContextProvider>,
    /// Puzzle solver
    pub solver: Arc<dyn PuzzleSolver>,
    /// Block sink
    pub submitter: Arc<dyn BlockSubmitter>,
    /// Inclusion sink
    pub reporter: Arc<dyn InclusionReporter>,
}

/// Concrete implementation of [`BlockAssemblyService`]
pub struct BlockAssembler {
    config: AssemblerConfig,
    selector: PackageSelector,
    ports: AssemblerPorts,
    metrics: Arc<Metrics>,
    status: RwLock<AssemblyStatus>,
    active_search: Mutex<Option<CancelFlag>>,
    time_source: TimeSource,
}

impl BlockAssembler {
    /// Create an assembler; fails if the configuration is invalid
    pub fn new(config: AssemblerConfig, ports: AssemblerPorts) -> Result<Self> {
        config.validate()?;
        info!(
            max_block_weight = config.selector.max_block_weight,
            min_fee_rate = config.selector.block_min_fee_rate,
            workers = config.mining.workers,
            solver = ports.solver.name(),
            "initializing block assembler"
        );

        Ok(Self {
            selector: config.package_selector(),
            config,
            ports,
            metrics: Arc::new(Metrics::new()),
            status: RwLock::new(AssemblyStatus::default()),
            active_search: Mutex::new(None),
            time_source: Arc::new(|| Utc::now().timestamp()),
        })
    }

    /// Replace the wall clock used for the header time
    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    /// Shared metrics
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Active configuration
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    fn status_mut(&self) -> RwLockWriteGuard<'_, AssemblyStatus> {
        self.status.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn search_slot(&self) -> MutexGuard<'_, Option<CancelFlag>> {
        self.active_search.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the single search slot
    fn begin_search(&self) -> Result<SearchSlot<'_>> {
        let cancel = CancelFlag::new();
        {
            let mut active = self.search_slot();
            if active.is_some() {
                return Err(AssemblyError::Internal("a proof-of-work search is already running".into()));
            }
            *active = Some(cancel.clone());
        }
        let mut status = self.status_mut();
        status.mining = true;
        status.mining_state = MiningState::Hashing;
        Ok(SearchSlot {
            assembler: self,
            cancel,
            settled: false,
        })
    }

    async fn select_round(&self, round_id: Uuid) -> Result<AssembledTemplate> {
        let tip = self.ports.chain.chain_tip().map_err(chain_context_error)?;
        let block_time = (self.time_source)().max(tip.median_time_past + 1);
        let context = ChainContext { tip, block_time };

        let selector = self.selector.clone();
        let pool = Arc::clone(&self.ports.pool);
        let chain = Arc::clone(&self.ports.chain);

        let started = Instant::now();
        let report = tokio::task::spawn_blocking(move || {
            selector.select(pool.as_ref(), chain.as_ref(), context)
        })
        .await
        .map_err(|e| AssemblyError::Internal(format!("selection task failed: {}", e)))??;
        let elapsed_us = started.elapsed().as_micros() as u64;

        let template = report.builder.finalize(&self.config.coinbase_params())?;
        validate_block_template(&template, self.selector.budget(), self.config.consensus.halving_interval)?;

        self.metrics
            .record_round(template.transactions.len(), template.total_fees, elapsed_us);
        for skipped in &report.skipped {
            self.metrics.record_rejection(&skipped.reason);
        }

        Ok(AssembledTemplate {
            round_id,
            template: Arc::new(template),
            stop: report.stop,
            skipped: report.skipped,
            considered: report.considered,
            inclusion: report.inclusion,
        })
    }
}

/// Active proof-of-work search.
///
/// Dropping the slot before [`SearchSlot::settle`] (the mining future was
/// dropped) raises the cancel flag so the blocking workers stop, and frees
/// the slot for the next search.
struct SearchSlot<'a> {
    assembler: &'a BlockAssembler,
    cancel: CancelFlag,
    settled: bool,
}

impl SearchSlot<'_> {
    /// Release the slot after the search returned; the caller records the outcome
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for SearchSlot<'_> {
    fn drop(&mut self) {
        self.assembler.search_slot().take();
        if self.settled {
            return;
        }
        self.cancel.cancel();
        self.assembler.metrics.record_mining_cancelled();
        let mut status = self.assembler.status_mut();
        status.mining = false;
        status.mining_state = MiningState::Cancelled;
        warn!("mining future dropped; proof-of-work search cancelled");
    }
}

fn chain_context_error(e: AssemblyError) -> AssemblyError {
    match e {
        AssemblyError::ChainContext(_) => e,
        other => AssemblyError::ChainContext(other.to_string()),
    }
}

fn submission_error(e: AssemblyError) -> AssemblyError {
    match e {
        AssemblyError::Submission(_) => e,
        other => AssemblyError::Submission(other.to_string()),
    }
}

#[async_trait]
impl BlockAssemblyService for BlockAssembler {
    #[tracing::instrument(skip(self))]
    async fn build_template(&self) -> Result<AssembledTemplate> {
        let round_id = Uuid::new_v4();
        let assembled = self.select_round(round_id).await?;

        info!(
            %round_id,
            height = assembled.template.height,
            transactions = assembled.template.transactions.len(),
            fees = assembled.template.total_fees,
            weight = assembled.template.total_weight,
            skipped = assembled.skipped.len(),
            stop = ?assembled.stop,
            "template assembled"
        );

        let mut status = self.status_mut();
        status.rounds_completed += 1;
        status.last_round_id = Some(round_id);
        status.last_template_height = Some(assembled.template.height);

        Ok(assembled)
    }

    #[tracing::instrument(skip(self, template), fields(height = template.height))]
    async fn mine_template(&self, template: Arc<BlockTemplate>) -> Result<MinedBlock> {
        let slot = self.begin_search()?;

        let solver = Arc::clone(&self.ports.solver);
        let header = template.header.clone();
        let pow_limit = self.config.consensus.pow_limit;
        let workers = self.config.mining.workers;
        let cancel = slot.cancel.clone();

        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            mine_parallel(solver.as_ref(), &header, pow_limit, workers, NonceRange::full(), &cancel)
        })
        .await;
        let elapsed = started.elapsed();

        slot.settle();
        let result = joined
            .map_err(|e| AssemblyError::Internal(format!("mining task failed: {}", e)))
            .and_then(|r| r);

        let mut status = self.status_mut();
        status.mining = false;
        match result {
            Ok(outcome) => {
                self.metrics.record_mining(
                    outcome.nonces_tried,
                    outcome.solutions_rejected,
                    elapsed.as_millis() as u64,
                );
                self.metrics.record_block_mined();

                let secs = elapsed.as_secs_f64();
                status.mining_state = MiningState::Found;
                status.blocks_mined += 1;
                status.last_block_hash = Some(outcome.hash);
                status.last_block_at = Some(Utc::now());
                status.hashrate = (secs > 0.0).then(|| outcome.nonces_tried as f64 / secs);

                info!(hash = ?outcome.hash, nonces = outcome.nonces_tried, "block mined");
                Ok(MinedBlock::new(template, &outcome))
            }
            Err(e) => {
                match &e {
                    AssemblyError::PuzzleSolveCancelled { nonces_tried } => {
                        self.metrics.record_mining(*nonces_tried, 0, elapsed.as_millis() as u64);
                        self.metrics.record_mining_cancelled();
                        status.mining_state = MiningState::Cancelled;
                        info!(nonces = nonces_tried, "proof-of-work search cancelled");
                    }
                    AssemblyError::NonceSpaceExhausted { nonces_tried } => {
                        self.metrics.record_mining(*nonces_tried, 0, elapsed.as_millis() as u64);
                        status.mining_state = MiningState::Exhausted;
                        warn!(nonces = nonces_tried, "nonce space exhausted");
                    }
                    other => {
                        status.mining_state = MiningState::Idle;
                        warn!(error = %other, "proof-of-work search failed");
                    }
                }
                Err(e)
            }
        }
    }

    async fn produce_block(&self) -> Result<ProducedBlock> {
        let assembled = self.build_template().await?;
        let block = self.mine_template(Arc::clone(&assembled.template)).await?;

        let receipt = self
            .ports
            .submitter
            .submit_block(block.clone())
            .await
            .map_err(submission_error)?;
        if receipt.accepted {
            self.ports
                .reporter
                .report_inclusion(assembled.inclusion.clone())
                .await
                .map_err(submission_error)?;
            debug!(round_id = %assembled.round_id, included = assembled.inclusion.included.len(), "inclusion reported");
        } else {
            warn!(round_id = %assembled.round_id, hash = ?block.hash, "mined block was not accepted");
        }

        Ok(ProducedBlock {
            round_id: assembled.round_id,
            block,
            receipt,
        })
    }

    async fn cancel_mining(&self) -> bool {
        match self.search_slot().as_ref() {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    async fn status(&self) -> AssemblyStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
