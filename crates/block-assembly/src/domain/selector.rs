//! Package selector
//!
//! Greedy ancestor-fee-rate selection. The candidate with the highest
//! modified package fee rate (its own cost plus every not-yet-selected
//! ancestor) is taken next; the whole package is admitted or rejected. On
//! rejection the offending transaction and its descendants are skipped for
//! the rest of the round, since every package containing them fails the same
//! way. On acceptance the aggregates of all descendants of the included
//! transactions are recomputed.
//!
//! Candidates live in an arena addressed by [`CandidateId`]; ancestor and
//! descendant sets are sorted index lists.
//!
//! Ties between equal fee rates break on the lowest transaction hash, which
//! together with hash-ordered ids makes a round deterministic for a given
//! snapshot and chain context.

use super::budget::{BudgetEnforcer, BudgetVerdict};
use super::entities::{
    ChainContext, InputConfirmation, LockTimeFlags, PackageAggregate, SequenceLockContext,
    TransactionCandidate,
};
use super::finality::{check_admissible, FinalityFailure};
use super::template::{CoinbaseReservation, TemplateBuilder};
use crate::error::{AssemblyError, Result};
use crate::ports::{CandidatePoolView, ChainContextProvider};
use primitive_types::H256;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Consecutive budget failures tolerated once the block is nearly full
pub const MAX_CONSECUTIVE_FAILURES: u32 = 1_000;

/// Remaining weight under which the block counts as nearly full
pub const BLOCK_FULL_MARGIN: u64 = 4_000;

/// Stable index of a candidate within one round's arena
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(pub usize);

#[derive(Clone, Debug)]
struct CandidateEntry {
    tx: TransactionCandidate,
    ancestors: Vec<CandidateId>,
    descendants: Vec<CandidateId>,
}

/// Immutable candidate graph for one round
#[derive(Clone, Debug, Default)]
pub struct CandidateArena {
    entries: Vec<CandidateEntry>,
    index: HashMap<H256, CandidateId>,
}

impl CandidateArena {
    /// Build the arena from a pool snapshot.
    ///
    /// Ids follow hash order so the arena does not depend on the view's
    /// iteration order. Fails with `InconsistentSnapshot` on duplicate
    /// hashes, zero-weight candidates, unknown relatives, asymmetric or
    /// non-transitive relations, cycles and pool parents missing from a
    /// spender's ancestor set.
    pub fn from_view<P>(pool: &P) -> Result<Self>
    where
        P: CandidatePoolView + ?Sized,
    {
        let mut txs: Vec<TransactionCandidate> = pool.iter_by_ancestor_fee_rate().cloned().collect();
        txs.sort_by(|a, b| a.hash.cmp(&b.hash));

        let mut index = HashMap::with_capacity(txs.len());
        for (i, tx) in txs.iter().enumerate() {
            if tx.weight == 0 {
                return Err(AssemblyError::InconsistentSnapshot(format!(
                    "candidate {:?} has zero weight",
                    tx.hash
                )));
            }
            if index.insert(tx.hash, CandidateId(i)).is_some() {
                return Err(AssemblyError::DuplicateTransaction(tx.hash));
            }
        }

        let resolve = |hash: &H256, related: Option<Vec<H256>>| -> Result<Vec<CandidateId>> {
            let related = related.ok_or_else(|| {
                AssemblyError::InconsistentSnapshot(format!("pool has no relations for {:?}", hash))
            })?;
            let mut ids = Vec::with_capacity(related.len());
            for r in related {
                if r == *hash {
                    return Err(AssemblyError::InconsistentSnapshot(format!(
                        "candidate {:?} is related to itself",
                        hash
                    )));
                }
                let id = index.get(&r).copied().ok_or_else(|| {
                    AssemblyError::InconsistentSnapshot(format!(
                        "{:?} references unknown candidate {:?}",
                        hash, r
                    ))
                })?;
                ids.push(id);
            }
            ids.sort_unstable();
            ids.dedup();
            Ok(ids)
        };

        let mut entries = Vec::with_capacity(txs.len());
        for tx in txs {
            let ancestors = resolve(&tx.hash, pool.ancestors_of(&tx.hash))?;
            let descendants = resolve(&tx.hash, pool.descendants_of(&tx.hash))?;
            entries.push(CandidateEntry {
                tx,
                ancestors,
                descendants,
            });
        }

        let arena = Self { entries, index };
        arena.check_relations()?;
        Ok(arena)
    }

    fn check_relations(&self) -> Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            let id = CandidateId(i);
            for input in &entry.tx.inputs {
                if let Some(parent) = self.index.get(&input.prevout.hash) {
                    if entry.ancestors.binary_search(parent).is_err() {
                        return Err(AssemblyError::InconsistentSnapshot(format!(
                            "{:?} spends pool transaction {:?} missing from its ancestors",
                            entry.tx.hash, input.prevout.hash
                        )));
                    }
                }
            }
            for ancestor in &entry.ancestors {
                let ancestor_entry = &self.entries[ancestor.0];
                if ancestor_entry.ancestors.binary_search(&id).is_ok() {
                    return Err(AssemblyError::InconsistentSnapshot(format!(
                        "dependency cycle between {:?} and {:?}",
                        entry.tx.hash, ancestor_entry.tx.hash
                    )));
                }
                if ancestor_entry.descendants.binary_search(&id).is_err() {
                    return Err(AssemblyError::InconsistentSnapshot(format!(
                        "{:?} lists ancestor {:?} which does not list it as descendant",
                        entry.tx.hash, ancestor_entry.tx.hash
                    )));
                }
                if ancestor_entry
                    .ancestors
                    .iter()
                    .any(|a| entry.ancestors.binary_search(a).is_err())
                {
                    return Err(AssemblyError::InconsistentSnapshot(format!(
                        "ancestor set of {:?} is not transitively closed",
                        entry.tx.hash
                    )));
                }
            }
            for descendant in &entry.descendants {
                if self.entries[descendant.0].ancestors.binary_search(&id).is_err() {
                    return Err(AssemblyError::InconsistentSnapshot(format!(
                        "{:?} lists descendant {:?} which does not list it as ancestor",
                        entry.tx.hash, self.entries[descendant.0].tx.hash
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Arena is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the candidate with `hash`
    pub fn id_of(&self, hash: &H256) -> Option<CandidateId> {
        self.index.get(hash).copied()
    }

    /// Candidate behind `id`
    pub fn tx(&self, id: CandidateId) -> &TransactionCandidate {
        &self.entries[id.0].tx
    }

    /// All unconfirmed ancestors of `id`
    pub fn ancestors(&self, id: CandidateId) -> &[CandidateId] {
        &self.entries[id.0].ancestors
    }

    /// All unconfirmed descendants of `id`
    pub fn descendants(&self, id: CandidateId) -> &[CandidateId] {
        &self.entries[id.0].descendants
    }

    /// Aggregate of `id` and every ancestor
    pub fn full_package(&self, id: CandidateId) -> PackageAggregate {
        let mut aggregate = PackageAggregate::of(self.tx(id));
        for ancestor in self.ancestors(id) {
            aggregate.add(self.tx(*ancestor));
        }
        aggregate
    }

    /// Topological key: ancestors always have fewer ancestors
    fn topo_key(&self, id: CandidateId) -> (usize, H256) {
        (self.ancestors(id).len(), self.tx(id).hash)
    }
}

/// Queue position: best fee rate first, then lowest hash
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct RankKey {
    fee: u64,
    weight: u64,
    hash: H256,
    id: CandidateId,
}

impl RankKey {
    fn aggregate(&self) -> PackageAggregate {
        PackageAggregate {
            fee: self.fee,
            weight: self.weight,
            sigop_cost: 0,
            count: 0,
        }
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .aggregate()
            .cmp_fee_rate(&self.aggregate())
            .then_with(|| self.hash.cmp(&other.hash))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Modified package aggregates and the ordered queue over them
#[derive(Clone, Debug)]
pub struct PackageQueue {
    modified: Vec<PackageAggregate>,
    queue: BTreeSet<RankKey>,
    queued: Vec<bool>,
}

impl PackageQueue {
    /// Queue every candidate with its full ancestor package
    pub fn new(arena: &CandidateArena) -> Self {
        let modified: Vec<PackageAggregate> = (0..arena.len())
            .map(|i| arena.full_package(CandidateId(i)))
            .collect();
        let queue = modified
            .iter()
            .enumerate()
            .map(|(i, agg)| RankKey {
                fee: agg.fee,
                weight: agg.weight,
                hash: arena.tx(CandidateId(i)).hash,
                id: CandidateId(i),
            })
            .collect();
        Self {
            modified,
            queue,
            queued: vec![true; arena.len()],
        }
    }

    fn key(&self, arena: &CandidateArena, id: CandidateId) -> RankKey {
        let agg = &self.modified[id.0];
        RankKey {
            fee: agg.fee,
            weight: agg.weight,
            hash: arena.tx(id).hash,
            id,
        }
    }

    /// Modified aggregate of `id` (itself plus unselected ancestors)
    pub fn modified(&self, id: CandidateId) -> &PackageAggregate {
        &self.modified[id.0]
    }

    /// Pop the best remaining candidate
    pub fn pop(&mut self) -> Option<CandidateId> {
        let key = self.queue.pop_first()?;
        self.queued[key.id.0] = false;
        Some(key.id)
    }

    /// Remove `id` from the queue if present
    pub fn remove(&mut self, arena: &CandidateArena, id: CandidateId) {
        if self.queued[id.0] {
            let key = self.key(arena, id);
            self.queue.remove(&key);
            self.queued[id.0] = false;
        }
    }

    /// Remaining queued candidates
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Nothing left to consider
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// `included` entered the block: subtract it from every descendant that
    /// has not been selected
    pub fn on_included(&mut self, arena: &CandidateArena, included: CandidateId, in_block: &[bool]) {
        let tx = arena.tx(included);
        for descendant in arena.descendants(included) {
            if in_block[descendant.0] {
                continue;
            }
            let requeue = self.queued[descendant.0];
            if requeue {
                let key = self.key(arena, *descendant);
                self.queue.remove(&key);
            }
            self.modified[descendant.0].remove(tx);
            if requeue {
                let key = self.key(arena, *descendant);
                self.queue.insert(key);
            }
        }
    }
}

/// Why a candidate was skipped this round
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Package fee rate below the inclusion minimum
    FeeRateBelowMinimum {
        /// Package fee
        fee: u64,
        /// Package weight
        weight: u64,
        /// Fee the package would have needed
        required: u64,
    },
    /// Package would exceed the block's weight or sigop limit
    ResourceBudgetExceeded {
        /// Weight after adding the package
        weight: u64,
        /// Sigop cost after adding the package
        sigop_cost: u64,
    },
    /// Failed the lock-time, sequence-lock or maturity gate
    Finality(FinalityFailure),
    /// Spends an output that is neither confirmed nor in the pool
    MissingInputs,
    /// An ancestor was rejected
    AncestorRejected {
        /// Rejected ancestor
        ancestor: H256,
    },
}

impl RejectReason {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FeeRateBelowMinimum { .. } => "fee_rate",
            Self::ResourceBudgetExceeded { .. } => "budget",
            Self::Finality(_) => "finality",
            Self::MissingInputs => "missing_inputs",
            Self::AncestorRejected { .. } => "ancestor_rejected",
        }
    }

    /// Structured error for the rejected transaction
    pub fn to_error(&self, tx_hash: H256, budget: &BudgetEnforcer) -> AssemblyError {
        match self {
            Self::FeeRateBelowMinimum { fee, weight, required } => AssemblyError::FeeRateBelowMinimum {
                fee: *fee,
                weight: *weight,
                required: *required,
            },
            Self::ResourceBudgetExceeded { weight, sigop_cost } => {
                AssemblyError::ResourceBudgetExceeded {
                    weight: *weight,
                    max_weight: budget.max_weight(),
                    sigop_cost: *sigop_cost,
                    max_sigop_cost: budget.max_sigop_cost(),
                }
            }
            Self::Finality(failure) => AssemblyError::FinalityViolation {
                tx_hash,
                reason: failure.to_string(),
            },
            Self::MissingInputs => AssemblyError::MissingInputs { tx_hash },
            Self::AncestorRejected { ancestor } => AssemblyError::FinalityViolation {
                tx_hash,
                reason: format!("ancestor {:?} rejected", ancestor),
            },
        }
    }
}

/// A candidate skipped this round
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedCandidate {
    /// Candidate hash
    pub hash: H256,
    /// Reason
    pub reason: RejectReason,
}

/// Why a round ended
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStop {
    /// Every candidate was selected or skipped
    PoolExhausted,
    /// The per-round consideration budget ran out
    ConsiderationBudgetExhausted,
    /// Too many consecutive budget failures with the block nearly full
    BlockFull,
}

/// Hashes included by one round, reported back to the pool owner
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionBatch {
    /// Tip the template extends
    pub tip_hash: H256,
    /// Height of the template
    pub target_height: u32,
    /// Included transaction hashes in block order
    pub included: Vec<H256>,
}

/// Result of one selection round
#[derive(Clone, Debug)]
pub struct SelectionReport {
    /// Block under construction with the selected transactions
    pub builder: TemplateBuilder,
    /// Why the round ended
    pub stop: SelectionStop,
    /// Skipped candidates with their reasons
    pub skipped: Vec<SkippedCandidate>,
    /// Packages popped from the queue
    pub considered: usize,
    /// Included hashes for the pool owner
    pub inclusion: InclusionBatch,
}

/// Greedy package selector
#[derive(Clone, Debug)]
pub struct PackageSelector {
    budget: BudgetEnforcer,
    flags: LockTimeFlags,
    max_candidates_considered: usize,
    reservation: CoinbaseReservation,
}

struct Round<'a, C: ?Sized> {
    arena: &'a CandidateArena,
    chain: &'a C,
    context: &'a ChainContext,
    flags: LockTimeFlags,
    cutoff: i64,
    gate_cache: HashMap<CandidateId, std::result::Result<(), RejectReason>>,
    in_block: Vec<bool>,
    skipped: Vec<bool>,
    skip_list: Vec<SkippedCandidate>,
}

impl<'a, C> Round<'a, C>
where
    C: ChainContextProvider + ?Sized,
{
    fn gate(&mut self, id: CandidateId) -> std::result::Result<(), RejectReason> {
        if let Some(cached) = self.gate_cache.get(&id) {
            return cached.clone();
        }
        let verdict = self.evaluate_gate(self.arena.tx(id));
        self.gate_cache.insert(id, verdict.clone());
        verdict
    }

    fn evaluate_gate(&self, tx: &TransactionCandidate) -> std::result::Result<(), RejectReason> {
        let target_height = self.context.target_height();
        let tip_mtp = self.context.tip.median_time_past;

        let mut inputs = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if self.arena.id_of(&input.prevout.hash).is_some() {
                inputs.push(InputConfirmation {
                    height: target_height,
                    median_time_past: tip_mtp,
                    is_coinbase: false,
                });
                continue;
            }
            match self.chain.input_confirmation(&input.prevout) {
                Some(confirmation) => inputs.push(confirmation),
                None => return Err(RejectReason::MissingInputs),
            }
        }

        let lock_context = SequenceLockContext {
            target_height,
            tip_median_time_past: tip_mtp,
            inputs,
        };
        check_admissible(tx, self.flags, self.cutoff, &lock_context).map_err(RejectReason::Finality)
    }

    /// Skip `id` and every descendant not already in the block
    fn reject(&mut self, queue: &mut PackageQueue, id: CandidateId, reason: RejectReason) {
        let hash = self.arena.tx(id).hash;
        tracing::debug!(tx = ?hash, reason = reason.kind(), "package rejected");

        if !self.skipped[id.0] {
            self.skipped[id.0] = true;
            queue.remove(self.arena, id);
            self.skip_list.push(SkippedCandidate { hash, reason });
        }
        for descendant in self.arena.descendants(id) {
            if self.in_block[descendant.0] || self.skipped[descendant.0] {
                continue;
            }
            self.skipped[descendant.0] = true;
            queue.remove(self.arena, *descendant);
            self.skip_list.push(SkippedCandidate {
                hash: self.arena.tx(*descendant).hash,
                reason: RejectReason::AncestorRejected { ancestor: hash },
            });
        }
    }
}

impl PackageSelector {
    /// Create a selector
    pub fn new(
        budget: BudgetEnforcer,
        flags: LockTimeFlags,
        max_candidates_considered: usize,
        reservation: CoinbaseReservation,
    ) -> Self {
        Self {
            budget,
            flags,
            max_candidates_considered,
            reservation,
        }
    }

    /// Budget enforcer in use
    pub fn budget(&self) -> &BudgetEnforcer {
        &self.budget
    }

    /// Stop once failures keep piling up against a block with almost no room left
    fn block_full(&self, builder: &TemplateBuilder, consecutive_failures: u32) -> bool {
        consecutive_failures > MAX_CONSECUTIVE_FAILURES
            && self.budget.nearly_full(builder.totals(), BLOCK_FULL_MARGIN)
    }

    /// Run one selection round over `pool` on top of `context`
    #[tracing::instrument(skip(self, pool, chain, context), fields(pool_size = pool.len(), height = context.target_height()))]
    pub fn select<P, C>(&self, pool: &P, chain: &C, context: ChainContext) -> Result<SelectionReport>
    where
        P: CandidatePoolView + ?Sized,
        C: ChainContextProvider + ?Sized,
    {
        let arena = CandidateArena::from_view(pool)?;
        let mut queue = PackageQueue::new(&arena);
        let mut builder = TemplateBuilder::new(context.clone(), self.reservation);

        let mut round = Round {
            arena: &arena,
            chain,
            context: &context,
            flags: self.flags,
            cutoff: context.lock_time_cutoff(self.flags),
            gate_cache: HashMap::new(),
            in_block: vec![false; arena.len()],
            skipped: vec![false; arena.len()],
            skip_list: Vec::new(),
        };

        let mut considered = 0usize;
        let mut consecutive_failures = 0u32;

        let stop = loop {
            if queue.is_empty() {
                break SelectionStop::PoolExhausted;
            }
            if considered >= self.max_candidates_considered {
                break SelectionStop::ConsiderationBudgetExhausted;
            }
            let Some(head) = queue.pop() else {
                break SelectionStop::PoolExhausted;
            };
            considered += 1;

            let aggregate = *queue.modified(head);
            match self.budget.check(builder.totals(), &aggregate) {
                BudgetVerdict::Admit => {}
                BudgetVerdict::BelowMinimumFeeRate { required } => {
                    let reason = RejectReason::FeeRateBelowMinimum {
                        fee: aggregate.fee,
                        weight: aggregate.weight,
                        required,
                    };
                    round.reject(&mut queue, head, reason);
                    continue;
                }
                BudgetVerdict::ExceedsLimits { weight, sigop_cost } => {
                    round.reject(&mut queue, head, RejectReason::ResourceBudgetExceeded { weight, sigop_cost });
                    consecutive_failures += 1;
                    if self.block_full(&builder, consecutive_failures) {
                        break SelectionStop::BlockFull;
                    }
                    continue;
                }
            }

            let mut members: Vec<CandidateId> = arena
                .ancestors(head)
                .iter()
                .copied()
                .filter(|a| !round.in_block[a.0])
                .chain(std::iter::once(head))
                .collect();
            members.sort_by_key(|id| arena.topo_key(*id));

            let mut gate_failure = None;
            for member in &members {
                if let Err(reason) = round.gate(*member) {
                    gate_failure = Some((*member, reason));
                    break;
                }
            }
            if let Some((member, reason)) = gate_failure {
                // head is a descendant of any failing ancestor
                round.reject(&mut queue, member, reason);
                consecutive_failures += 1;
                if self.block_full(&builder, consecutive_failures) {
                    break SelectionStop::BlockFull;
                }
                continue;
            }

            for member in &members {
                queue.remove(&arena, *member);
                round.in_block[member.0] = true;
                builder.push(arena.tx(*member).clone())?;
            }
            self.budget.commit(builder.totals_mut(), &aggregate);
            for member in &members {
                queue.on_included(&arena, *member, &round.in_block);
            }
            consecutive_failures = 0;

            tracing::debug!(
                head = ?arena.tx(head).hash,
                package_size = members.len(),
                fee = aggregate.fee,
                weight = aggregate.weight,
                "package selected"
            );
        };

        let inclusion = InclusionBatch {
            tip_hash: context.tip.hash,
            target_height: context.target_height(),
            included: builder.transactions().iter().map(|tx| tx.hash).collect(),
        };

        tracing::info!(
            selected = builder.len(),
            skipped = round.skip_list.len(),
            considered,
            weight = builder.totals().weight,
            fees = builder.totals().fees,
            stop = ?stop,
            "selection round complete"
        );

        Ok(SelectionReport {
            builder,
            stop,
            skipped: round.skip_list,
            considered,
            inclusion,
        })
    }
}
