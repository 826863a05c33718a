//! In-memory pool snapshot
//!
//! Builds the ancestor/descendant relation from the candidates' inputs: an
//! input whose prevout hash is another candidate makes that candidate a
//! parent. Useful for embedders without a pool of their own and for tests.

use crate::domain::{PackageAggregate, TransactionCandidate};
use crate::error::{AssemblyError, Result};
use crate::ports::CandidatePoolView;
use primitive_types::H256;
use std::collections::{BTreeSet, HashMap};

#[derive(Copy, Clone, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Immutable snapshot of pending transactions
#[derive(Clone, Debug, Default)]
pub struct InMemoryPoolSnapshot {
    ordered: Vec<TransactionCandidate>,
    ancestors: HashMap<H256, Vec<H256>>,
    descendants: HashMap<H256, Vec<H256>>,
}

impl InMemoryPoolSnapshot {
    /// Build a snapshot; fails on duplicate hashes or dependency cycles
    pub fn new(candidates: Vec<TransactionCandidate>) -> Result<Self> {
        let mut by_hash: HashMap<H256, TransactionCandidate> = HashMap::with_capacity(candidates.len());
        for tx in candidates {
            let hash = tx.hash;
            if by_hash.insert(hash, tx).is_some() {
                return Err(AssemblyError::DuplicateTransaction(hash));
            }
        }

        let parents: HashMap<H256, BTreeSet<H256>> = by_hash
            .values()
            .map(|tx| {
                let parents = tx
                    .inputs
                    .iter()
                    .map(|input| input.prevout.hash)
                    .filter(|hash| *hash != tx.hash && by_hash.contains_key(hash))
                    .collect();
                (tx.hash, parents)
            })
            .collect();

        let mut closed: HashMap<H256, BTreeSet<H256>> = HashMap::with_capacity(by_hash.len());
        let mut visits: HashMap<H256, Visit> = HashMap::with_capacity(by_hash.len());
        let mut hashes: Vec<H256> = by_hash.keys().copied().collect();
        hashes.sort();
        for hash in &hashes {
            Self::close_ancestors(*hash, &parents, &mut visits, &mut closed)?;
        }

        let mut descendants: HashMap<H256, Vec<H256>> =
            hashes.iter().map(|h| (*h, Vec::new())).collect();
        for (hash, ancestors) in &closed {
            for ancestor in ancestors {
                if let Some(list) = descendants.get_mut(ancestor) {
                    list.push(*hash);
                }
            }
        }
        for list in descendants.values_mut() {
            list.sort();
        }

        let ancestors: HashMap<H256, Vec<H256>> = closed
            .into_iter()
            .map(|(hash, set)| (hash, set.into_iter().collect()))
            .collect();

        let mut ordered: Vec<TransactionCandidate> = by_hash.into_values().collect();
        let costs: HashMap<H256, (u64, u64)> = ordered.iter().map(|tx| (tx.hash, (tx.fee, tx.weight))).collect();
        let packages: HashMap<H256, PackageAggregate> = ordered
            .iter()
            .map(|tx| {
                let mut aggregate = PackageAggregate::of(tx);
                for ancestor in ancestors.get(&tx.hash).into_iter().flatten() {
                    if let Some((fee, weight)) = costs.get(ancestor) {
                        aggregate.fee = aggregate.fee.saturating_add(*fee);
                        aggregate.weight = aggregate.weight.saturating_add(*weight);
                        aggregate.count += 1;
                    }
                }
                (tx.hash, aggregate)
            })
            .collect();
        ordered.sort_by(|a, b| {
            let pa = &packages[&a.hash];
            let pb = &packages[&b.hash];
            pb.cmp_fee_rate(pa).then_with(|| a.hash.cmp(&b.hash))
        });

        Ok(Self {
            ordered,
            ancestors,
            descendants,
        })
    }

    fn close_ancestors(
        hash: H256,
        parents: &HashMap<H256, BTreeSet<H256>>,
        visits: &mut HashMap<H256, Visit>,
        closed: &mut HashMap<H256, BTreeSet<H256>>,
    ) -> Result<()> {
        match visits.get(&hash) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                return Err(AssemblyError::InconsistentSnapshot(format!(
                    "dependency cycle through {:?}",
                    hash
                )))
            }
            None => {}
        }
        visits.insert(hash, Visit::InProgress);

        let mut set = BTreeSet::new();
        for parent in parents.get(&hash).into_iter().flatten() {
            Self::close_ancestors(*parent, parents, visits, closed)?;
            set.insert(*parent);
            if let Some(grand) = closed.get(parent) {
                set.extend(grand.iter().copied());
            }
        }

        closed.insert(hash, set);
        visits.insert(hash, Visit::Done);
        Ok(())
    }

    /// Candidate by hash
    pub fn get(&self, hash: &H256) -> Option<&TransactionCandidate> {
        self.ordered.iter().find(|tx| tx.hash == *hash)
    }
}

impl CandidatePoolView for InMemoryPoolSnapshot {
    fn iter_by_ancestor_fee_rate(&self) -> Box<dyn Iterator<Item = &TransactionCandidate> + '_> {
        Box::new(self.ordered.iter())
    }

    fn ancestors_of(&self, hash: &H256) -> Option<Vec<H256>> {
        self.ancestors.get(hash).cloned()
    }

    fn descendants_of(&self, hash: &H256) -> Option<Vec<H256>> {
        self.descendants.get(hash).cloned()
    }

    fn len(&self) -> usize {
        self.ordered.len()
    }
}
