//! Finality and sequence-lock gate
//!
//! Pure admissibility checks for a transaction against the context of the
//! block being assembled:
//!
//! - absolute lock-time (height or UNIX time, split at [`LOCKTIME_THRESHOLD`])
//! - relative locks encoded in each input's sequence number
//! - coinbase maturity of spent block-reward outputs
//!
//! None of these touch shared state; they are safe to call concurrently.

use super::entities::{
    Height, InputConfirmation, LockTimeFlags, SequenceLockContext, TransactionCandidate,
};

/// Lock-times below this value are heights, at or above are UNIX times
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence value that opts an input out of lock-time enforcement
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Set on an input's sequence to disable its relative lock
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// Set on an input's sequence for time-based (rather than height) locks
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Bits of the sequence carrying the lock value
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Time-based relative locks count in units of 2^9 = 512 seconds
pub const SEQUENCE_LOCKTIME_GRANULARITY: u32 = 9;

/// Blocks a coinbase output must wait before it can be spent
pub const COINBASE_MATURITY: Height = 100;

/// Minimum transaction version that enforces relative locks
const SEQUENCE_LOCK_MIN_VERSION: i32 = 2;

/// Effective unlocking point for a transaction's relative locks.
///
/// Values are the last height/time at which the transaction is still
/// locked; `-1` means unconstrained.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LockPoints {
    /// Highest locked height
    pub min_height: i64,
    /// Highest locked median time past
    pub min_time: i64,
}

impl Default for LockPoints {
    fn default() -> Self {
        Self {
            min_height: -1,
            min_time: -1,
        }
    }
}

/// Why a transaction failed the gate
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalityFailure {
    /// Absolute lock-time not yet reached
    LockTime {
        /// Transaction lock-time
        lock_time: u32,
    },
    /// Relative lock of at least one input not yet satisfied
    SequenceLock(LockPoints),
    /// A spent coinbase output has not matured
    ImmatureCoinbase {
        /// Height the coinbase was confirmed at
        confirmed_at: Height,
    },
}

impl std::fmt::Display for FinalityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockTime { lock_time } => write!(f, "non-final lock-time {}", lock_time),
            Self::SequenceLock(points) => write!(
                f,
                "sequence lock until height {} / time {}",
                points.min_height, points.min_time
            ),
            Self::ImmatureCoinbase { confirmed_at } => {
                write!(f, "immature coinbase spend (confirmed at {})", confirmed_at)
            }
        }
    }
}

/// Absolute lock-time check.
///
/// Final when `lock_time` is zero, when the relevant clock strictly exceeds
/// it, or when every input carries [`SEQUENCE_FINAL`].
pub fn is_final_tx(tx: &TransactionCandidate, block_height: Height, block_time: i64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }

    let threshold_clock = if tx.lock_time < LOCKTIME_THRESHOLD {
        block_height as i64
    } else {
        block_time
    };
    if (tx.lock_time as i64) < threshold_clock {
        return true;
    }

    tx.inputs
        .iter()
        .all(|input| input.sequence == SEQUENCE_FINAL)
}

/// Compute the lock points implied by every input's relative lock.
///
/// `confirmations` is indexed like `tx.inputs`. Transactions below version
/// 2, or evaluated without `verify_sequence`, are unconstrained.
pub fn calculate_sequence_locks(
    tx: &TransactionCandidate,
    flags: LockTimeFlags,
    confirmations: &[InputConfirmation],
) -> LockPoints {
    let mut points = LockPoints::default();

    if !flags.verify_sequence || tx.version < SEQUENCE_LOCK_MIN_VERSION {
        return points;
    }

    for (input, confirmation) in tx.inputs.iter().zip(confirmations) {
        if input.sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            continue;
        }

        let value = (input.sequence & SEQUENCE_LOCKTIME_MASK) as i64;

        if input.sequence & SEQUENCE_LOCKTIME_TYPE_FLAG != 0 {
            let unlock = confirmation.median_time_past
                + (value << SEQUENCE_LOCKTIME_GRANULARITY)
                - 1;
            points.min_time = points.min_time.max(unlock);
        } else {
            let unlock = confirmation.height as i64 + value - 1;
            points.min_height = points.min_height.max(unlock);
        }
    }

    points
}

/// Whether lock points are satisfied by a block at `target_height` whose
/// predecessor has median time past `tip_median_time_past`.
pub fn evaluate_sequence_locks(
    points: LockPoints,
    target_height: Height,
    tip_median_time_past: i64,
) -> bool {
    points.min_height < target_height as i64 && points.min_time < tip_median_time_past
}

/// Relative lock check: every input's constraint must be met.
pub fn sequence_locks_satisfied(
    tx: &TransactionCandidate,
    flags: LockTimeFlags,
    context: &SequenceLockContext,
) -> bool {
    let points = calculate_sequence_locks(tx, flags, &context.inputs);
    evaluate_sequence_locks(points, context.target_height, context.tip_median_time_past)
}

/// Coinbase maturity check for inputs spending block-reward outputs.
pub fn coinbase_spends_mature(
    tx: &TransactionCandidate,
    context: &SequenceLockContext,
) -> Result<(), FinalityFailure> {
    if !tx.spends_coinbase {
        return Ok(());
    }
    for confirmation in context.inputs.iter().filter(|c| c.is_coinbase) {
        if context.target_height.saturating_sub(confirmation.height) < COINBASE_MATURITY {
            return Err(FinalityFailure::ImmatureCoinbase {
                confirmed_at: confirmation.height,
            });
        }
    }
    Ok(())
}

/// Run every gate rule in order: lock-time, sequence locks, maturity.
pub fn check_admissible(
    tx: &TransactionCandidate,
    flags: LockTimeFlags,
    lock_time_cutoff: i64,
    context: &SequenceLockContext,
) -> Result<(), FinalityFailure> {
    if !is_final_tx(tx, context.target_height, lock_time_cutoff) {
        return Err(FinalityFailure::LockTime {
            lock_time: tx.lock_time,
        });
    }

    let points = calculate_sequence_locks(tx, flags, &context.inputs);
    if !evaluate_sequence_locks(points, context.target_height, context.tip_median_time_past) {
        return Err(FinalityFailure::SequenceLock(points));
    }

    coinbase_spends_mature(tx, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{OutPoint, TxInput};
    use primitive_types::H256;

    const TIP_HEIGHT: Height = 200;
    const TIP_MTP: i64 = 1_600_000_000;

    fn tx_with(sequence: u32, lock_time: u32) -> TransactionCandidate {
        TransactionCandidate {
            hash: H256::repeat_byte(0x42),
            version: 2,
            fee: 1_000,
            weight: 800,
            sigop_cost: 4,
            inputs: vec![TxInput {
                prevout: OutPoint::new(H256::repeat_byte(0x01), 0),
                sequence,
            }],
            lock_time,
            spends_coinbase: false,
        }
    }

    fn context(target_height: Height, confirmed_at: Height, conf_mtp: i64) -> SequenceLockContext {
        SequenceLockContext {
            target_height,
            tip_median_time_past: TIP_MTP,
            inputs: vec![InputConfirmation {
                height: confirmed_at,
                median_time_past: conf_mtp,
                is_coinbase: false,
            }],
        }
    }

    #[test]
    fn test_zero_lock_time_is_final() {
        let tx = tx_with(0, 0);
        assert!(is_final_tx(&tx, 1, 0));
    }

    #[test]
    fn test_height_lock_time() {
        let tx = tx_with(SEQUENCE_FINAL - 1, TIP_HEIGHT + 1);
        // Lock-time must be strictly below the block height
        assert!(!is_final_tx(&tx, TIP_HEIGHT + 1, TIP_MTP));
        assert!(is_final_tx(&tx, TIP_HEIGHT + 2, TIP_MTP));
    }

    #[test]
    fn test_time_lock_time() {
        let lock = TIP_MTP as u32;
        let tx = tx_with(SEQUENCE_FINAL - 1, lock);
        assert!(lock >= LOCKTIME_THRESHOLD);
        assert!(!is_final_tx(&tx, TIP_HEIGHT + 1, TIP_MTP));
        assert!(is_final_tx(&tx, TIP_HEIGHT + 1, TIP_MTP + 1));
    }

    #[test]
    fn test_all_final_sequences_override_lock_time() {
        let tx = tx_with(SEQUENCE_FINAL, TIP_HEIGHT + 50);
        assert!(is_final_tx(&tx, TIP_HEIGHT + 1, TIP_MTP));
    }

    #[test]
    fn test_relative_height_lock() {
        // Output confirmed at 150, locked for 52 blocks: unlocks at 201 + 1
        let tx = tx_with(52, 0);
        let flags = LockTimeFlags::default();
        assert!(!sequence_locks_satisfied(&tx, flags, &context(201, 150, 0)));
        assert!(sequence_locks_satisfied(&tx, flags, &context(202, 150, 0)));
    }

    #[test]
    fn test_relative_time_lock() {
        // Two granules = 1024 seconds after the confirming block's MTP
        let tx = tx_with(SEQUENCE_LOCKTIME_TYPE_FLAG | 2, 0);
        let flags = LockTimeFlags::default();
        assert!(!sequence_locks_satisfied(&tx, flags, &context(201, 150, TIP_MTP - 1_023)));
        assert!(sequence_locks_satisfied(&tx, flags, &context(201, 150, TIP_MTP - 1_024)));
    }

    #[test]
    fn test_disabled_relative_lock() {
        let tx = tx_with(SEQUENCE_LOCKTIME_DISABLE_FLAG | 0xffff, 0);
        assert!(sequence_locks_satisfied(
            &tx,
            LockTimeFlags::default(),
            &context(201, 200, TIP_MTP)
        ));
    }

    #[test]
    fn test_version_one_ignores_relative_locks() {
        let mut tx = tx_with(500, 0);
        tx.version = 1;
        assert!(sequence_locks_satisfied(
            &tx,
            LockTimeFlags::default(),
            &context(201, 200, TIP_MTP)
        ));
    }

    #[test]
    fn test_flags_disable_sequence_verification() {
        let tx = tx_with(500, 0);
        let flags = LockTimeFlags {
            verify_sequence: false,
            median_time_past: true,
        };
        assert!(sequence_locks_satisfied(&tx, flags, &context(201, 200, TIP_MTP)));
    }

    #[test]
    fn test_max_over_inputs() {
        let mut tx = tx_with(5, 0);
        tx.inputs.push(TxInput {
            prevout: OutPoint::new(H256::repeat_byte(0x02), 1),
            sequence: 20,
        });
        let confirmations = [
            InputConfirmation { height: 190, median_time_past: 0, is_coinbase: false },
            InputConfirmation { height: 185, median_time_past: 0, is_coinbase: false },
        ];
        let points = calculate_sequence_locks(&tx, LockTimeFlags::default(), &confirmations);
        assert_eq!(points.min_height, 204);
        assert_eq!(points.min_time, -1);
        assert!(!evaluate_sequence_locks(points, 204, TIP_MTP));
        assert!(evaluate_sequence_locks(points, 205, TIP_MTP));
    }

    #[test]
    fn test_zero_relative_lock_on_unconfirmed_parent() {
        // Parent confirmed "at" the target height: value 0 passes, 1 does not
        let flags = LockTimeFlags::default();
        assert!(sequence_locks_satisfied(&tx_with(0, 0), flags, &context(201, 201, TIP_MTP)));
        assert!(!sequence_locks_satisfied(&tx_with(1, 0), flags, &context(201, 201, TIP_MTP)));
        assert!(sequence_locks_satisfied(
            &tx_with(SEQUENCE_LOCKTIME_TYPE_FLAG, 0),
            flags,
            &context(201, 201, TIP_MTP)
        ));
        assert!(!sequence_locks_satisfied(
            &tx_with(SEQUENCE_LOCKTIME_TYPE_FLAG | 1, 0),
            flags,
            &context(201, 201, TIP_MTP)
        ));
    }

    #[test]
    fn test_coinbase_maturity() {
        let mut tx = tx_with(SEQUENCE_FINAL, 0);
        tx.spends_coinbase = true;
        let mut ctx = context(200, 101, 0);
        ctx.inputs[0].is_coinbase = true;
        assert_eq!(
            coinbase_spends_mature(&tx, &ctx),
            Err(FinalityFailure::ImmatureCoinbase { confirmed_at: 101 })
        );
        ctx.target_height = 201;
        assert!(coinbase_spends_mature(&tx, &ctx).is_ok());
    }

    #[test]
    fn test_check_admissible_reports_first_failure() {
        let tx = tx_with(SEQUENCE_FINAL - 1, TIP_HEIGHT + 5);
        let result = check_admissible(&tx, LockTimeFlags::default(), TIP_MTP, &context(201, 100, 0));
        assert_eq!(
            result,
            Err(FinalityFailure::LockTime { lock_time: TIP_HEIGHT + 5 })
        );
    }
}
