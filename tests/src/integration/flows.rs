//! # Integration Test Flows
//!
//! Drives the whole pipeline through [`BlockAssembler`]: pool snapshot and
//! chain context in, mined block and inclusion report out.
//!
//! ## Flows Tested:
//!
//! 1. **Produce**: select → finalize → mine → submit → report
//! 2. **Lock maturity**: a relatively locked child waits one block for its parent
//! 3. **Absolute locks**: a height lock clears once the tip moves past it
//! 4. **Budget pressure**: a random pool under a tight weight limit keeps every invariant

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_assembly::adapters::{InMemoryPoolSnapshot, NullSolutionSolver, StaticChainContext};
    use block_assembly::domain::template::block_subsidy;
    use block_assembly::domain::{
        check_proof_of_work, validate_block_template, FinalityFailure, InputConfirmation, OutPoint,
        RejectReason, SelectionStop,
    };
    use block_assembly::{
        AssemblerConfig, AssemblerPorts, AssemblyError, BlockAssembler, BlockAssemblyService,
        TransactionCandidate,
    };

    use crate::fixtures::*;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const CONFIG_JSON: &str = r#"{
        "selector": { "max_block_weight": 400000, "block_min_fee_rate": 1000 },
        "mining": { "workers": 2, "payout_script": "76a914", "extra_nonce": 7 }
    }"#;

    struct Harness {
        assembler: BlockAssembler,
        submitter: Arc<RecordingSubmitter>,
        reporter: Arc<RecordingReporter>,
    }

    fn harness(config: AssemblerConfig, pool: Vec<TransactionCandidate>, chain: StaticChainContext) -> Harness {
        let submitter = Arc::new(RecordingSubmitter::default());
        let reporter = Arc::new(RecordingReporter::default());
        let block_time = chain.tip().median_time_past + 600;
        let ports = AssemblerPorts {
            pool: Arc::new(InMemoryPoolSnapshot::new(pool).expect("valid pool")),
            chain: Arc::new(chain),
            solver: Arc::new(NullSolutionSolver),
            submitter: submitter.clone(),
            reporter: reporter.clone(),
        };
        let assembler = BlockAssembler::new(config, ports)
            .expect("valid config")
            .with_time_source(Arc::new(move || block_time));
        Harness {
            assembler,
            submitter,
            reporter,
        }
    }

    fn config() -> AssemblerConfig {
        AssemblerConfig::from_json(CONFIG_JSON).expect("fixture config parses")
    }

    // =============================================================================
    // INTEGRATION TESTS: FULL ROUND
    // =============================================================================

    #[tokio::test]
    async fn test_produce_block_end_to_end() {
        assembly_telemetry::init_test_logging();

        let parent = standalone(1, 100, 1_000);
        let child = spending(2, &[&parent], 9_900, 1_000);
        let peer_a = standalone(3, 3_000, 1_000);
        let peer_b = standalone(4, 2_000, 1_000);
        let h = harness(
            config(),
            vec![peer_b.clone(), child.clone(), peer_a.clone(), parent.clone()],
            chain_at(TIP_HEIGHT),
        );

        let produced = h.assembler.produce_block().await.expect("block produced");
        let template = &produced.block.template;

        // package {parent, child} at 5000/1000 beats both peers
        assert_eq!(
            template.selected_hashes(),
            vec![parent.hash, child.hash, peer_a.hash, peer_b.hash]
        );
        assert_eq!(template.ordered_hashes()[0], template.coinbase.hash());
        assert_eq!(template.height, TIP_HEIGHT + 1);
        assert_eq!(template.total_fees, 15_000);
        assert_eq!(
            template.coinbase.value,
            block_subsidy(TIP_HEIGHT + 1, template_halving(&h)) + 15_000
        );
        assert_eq!(template.coinbase.payout_script, vec![0x76, 0xa9, 0x14]);

        let budget = h.assembler.config().budget_enforcer();
        validate_block_template(template, &budget, template_halving(&h)).expect("template valid");

        assert!(check_proof_of_work(
            &produced.block.hash,
            produced.block.header.bits,
            h.assembler.config().consensus.pow_limit
        ));
        assert_eq!(produced.block.header.hash(), produced.block.hash);

        assert_eq!(h.submitter.blocks.lock().len(), 1);
        let batches = h.reporter.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].target_height, TIP_HEIGHT + 1);
        assert_eq!(batches[0].included, template.selected_hashes());

        let status = h.assembler.status().await;
        assert_eq!(status.blocks_mined, 1);
        assert_eq!(status.rounds_completed, 1);
        assert_eq!(h.assembler.metrics().get_blocks_mined(), 1);
    }

    fn template_halving(h: &Harness) -> u32 {
        h.assembler.config().consensus.halving_interval
    }

    #[tokio::test]
    async fn test_rejected_block_is_not_reported() {
        let submitter = Arc::new(RecordingSubmitter {
            reject: true,
            ..Default::default()
        });
        let reporter = Arc::new(RecordingReporter::default());
        let ports = AssemblerPorts {
            pool: Arc::new(InMemoryPoolSnapshot::new(vec![standalone(1, 5_000, 1_000)]).unwrap()),
            chain: Arc::new(chain_at(TIP_HEIGHT)),
            solver: Arc::new(NullSolutionSolver),
            submitter: submitter.clone(),
            reporter: reporter.clone(),
        };
        let assembler = BlockAssembler::new(config(), ports).unwrap();

        let produced = assembler.produce_block().await.unwrap();
        assert!(!produced.receipt.accepted);
        assert_eq!(submitter.blocks.lock().len(), 1);
        assert!(reporter.batches.lock().is_empty());
    }

    // =============================================================================
    // INTEGRATION TESTS: LOCK RULES ACROSS BLOCKS
    // =============================================================================

    #[tokio::test]
    async fn test_relative_lock_waits_for_parent_confirmation() {
        let parent = standalone(1, 2_000, 1_000);
        let child = with_relative_height_lock(spending(2, &[&parent], 8_000, 1_000), 1);

        // Round one: parent is still pending, so the child's lock cannot clear
        let first = harness(config(), vec![parent.clone(), child.clone()], chain_at(TIP_HEIGHT));
        let assembled = first.assembler.build_template().await.unwrap();
        assert_eq!(assembled.template.selected_hashes(), vec![parent.hash]);
        assert_eq!(assembled.skipped.len(), 1);
        assert_eq!(assembled.skipped[0].hash, child.hash);
        assert!(matches!(
            assembled.skipped[0].reason,
            RejectReason::Finality(FinalityFailure::SequenceLock(_))
        ));

        // Round two: parent confirmed in the block just built
        let chain = chain_at(TIP_HEIGHT + 1).with_confirmation(
            OutPoint::new(parent.hash, 0),
            InputConfirmation {
                height: TIP_HEIGHT + 1,
                median_time_past: tip_at(TIP_HEIGHT).median_time_past,
                is_coinbase: false,
            },
        );
        let second = harness(config(), vec![child.clone()], chain);
        let assembled = second.assembler.build_template().await.unwrap();
        assert_eq!(assembled.template.selected_hashes(), vec![child.hash]);
        assert!(assembled.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_absolute_height_lock_clears_next_block() {
        let locked = with_lock_time(standalone(1, 5_000, 1_000), TIP_HEIGHT + 1);
        let free = standalone(2, 1_000, 1_000);

        let first = harness(config(), vec![locked.clone(), free.clone()], chain_at(TIP_HEIGHT));
        let assembled = first.assembler.build_template().await.unwrap();
        assert_eq!(assembled.template.selected_hashes(), vec![free.hash]);
        assert!(matches!(
            assembled.skipped[0].reason,
            RejectReason::Finality(FinalityFailure::LockTime { .. })
        ));

        let second = harness(config(), vec![locked.clone()], chain_at(TIP_HEIGHT + 1));
        let assembled = second.assembler.build_template().await.unwrap();
        assert_eq!(assembled.template.selected_hashes(), vec![locked.hash]);
    }

    #[tokio::test]
    async fn test_immature_coinbase_spend_excluded() {
        let mut spender = standalone(1, 5_000, 1_000);
        spender.spends_coinbase = true;
        let chain = chain_at(TIP_HEIGHT).with_confirmation(
            funding_outpoint(1),
            InputConfirmation {
                height: TIP_HEIGHT - 50,
                median_time_past: TIP_MTP - 50 * 600,
                is_coinbase: true,
            },
        );

        let h = harness(config(), vec![spender.clone()], chain);
        let assembled = h.assembler.build_template().await.unwrap();
        assert!(assembled.template.transactions.is_empty());
        assert!(matches!(
            assembled.skipped[0].reason,
            RejectReason::Finality(FinalityFailure::ImmatureCoinbase { .. })
        ));
        assert_eq!(assembled.stop, SelectionStop::PoolExhausted);
    }

    // =============================================================================
    // INTEGRATION TESTS: BUDGET PRESSURE
    // =============================================================================

    #[tokio::test]
    async fn test_random_pool_under_tight_budget_keeps_invariants() {
        let mut config = config();
        config.selector.max_block_weight = 60_000;
        config.selector.block_min_fee_rate = 500;

        let pool = random_pool(300, 10_000);
        let h = harness(config, pool, chain_at(TIP_HEIGHT));
        let assembled = h.assembler.build_template().await.unwrap();
        let template = &assembled.template;

        let budget = h.assembler.config().budget_enforcer();
        validate_block_template(template, &budget, template_halving(&h)).expect("template valid");
        assert!(template.total_weight <= 60_000);
        assert!(!template.transactions.is_empty());
        assert!(template.transactions.len() + assembled.skipped.len() <= 300);
    }

    #[tokio::test]
    async fn test_random_pool_selection_is_reproducible() {
        let mut config = config();
        config.selector.max_block_weight = 60_000;
        config.selector.block_min_fee_rate = 500;

        assert_eq!(random_pool(300, 10_000), random_pool(300, 10_000));

        let first = harness(config.clone(), random_pool(300, 10_000), chain_at(TIP_HEIGHT));
        let second = harness(config, random_pool(300, 10_000), chain_at(TIP_HEIGHT));
        let a = first.assembler.build_template().await.unwrap();
        let b = second.assembler.build_template().await.unwrap();
        assert_eq!(a.template.selected_hashes(), b.template.selected_hashes());
        assert_eq!(a.template.total_fees, b.template.total_fees);
        assert_eq!(a.stop, b.stop);
    }

    #[tokio::test]
    async fn test_search_slot_released_after_each_run() {
        let h = harness(config(), vec![standalone(1, 5_000, 1_000)], chain_at(TIP_HEIGHT));
        let assembled = h.assembler.build_template().await.unwrap();

        let first = h.assembler.mine_template(assembled.template.clone()).await;
        let second = h.assembler.mine_template(assembled.template.clone()).await;
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(!h.assembler.cancel_mining().await);
    }

    #[test]
    fn test_invalid_config_is_critical() {
        let err = AssemblerConfig::from_json(r#"{ "mining": { "workers": 0 } }"#).unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidConfig(_)));
        assert!(err.is_critical());
    }
}
