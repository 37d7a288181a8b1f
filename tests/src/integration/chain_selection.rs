//! # Chain Selection Scenarios
//!
//! Checkpoints outrank work, work outranks the incumbent, and nothing at or
//! below the second most recent checkpoint can be rewritten.

#[cfg(test)]
mod tests {
    use shared_crypto::Ed25519KeyPair;
    use shared_types::Hash;
    use snq_consensus::test_utils::{block_hash, child_block, ChainBuilder};
    use snq_consensus::{ConsensusError, RegistrationTx, ServiceNodeApi, Transaction, VoteOutcome};

    use crate::integration::fixtures::network;

    // =============================================================================
    // Checkpoints versus work
    // =============================================================================

    #[test]
    fn test_more_checkpoints_beat_more_work() {
        let (builder, h4) = network(4);
        let heavy = builder.extend(block_hash(0, 3), 1, 1, 50).unwrap();
        assert_eq!(builder.service.canonical_tip(), heavy);

        builder.vote_checkpoint(h4, 13).unwrap();
        assert_eq!(builder.service.canonical_tip(), h4);

        // Piling more work on the uncheckpointed branch changes nothing.
        let heavier = builder.extend(heavy, 1, 3, 1_000).unwrap();
        assert_eq!(builder.service.canonical_tip(), h4);
        assert_eq!(builder.service.select_canonical(&[heavier]).unwrap(), h4);
    }

    #[test]
    fn test_alternative_fork_overtakes_through_votes() {
        let (builder, h8) = network(8);
        let alt_tip = builder.extend(block_hash(0, 3), 1, 5, 1).unwrap();
        let alt4 = block_hash(1, 4);
        assert_eq!(builder.service.canonical_tip(), h8);

        let outcome = builder.vote_checkpoint(alt4, 12).unwrap();
        assert!(matches!(outcome, VoteOutcome::Pending { votes: 12, .. }));
        assert_eq!(builder.service.canonical_tip(), h8);

        let quorum = builder.checkpoint_quorum(&alt4).unwrap();
        let vote = builder.network.checkpoint_vote(&quorum, 12, alt4).unwrap();
        let outcome = builder.service.submit_checkpoint_vote(&vote).unwrap();
        assert!(matches!(outcome, VoteOutcome::Checkpointed(_)));

        assert_eq!(builder.service.canonical_tip(), alt_tip);
        assert_eq!(builder.canonical_hash_at(4).unwrap(), alt4);
        assert_eq!(builder.canonical_hash_at(3).unwrap(), block_hash(0, 3));
    }

    #[test]
    fn test_heaviest_of_many_tips_selected() {
        let (builder, h6) = network(6);
        let light = builder.extend(block_hash(0, 4), 1, 2, 1).unwrap();
        let medium = builder.extend(block_hash(0, 4), 2, 2, 3).unwrap();
        let heavy = builder.extend(block_hash(0, 5), 3, 1, 9).unwrap();

        assert_eq!(builder.service.canonical_tip(), heavy);
        assert_eq!(
            builder
                .service
                .select_canonical(&[h6, light, medium, heavy])
                .unwrap(),
            heavy
        );
        assert_eq!(builder.service.tips().len(), 4);
    }

    // =============================================================================
    // Immutability
    // =============================================================================

    /// Canonical chain to height 12 with checkpoints at 4, 8 and 12.
    fn checkpointed_chain() -> (ChainBuilder, Hash) {
        let (builder, h4) = network(4);
        builder.vote_checkpoint(h4, 13).unwrap();
        let h8 = builder.extend(h4, 0, 4, 1).unwrap();
        builder.vote_checkpoint(h8, 13).unwrap();
        let h12 = builder.extend(h8, 0, 4, 1).unwrap();
        builder.vote_checkpoint(h12, 13).unwrap();
        (builder, h12)
    }

    #[test]
    fn test_immutable_height_trails_latest_checkpoint() {
        let (builder, _) = checkpointed_chain();
        assert_eq!(builder.service.immutable_height(), Some(8));
        let state = builder.service.canonical_state().unwrap();
        assert_eq!(state.checkpoint_count(), 3);
    }

    #[test]
    fn test_rewrite_at_immutable_height_rejected() {
        let (builder, h12) = checkpointed_chain();
        let rewrite = builder.block_on(&block_hash(0, 7), 4, 10_000).unwrap();

        assert_eq!(
            builder.service.apply_block(&rewrite).unwrap_err(),
            ConsensusError::ReorgPastImmutableHeight {
                divergence_height: 8,
                immutable_height: 8
            }
        );
        assert!(builder.service.fork_state(&rewrite.hash).is_none());
        assert_eq!(builder.service.canonical_tip(), h12);
    }

    #[test]
    fn test_branch_above_immutable_height_accepted() {
        let (builder, h12) = checkpointed_chain();
        let branch = builder.block_on(&block_hash(0, 8), 4, 10_000).unwrap();

        let verdict = builder.service.apply_block(&branch).unwrap();
        assert!(!verdict.became_canonical);
        assert_eq!(verdict.canonical_tip, h12);
        assert!(builder.service.tips().contains(&branch.hash));

        // Inherits the two checkpoints below the fork point, one short of canonical.
        let state = builder.state(&branch.hash).unwrap();
        assert_eq!(state.checkpoint_count(), 2);
    }

    // =============================================================================
    // Atomic block application
    // =============================================================================

    #[test]
    fn test_block_with_invalid_transaction_leaves_no_trace() {
        let (builder, tip) = network(3);
        let newcomer = Ed25519KeyPair::from_seed([0xC4; 32]).public_key();
        let existing = builder.network.keys()[0];

        let parent = builder.state(&tip).unwrap();
        let block = child_block(
            &parent,
            0,
            1,
            vec![
                Transaction::Registration(RegistrationTx {
                    service_node_key: newcomer,
                    owner: [0xC4; 32],
                    stake: 1,
                }),
                Transaction::Registration(RegistrationTx {
                    service_node_key: existing,
                    owner: [0x01; 32],
                    stake: 1,
                }),
            ],
        );

        assert_eq!(
            builder.service.apply_block(&block).unwrap_err(),
            ConsensusError::DuplicateRegistration { key: existing }
        );
        assert!(builder.service.get_registry_state(&[newcomer]).is_empty());
        assert_eq!(builder.service.canonical_tip(), tip);

        // The same height still accepts a valid block afterwards.
        let valid = builder.block_on(&tip, 0, 1).unwrap();
        assert!(builder.service.apply_block(&valid).unwrap().became_canonical);
    }
}
