//! # Quorum Scenarios
//!
//! Two nodes holding the same chain derive the same committees; nodes on
//! different forks may not, and queries can report both.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use snq_consensus::test_utils::{block_hash, ChainBuilder};
    use snq_consensus::{ConsensusError, QuorumType, ServiceNodeApi};

    use crate::integration::fixtures::{init_test_logging, network};

    #[test]
    fn test_quorums_identical_across_nodes() {
        let (alice, tip_a) = network(8);
        let (bob, tip_b) = network(8);
        assert_eq!(tip_a, tip_b);

        for height in 1..=8 {
            assert_eq!(
                alice.obligations_quorum(&tip_a, height).unwrap(),
                bob.obligations_quorum(&tip_b, height).unwrap(),
                "obligations quorum at {height}"
            );
        }
        for height in [4, 8] {
            let hash = block_hash(0, height);
            assert_eq!(
                alice.checkpoint_quorum(&hash).unwrap(),
                bob.checkpoint_quorum(&hash).unwrap()
            );
        }
    }

    #[test]
    fn test_checkpoint_quorum_members_distinct() {
        let (builder, h4) = network(4);
        let quorum = builder.checkpoint_quorum(&h4).unwrap();
        let registered: HashSet<_> = builder.network.keys().into_iter().collect();

        assert_eq!(quorum.validators.len(), 20);
        assert_eq!(quorum.workers.len(), 1);
        let members: HashSet<_> = quorum.validators.iter().chain(&quorum.workers).collect();
        assert_eq!(members.len(), 21);
        assert!(members.iter().all(|key| registered.contains(*key)));
    }

    #[test]
    fn test_checkpoint_quorums_only_at_interval() {
        let (builder, _) = network(6);
        for height in 1..=6 {
            let views = builder
                .service
                .get_quorum(QuorumType::Checkpointing, height, None, false)
                .unwrap();
            assert_eq!(views.len(), usize::from(height == 4), "height {height}");
        }
    }

    #[test]
    fn test_fork_quorums_reported_separately() {
        let (builder, h5) = network(5);
        let alt = builder.extend(block_hash(0, 3), 1, 2, 1).unwrap();

        // Seeded by the shared block at height 3.
        let at_four = builder
            .service
            .get_quorum(QuorumType::Obligations, 4, None, true)
            .unwrap();
        assert_eq!(at_four.len(), 2);
        assert_eq!(at_four[0].quorum, at_four[1].quorum);

        // Seeded by the diverging blocks at height 4.
        let at_five = builder
            .service
            .get_quorum(QuorumType::Obligations, 5, None, true)
            .unwrap();
        assert_eq!(at_five.len(), 2);
        assert_eq!(at_five[0].tip, h5);
        assert!(at_five[0].canonical);
        assert_eq!(at_five[1].tip, alt);
        assert!(!at_five[1].canonical);
        assert_ne!(at_five[0].quorum.validators, at_five[1].quorum.validators);

        let alt_only = builder
            .service
            .get_quorum(QuorumType::Obligations, 5, Some(alt), false)
            .unwrap();
        assert_eq!(alt_only.len(), 1);
        assert_eq!(alt_only[0].block_hash, alt);
    }

    #[test]
    fn test_discarded_fork_quorums_disappear() {
        let (builder, _) = network(5);
        let alt = builder.extend(block_hash(0, 3), 1, 2, 1).unwrap();

        builder.service.discard_fork(&alt).unwrap();
        let views = builder
            .service
            .get_quorum(QuorumType::Obligations, 5, None, true)
            .unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].canonical);
        assert_eq!(
            builder
                .service
                .get_quorum(QuorumType::Obligations, 5, Some(alt), false)
                .unwrap_err(),
            ConsensusError::UnknownFork { tip: alt }
        );
    }

    #[test]
    fn test_small_network_forms_no_quorum() {
        init_test_logging();
        let builder = ChainBuilder::new(10).unwrap();
        let h4 = builder.extend(builder.tip(), 0, 3, 1).unwrap();

        assert!(builder
            .service
            .get_quorum(QuorumType::Obligations, 4, None, false)
            .unwrap()
            .is_empty());
        assert_eq!(
            builder.vote_checkpoint(h4, 1).unwrap_err(),
            ConsensusError::UnknownQuorum {
                quorum_type: QuorumType::Checkpointing,
                height: 4
            }
        );
    }
}
