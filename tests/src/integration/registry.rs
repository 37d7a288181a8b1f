//! # Registry Scenarios
//!
//! Stake locks, reward rotation and swarm assignment as the registry evolves
//! block by block.

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use shared_types::{Hash, PublicKey};
    use snq_consensus::adapters::{Ed25519VoteVerifier, InMemoryChainView};
    use snq_consensus::domain::{SwarmId, UNASSIGNED_SWARM_ID};
    use snq_consensus::test_utils::{
        child_block, genesis_state, ChainBuilder, TestNetwork, TestService,
    };
    use snq_consensus::{
        NewState, QuorumType, ServiceNodeApi, ServiceNodeConfig, ServiceNodeService, Transaction,
    };

    use crate::integration::fixtures::{init_test_logging, network, NODES};

    const VOTERS: [u16; 7] = [0, 1, 2, 3, 4, 5, 6];

    fn swarms(service: &TestService) -> BTreeMap<PublicKey, SwarmId> {
        service
            .get_registry_state(&[])
            .into_iter()
            .map(|entry| (entry.public_key, entry.swarm_id))
            .collect()
    }

    /// Service fed one block per batch of transactions.
    fn replay(batches: Vec<Vec<Transaction>>) -> TestService {
        let config = ServiceNodeConfig::default();
        let version = config.hard_forks.checkpointing;
        let genesis = genesis_state(version);
        let chain = Arc::new(InMemoryChainView::new(version));
        chain.set_block_hash(0, genesis.hash());

        let service = ServiceNodeService::new(
            config,
            genesis,
            Arc::clone(&chain),
            Arc::new(Ed25519VoteVerifier::new()),
        )
        .unwrap();
        for transactions in batches {
            let parent = service.canonical_state().unwrap();
            let block = child_block(&parent, 0, 1, transactions);
            service.apply_block(&block).unwrap();
            chain.set_block_hash(block.height, block.hash);
        }
        service
    }

    // =============================================================================
    // Stake lock
    // =============================================================================

    #[test]
    fn test_stake_expiry_removes_nodes() {
        init_test_logging();
        let config = ServiceNodeConfig {
            stake_lock_blocks: 10,
            ..ServiceNodeConfig::default()
        };
        let builder = ChainBuilder::with_config(NODES, config).unwrap();

        let h10 = builder.extend(builder.tip(), 0, 9, 1).unwrap();
        assert_eq!(builder.service.get_registry_state(&[]).len(), NODES);
        let quorum = builder.obligations_quorum(&h10, 10).unwrap();
        assert!(quorum.is_available());

        builder.extend(h10, 0, 1, 1).unwrap();
        assert!(builder.service.get_registry_state(&[]).is_empty());
        assert!(builder
            .service
            .get_quorum(QuorumType::Obligations, 11, None, false)
            .unwrap()
            .is_empty());
    }

    // =============================================================================
    // Rewards
    // =============================================================================

    #[test]
    fn test_every_node_rewarded_once_per_rotation() {
        let (builder, _) = network(1 + NODES as u64);

        let heights: BTreeSet<u64> = builder
            .service
            .get_registry_state(&[])
            .iter()
            .map(|entry| entry.last_reward_height)
            .collect();
        let expected: BTreeSet<u64> = (2..=1 + NODES as u64).collect();
        assert_eq!(heights, expected);
    }

    #[test]
    fn test_ip_change_penalty_sends_node_to_back_of_queue() {
        let (builder, h2) = network(2);
        let quorum = builder.obligations_quorum(&h2, 2).unwrap();
        let target = quorum.workers[0];
        let penalty = builder
            .network
            .state_change(&quorum, 0, NewState::IpChangePenalty, &VOTERS)
            .unwrap();

        let parent = builder.state(&h2).unwrap();
        let block = child_block(&parent, 0, 1, vec![Transaction::StateChange(penalty)]);
        builder.service.apply_block(&block).unwrap();

        let entries = builder.service.get_registry_state(&[]);
        let at_three = entries.iter().filter(|e| e.last_reward_height == 3).count();
        assert_eq!(at_three, 2, "penalised node and the block 3 winner");

        // At least 22 nodes still wait from height 1 and go first.
        builder.extend(block.hash, 0, 20, 1).unwrap();
        let entry = &builder.service.get_registry_state(&[target])[0];
        assert_eq!(entry.last_reward_height, 3);
        assert!(entry.is_active());
    }

    // =============================================================================
    // Swarms
    // =============================================================================

    #[test]
    fn test_swarms_independent_of_registration_order() {
        init_test_logging();
        let registrations = TestNetwork::new(NODES).registrations();

        let at_once = replay(vec![registrations.clone(), Vec::new()]);

        let (first, second) = registrations.split_at(NODES / 2);
        let mut late = second.to_vec();
        late.reverse();
        let staggered = replay(vec![late, first.to_vec()]);

        let expected = swarms(&at_once);
        assert_eq!(swarms(&staggered), expected);

        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..3 {
            let mut shuffled = registrations.clone();
            shuffled.shuffle(&mut rng);
            let cut = rng.gen_range(1..NODES - 1);
            let (early, late) = shuffled.split_at(cut);
            let replayed = replay(vec![early.to_vec(), Vec::new(), late.to_vec()]);
            assert_eq!(swarms(&replayed), expected);
        }

        let ids: BTreeSet<SwarmId> = expected.values().copied().collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&UNASSIGNED_SWARM_ID));
    }

    fn swarm_count(service: &TestService) -> usize {
        swarms(service)
            .into_values()
            .filter(|id| *id != UNASSIGNED_SWARM_ID)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Mine one block on `parent` deregistering the first `count` workers of
    /// the obligations quorum at `height`.
    fn deregister_workers(
        builder: &ChainBuilder,
        parent: &Hash,
        height: u64,
        count: u16,
    ) -> Hash {
        let quorum = builder.obligations_quorum(parent, height).unwrap();
        let transactions = (0..count)
            .map(|worker| {
                let tx = builder
                    .network
                    .state_change(&quorum, worker, NewState::Deregister, &VOTERS)
                    .unwrap();
                Transaction::StateChange(tx)
            })
            .collect();
        let state = builder.state(parent).unwrap();
        let block = child_block(&state, 0, 1, transactions);
        builder.service.apply_block(&block).unwrap();
        block.hash
    }

    #[test]
    fn test_swarm_counts_follow_active_set() {
        init_test_logging();
        let registrations = TestNetwork::new(NODES).registrations();
        for (count, expected) in [(13, 1), (14, 2), (25, 3)] {
            let service = replay(vec![registrations[..count].to_vec()]);
            assert_eq!(swarm_count(&service), expected, "{count} nodes");
        }

        // 25 -> 14 active nodes, then 14 -> 13.
        let (builder, h2) = network(2);
        let h3 = deregister_workers(&builder, &h2, 2, 11);
        assert_eq!(swarm_count(&builder.service), 2);

        deregister_workers(&builder, &h3, 3, 1);
        assert_eq!(swarm_count(&builder.service), 1);
        let active = builder
            .service
            .get_registry_state(&[])
            .iter()
            .filter(|entry| entry.is_active())
            .count();
        assert_eq!(active, 13);
    }

    #[test]
    fn test_swarms_wait_for_hard_fork() {
        init_test_logging();
        let mut config = ServiceNodeConfig::default();
        config.hard_forks.swarms = config.hard_forks.checkpointing + 1;
        let builder = ChainBuilder::with_config(NODES, config).unwrap();
        builder.extend(builder.tip(), 0, 3, 1).unwrap();

        assert!(builder
            .service
            .get_registry_state(&[])
            .iter()
            .all(|entry| entry.swarm_id == UNASSIGNED_SWARM_ID));
    }
}
