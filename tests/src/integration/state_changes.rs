//! # State Change Scenarios
//!
//! Obligations quorums vote workers out (deregister), down (decommission) or
//! back up (recommission). Votes are bound to the quorum height, so a key
//! that re-registers later is out of reach of older quorums.

#[cfg(test)]
mod tests {
    use shared_types::{Hash, PublicKey};
    use snq_consensus::domain::UNASSIGNED_SWARM_ID;
    use snq_consensus::test_utils::{block_hash, child_block, ChainBuilder};
    use snq_consensus::{
        ConsensusError, NewState, NodeStatus, RegistrationTx, ServiceNodeApi, StateChangeTx,
        Transaction,
    };

    use crate::integration::fixtures::network;

    const VOTERS: [u16; 7] = [0, 1, 2, 3, 4, 5, 6];

    /// Mine `transactions` in a block on top of `parent`; returns its hash.
    fn mine(builder: &ChainBuilder, parent: &Hash, transactions: Vec<Transaction>) -> Hash {
        let state = builder.state(parent).unwrap();
        let block = child_block(&state, 0, 1, transactions);
        builder.service.apply_block(&block).unwrap();
        block.hash
    }

    fn status_of(builder: &ChainBuilder, key: PublicKey) -> NodeStatus {
        builder.service.get_registry_state(&[key])[0].status
    }

    // =============================================================================
    // Target identity
    // =============================================================================

    #[test]
    fn test_stale_target_after_reregistration() {
        let (builder, h2) = network(2);
        let quorum = builder.obligations_quorum(&h2, 2).unwrap();
        let target = quorum.workers[0];

        let deregister = builder
            .network
            .state_change(&quorum, 0, NewState::Deregister, &VOTERS)
            .unwrap();
        let h3 = mine(&builder, &h2, vec![Transaction::StateChange(deregister)]);
        assert_eq!(status_of(&builder, target), NodeStatus::Deregistered { at: 3 });

        let decommission = builder
            .network
            .state_change(&quorum, 0, NewState::Decommission, &VOTERS)
            .unwrap();
        assert_eq!(
            builder.service.validate_state_change_tx(&decommission, false).unwrap_err(),
            ConsensusError::TargetDeregistered { target }
        );

        // Same key comes back as a new incarnation.
        mine(
            &builder,
            &h3,
            vec![Transaction::Registration(RegistrationTx {
                service_node_key: target,
                owner: [0x77; 32],
                stake: 1,
            })],
        );
        let entry = &builder.service.get_registry_state(&[target])[0];
        assert_eq!(entry.registration_height, 4);
        assert_eq!(entry.status, NodeStatus::Active);

        assert_eq!(
            builder.service.validate_state_change_tx(&decommission, false).unwrap_err(),
            ConsensusError::StaleTarget {
                target,
                registration_height: 4,
                quorum_height: 2
            }
        );
        assert!(builder.service.pending_state_changes().is_empty());
    }

    #[test]
    fn test_state_change_stays_on_its_fork() {
        let (builder, h3) = network(3);
        let quorum = builder.obligations_quorum(&h3, 2).unwrap();
        let target = quorum.workers[4];
        let tx = builder
            .network
            .state_change(&quorum, 4, NewState::Decommission, &VOTERS)
            .unwrap();

        let parent = builder.state(&block_hash(0, 2)).unwrap();
        let alt = child_block(&parent, 1, 1, vec![Transaction::StateChange(tx.clone())]);
        let verdict = builder.service.apply_block(&alt).unwrap();
        assert!(!verdict.became_canonical);

        let alt_state = builder.state(&alt.hash).unwrap();
        assert_eq!(
            alt_state.registry().get(&target).unwrap().status,
            NodeStatus::Decommissioned { since: 3 }
        );
        assert_eq!(status_of(&builder, target), NodeStatus::Active);

        // The canonical chain has not seen it, so the mempool still takes it.
        builder.service.validate_state_change_tx(&tx, false).unwrap();
    }

    // =============================================================================
    // Voter permutations
    // =============================================================================

    #[test]
    fn test_mined_permutation_overrides_pool_permutation() {
        let (builder, h2) = network(2);
        let quorum = builder.obligations_quorum(&h2, 2).unwrap();
        let target = quorum.workers[1];
        let pooled = builder
            .network
            .state_change(&quorum, 1, NewState::Deregister, &VOTERS)
            .unwrap();
        let mined = builder
            .network
            .state_change(&quorum, 1, NewState::Deregister, &[2, 3, 4, 5, 6, 7, 8])
            .unwrap();

        builder.service.validate_state_change_tx(&pooled, false).unwrap();
        assert_eq!(
            builder.service.validate_state_change_tx(&mined, false).unwrap_err(),
            ConsensusError::ConflictingPermutation { target }
        );

        mine(&builder, &h2, vec![Transaction::StateChange(mined)]);
        assert!(builder.service.pending_state_changes().is_empty());
        assert_eq!(status_of(&builder, target), NodeStatus::Deregistered { at: 3 });

        assert_eq!(
            builder.service.validate_state_change_tx(&pooled, false).unwrap_err(),
            ConsensusError::ConflictingPermutation { target }
        );
    }

    #[test]
    fn test_too_few_votes_rejected() {
        let (builder, h2) = network(2);
        let quorum = builder.obligations_quorum(&h2, 2).unwrap();
        let tx = builder
            .network
            .state_change(&quorum, 0, NewState::Decommission, &VOTERS[..6])
            .unwrap();

        assert_eq!(
            builder.service.validate_state_change_tx(&tx, false).unwrap_err(),
            ConsensusError::InsufficientVotes { have: 6, need: 7 }
        );
    }

    // =============================================================================
    // Lifetime
    // =============================================================================

    #[test]
    fn test_state_change_expires_after_lifetime() {
        let (builder, h61) = network(61);
        let quorum = builder.obligations_quorum(&h61, 2).unwrap();
        let pooled = builder
            .network
            .state_change(&quorum, 0, NewState::Decommission, &VOTERS)
            .unwrap();
        builder.service.validate_state_change_tx(&pooled, false).unwrap();

        builder.extend(h61, 0, 1, 1).unwrap();
        assert!(builder.service.pending_state_changes().is_empty());

        let late = builder
            .network
            .state_change(&quorum, 1, NewState::Decommission, &VOTERS)
            .unwrap();
        assert_eq!(
            builder.service.validate_state_change_tx(&late, false).unwrap_err(),
            ConsensusError::TooOld {
                quorum_height: 2,
                current_height: 63
            }
        );
    }

    // =============================================================================
    // Decommission and recommission
    // =============================================================================

    #[test]
    fn test_decommissioned_node_recommissioned_with_fee() {
        let (builder, h2) = network(2);
        let quorum = builder.obligations_quorum(&h2, 2).unwrap();
        let target = quorum.workers[3];
        let decommission = builder
            .network
            .state_change(&quorum, 3, NewState::Decommission, &VOTERS)
            .unwrap();
        let h3 = mine(&builder, &h2, vec![Transaction::StateChange(decommission)]);

        let entry = &builder.service.get_registry_state(&[target])[0];
        assert_eq!(entry.status, NodeStatus::Decommissioned { since: 3 });
        assert_eq!(entry.swarm_id, UNASSIGNED_SWARM_ID);

        // Still tested as a worker, never drawn as a validator.
        let later = builder.obligations_quorum(&h3, 3).unwrap();
        assert!(!later.validators.contains(&target));
        let worker_index = later
            .workers
            .iter()
            .position(|key| *key == target)
            .unwrap() as u16;

        let mut recommission: StateChangeTx = builder
            .network
            .state_change(&later, worker_index, NewState::Recommission, &VOTERS)
            .unwrap();
        recommission.fee = 10;
        builder.service.validate_state_change_tx(&recommission, false).unwrap();

        mine(&builder, &h3, vec![Transaction::StateChange(recommission)]);
        let entry = &builder.service.get_registry_state(&[target])[0];
        assert_eq!(entry.status, NodeStatus::Active);
        assert_ne!(entry.swarm_id, UNASSIGNED_SWARM_ID);
    }

    #[test]
    fn test_penalty_with_fee_rejected() {
        let (builder, h2) = network(2);
        let quorum = builder.obligations_quorum(&h2, 2).unwrap();
        let mut tx = builder
            .network
            .state_change(&quorum, 0, NewState::IpChangePenalty, &VOTERS)
            .unwrap();
        tx.fee = 1;

        assert_eq!(
            builder.service.validate_state_change_tx(&tx, false).unwrap_err(),
            ConsensusError::NonZeroFee { fee: 1 }
        );
    }

    #[test]
    fn test_recommission_of_active_node_rejected() {
        let (builder, h2) = network(2);
        let quorum = builder.obligations_quorum(&h2, 2).unwrap();
        let target = quorum.workers[0];
        let tx = builder
            .network
            .state_change(&quorum, 0, NewState::Recommission, &VOTERS)
            .unwrap();

        assert_eq!(
            builder.service.validate_state_change_tx(&tx, false).unwrap_err(),
            ConsensusError::InvalidStateTransition {
                target,
                from: "active",
                to: "recommission"
            }
        );
    }
}
