//! # Telemetry Scenarios
//!
//! Consensus activity shows up in the Prometheus export and through the
//! structured logging macros.

#[cfg(test)]
mod tests {
    use shared_types::short_hex;
    use snq_consensus::test_utils::block_hash;
    use snq_consensus::{log_block_event, log_vote_event, ServiceNodeApi, VoteOutcome};
    use snq_telemetry::encode_metrics;

    use crate::integration::fixtures::network;

    #[test]
    fn test_consensus_metrics_exported() {
        let (builder, h4) = network(4);
        builder.vote_checkpoint(h4, 13).unwrap();
        builder.extend(block_hash(0, 3), 1, 1, 1).unwrap();

        let text = encode_metrics().unwrap();
        for name in [
            "snq_blocks_applied_total",
            "snq_votes_accepted_total",
            "snq_checkpoints_formed_total",
            "snq_live_forks",
        ] {
            assert!(text.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_rejections_counted_by_reason() {
        let (builder, h4) = network(4);
        builder.vote_checkpoint(h4, 1).unwrap();
        assert!(builder.vote_checkpoint(h4, 1).is_err());

        let text = encode_metrics().unwrap();
        assert!(text.contains("snq_votes_rejected_total"));
        assert!(text.contains("reason=\"duplicate_vote\""));
    }

    #[test]
    fn test_logging_macros_with_consensus_values() {
        let (builder, h4) = network(4);
        let verdict = builder
            .service
            .apply_block(&builder.block_on(&h4, 0, 1).unwrap())
            .unwrap();
        log_block_event!(
            info,
            "Block applied",
            verdict.height,
            short_hex(&verdict.hash),
            canonical = verdict.became_canonical
        );

        let outcome = builder.vote_checkpoint(h4, 1).unwrap();
        if let VoteOutcome::Pending { votes, required } = outcome {
            log_vote_event!(debug, "Vote accepted", 4u64, 0u16, votes, required);
        }
    }
}
