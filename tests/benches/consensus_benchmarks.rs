//! # Service Node Consensus Benchmarks
//!
//! | Area | Work per call |
//! |------|---------------|
//! | Quorum derivation | Two seeded shuffles over the active set |
//! | Swarm assignment | Sort and partition of the active set |
//! | Checkpoint verification | 13 Ed25519 verifications |
//! | Block application | Registry clone-on-write, rewards, quorums |

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_types::PublicKey;
use snq_consensus::adapters::Ed25519VoteVerifier;
use snq_consensus::domain::{
    compute_swarms, derive_quorum, quorum_seed, verify_checkpoint, QuorumType, RegistrationTx,
    RegistrySnapshot, ServiceNodeEntry,
};
use snq_consensus::test_utils::ChainBuilder;
use snq_consensus::{ServiceNodeApi, ServiceNodeConfig};

fn synthetic_keys(count: usize) -> Vec<PublicKey> {
    (0..count as u64)
        .map(|i| {
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&i.wrapping_mul(0x9E37_79B9_7F4A_7C15).to_be_bytes());
            PublicKey::new(bytes)
        })
        .collect()
}

fn synthetic_registry(count: usize) -> RegistrySnapshot {
    let entries = synthetic_keys(count).into_iter().map(|key| {
        let tx = RegistrationTx {
            service_node_key: key,
            owner: *key.as_bytes(),
            stake: 1,
        };
        ServiceNodeEntry::from_registration(&tx, 1, 21_600)
    });
    RegistrySnapshot::from_entries(10, entries)
}

// ============================================================================
// Quorum derivation
// ============================================================================

fn bench_quorum_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("quorum-derivation");
    let config = ServiceNodeConfig::default();

    for size in [100, 1_000, 5_000] {
        let registry = synthetic_registry(size);
        group.throughput(Throughput::Elements(size as u64));

        for quorum_type in [QuorumType::Obligations, QuorumType::Checkpointing] {
            let seed = quorum_seed(&[0xAB; 32], quorum_type, 10);
            group.bench_with_input(
                BenchmarkId::new(quorum_type.label(), size),
                &registry,
                |b, registry| {
                    b.iter(|| {
                        derive_quorum(
                            black_box(registry),
                            10,
                            &seed,
                            quorum_type,
                            config.sizes(quorum_type),
                        )
                    })
                },
            );
        }
    }
    group.finish();
}

// ============================================================================
// Swarm assignment
// ============================================================================

fn bench_swarm_assignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm-assignment");
    let config = ServiceNodeConfig::default();

    for size in [100, 1_000, 5_000] {
        let keys = synthetic_keys(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &keys, |b, keys| {
            b.iter(|| compute_swarms(black_box(keys), &config.swarm))
        });
    }
    group.finish();
}

// ============================================================================
// Checkpoint verification
// ============================================================================

fn bench_checkpoint_verification(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint-verification");
    group.measurement_time(Duration::from_secs(10));

    let builder = ChainBuilder::new(25).unwrap();
    let h4 = builder.extend(builder.tip(), 0, 3, 1).unwrap();
    let quorum = builder.checkpoint_quorum(&h4).unwrap();
    let checkpoint = builder.network.checkpoint(&quorum, h4, 13).unwrap();
    let sizes = builder.service.config().checkpointing.clone();
    let verifier = Ed25519VoteVerifier::new();

    group.throughput(Throughput::Elements(checkpoint.vote_count() as u64));
    group.bench_function("thirteen_signatures", |b| {
        b.iter(|| verify_checkpoint(black_box(&checkpoint), &quorum, &sizes, &verifier))
    });
    group.finish();
}

// ============================================================================
// Block application
// ============================================================================

fn bench_block_application(c: &mut Criterion) {
    let mut group = c.benchmark_group("block-application");

    for nodes in [25, 250] {
        let builder = ChainBuilder::new(nodes).unwrap();
        let mut tip = builder.tip();
        group.bench_function(BenchmarkId::new("empty_block", nodes), |b| {
            b.iter(|| {
                let block = builder.block_on(&tip, 0, 1).unwrap();
                let verdict = builder.service.apply_block(&block).unwrap();
                tip = verdict.hash;
                verdict
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_quorum_derivation,
    bench_swarm_assignment,
    bench_checkpoint_verification,
    bench_block_application,
);
criterion_main!(benches);
