// Endorsement benchmarks for BFT-SH-DID.
//
// Covers keypair generation, endorsing a proposal digest, signer recovery
// on valid and garbage endorsements, and recovering a whole quorum batch.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bftdid_protocol::config::PROPOSAL_DIGEST_CONTEXT;
use bftdid_protocol::crypto::{domain_separated_hash, recover_signer, sign_digest, Endorsement, Keypair};

fn digest() -> [u8; 32] {
    domain_separated_hash(PROPOSAL_DIGEST_CONTEXT, &[b"bench proposal"])
}

fn bench_keypair_generation(c: &mut Criterion) {
    c.bench_function("ed25519/keypair_generate", |b| {
        b.iter(Keypair::generate);
    });
}

fn bench_endorse(c: &mut Criterion) {
    let keypair = Keypair::generate();
    let digest = digest();

    c.bench_function("endorsement/sign_digest", |b| {
        b.iter(|| sign_digest(&keypair, &digest));
    });
}

fn bench_recover_signer(c: &mut Criterion) {
    let keypair = Keypair::generate();
    let digest = digest();
    let valid = sign_digest(&keypair, &digest);
    let garbage = Endorsement::from_bytes(vec![0x5a; 96]);

    c.bench_function("endorsement/recover_valid", |b| {
        b.iter(|| recover_signer(&digest, &valid).is_ok());
    });
    c.bench_function("endorsement/recover_garbage", |b| {
        b.iter(|| recover_signer(&digest, &garbage).is_err());
    });
}

fn bench_recover_quorum(c: &mut Criterion) {
    let mut group = c.benchmark_group("endorsement/recover_quorum");
    let digest = digest();

    for f in [1u32, 3, 10, 15] {
        let quorum = (2 * f + 1) as usize;
        let batch: Vec<_> = (0..quorum)
            .map(|_| sign_digest(&Keypair::generate(), &digest))
            .collect();

        group.throughput(Throughput::Elements(quorum as u64));
        group.bench_with_input(BenchmarkId::from_parameter(f), &batch, |b, batch| {
            b.iter(|| batch.iter().filter(|e| recover_signer(&digest, e).is_ok()).count());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_keypair_generation,
    bench_endorse,
    bench_recover_signer,
    bench_recover_quorum,
);
criterion_main!(benches);
