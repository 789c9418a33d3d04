use criterion::{criterion_group, criterion_main, Criterion};
use oc_indexer::naming::generate_variants;

/// Benchmark: naming-variant generation across representative symbol shapes
/// (target: negligible per-symbol cost, this runs once per resolved symbol
/// during indexing).
fn bench_naming_variants(c: &mut Criterion) {
    let names = [
        "user_service",
        "UserService",
        "HTTPServerConfig",
        "IBaseUserRepository",
        "get_user_by_id",
        "OAuth2ClientFactory",
    ];

    let mut group = c.benchmark_group("naming_variants");

    group.bench_function("generate_variants_mixed_shapes", |b| {
        b.iter(|| {
            for name in &names {
                let _ = generate_variants(name);
            }
        });
    });

    group.bench_function("generate_variants_single_snake_case", |b| {
        b.iter(|| {
            let _ = generate_variants("process_incoming_request");
        });
    });

    group.finish();
}

criterion_group!(benches, bench_naming_variants);
criterion_main!(benches);
