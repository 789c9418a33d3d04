use criterion::{criterion_group, criterion_main, Criterion};
use oc_core::{CodeRelation, CodeSymbol, Language, RelationKind, SymbolId, SymbolKind};
use oc_retrieval::{TraceDirection, TraceEngine, TraceOptions};
use oc_storage::manager::StorageManager;
use std::path::PathBuf;
use tempfile::TempDir;

fn make_symbol(name: &str, file: &str, byte_start: usize, byte_end: usize) -> CodeSymbol {
    CodeSymbol {
        id: SymbolId::generate("bench-repo", file, name, byte_start, byte_end),
        name: name.to_string(),
        qualified_name: name.to_string(),
        kind: SymbolKind::Function,
        language: Language::Python,
        file_path: PathBuf::from(file),
        byte_range: byte_start..byte_end,
        line_range: 0..10,
        signature: Some(format!("def {name}()")),
        doc_comment: None,
        body_hash: 42,
        ..Default::default()
    }
}

/// Benchmark: cross-language call-tree trace over a chain + fan-out graph
/// (target <50ms for a 5-hop trace over 10K symbols).
fn bench_trace_call_path(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let mut storage = StorageManager::open(tmp.path()).unwrap();

    let num_symbols = 10_000;
    let symbols: Vec<CodeSymbol> = (0..num_symbols)
        .map(|i| {
            make_symbol(
                &format!("func_{i}"),
                &format!("src/mod_{}.py", i / 100),
                i * 100,
                i * 100 + 50,
            )
        })
        .collect();
    storage.graph_mut().insert_symbols(&symbols, 1000).unwrap();

    let mut relations = Vec::new();
    for i in 0..num_symbols {
        for offset in 1..=3 {
            let target = (i + offset) % num_symbols;
            relations.push(CodeRelation {
                source_id: symbols[i].id,
                target_id: symbols[target].id,
                kind: RelationKind::Calls,
                file_path: PathBuf::from(format!("src/mod_{}.py", i / 100)),
                line: (i % 100) as u32,
                confidence: RelationKind::Calls.default_confidence(),
                workspace_id: String::new(),
            });
        }
    }
    storage.graph_mut().insert_relations(&relations, 1000).unwrap();

    let engine = TraceEngine::new(&storage);
    let mut group = c.benchmark_group("trace_call_path");

    group.bench_function("downstream_depth5_10k_symbols", |b| {
        b.iter(|| {
            let mut options = TraceOptions::new(TraceDirection::Downstream);
            options.max_depth = 5;
            options.enable_semantic = false;
            let _ = engine.trace_call_path("func_0", &options);
        });
    });

    group.bench_function("both_depth3_10k_symbols", |b| {
        b.iter(|| {
            let mut options = TraceOptions::new(TraceDirection::Both);
            options.max_depth = 3;
            options.enable_semantic = false;
            let _ = engine.trace_call_path("func_0", &options);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_trace_call_path);
criterion_main!(benches);
