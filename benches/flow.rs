// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use flowform::format::extract::parse_graph;
use flowform::query::FlowAnalysis;

mod fixtures;
mod profiler;

// Benchmark identity (keep stable):
// - Group names in this file: `flow.extract`, `flow.analyze`
// - Case IDs (the string after the `/`) must remain stable so results stay comparable.
fn benches_flow(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("flow.extract");

        for (case_id, case) in [
            ("small", fixtures::Case::Small),
            ("medium", fixtures::Case::Medium),
            ("large_long_labels", fixtures::Case::LargeLongLabels),
        ] {
            let (body, _) = fixtures::body(case);
            group.throughput(Throughput::Bytes(body.len() as u64));
            group.bench_function(case_id, move |b| {
                b.iter(|| {
                    let graph = parse_graph(black_box(&body)).expect("parse");
                    black_box(graph.nodes.len() + graph.connections.len())
                })
            });
        }

        group.finish();
    }

    {
        let mut group = c.benchmark_group("flow.analyze");

        for (case_id, graph) in [
            ("small", fixtures::fixture(fixtures::Case::Small)),
            ("medium", fixtures::fixture(fixtures::Case::Medium)),
            ("large_long_labels", fixtures::fixture(fixtures::Case::LargeLongLabels)),
            ("layered_paths", fixtures::layered(8, 4, 2)),
        ] {
            group.throughput(Throughput::Elements(graph.nodes.len() as u64));
            group.bench_function(case_id, move |b| {
                b.iter(|| {
                    let analysis = FlowAnalysis::analyze(black_box(&graph));
                    black_box(analysis.main_flow().len() + analysis.branches().len())
                })
            });
        }

        group.finish();
    }
}

criterion_group! {
    name = benches;
    config = profiler::criterion();
    targets = benches_flow
}
criterion_main!(benches);
