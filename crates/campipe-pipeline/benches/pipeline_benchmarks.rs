//! Pipeline Benchmarks
//!
//! Criterion benchmarks for the node-callback hot path: axis completion,
//! fence bookkeeping and node completion callbacks.

use campipe_pipeline::barrier::{CompletionAxis, RequestSlot};
use campipe_pipeline::fence::{FenceHandle, FenceList};
use campipe_pipeline::prelude::*;
use campipe_test_helpers::prelude::*;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn offline_harness(nodes: u32) -> Harness {
    let config = must(
        PipelineConfig::builder()
            .name("Bench")
            .realtime(false)
            .request_queue_depth(8)
            .build(),
    );
    let nodes = (1..=nodes).map(|id| MockNode::new(id, "bench")).collect();
    must(Harness::chain(config, nodes))
}

fn bench_slot_complete(c: &mut Criterion) {
    let slot = RequestSlot::default();

    c.bench_function("slot_complete_axis", |b| {
        b.iter(|| black_box(slot.complete(black_box(CompletionAxis::Output), black_box(u32::MAX))))
    });
}

fn bench_fence_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("fence_list_register_remove");

    for count in [1u64, 4, 8, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut list = FenceList::new();
                for handle in 0..count {
                    list.register(FenceHandle(handle));
                }
                for handle in (0..count).rev() {
                    black_box(list.remove(FenceHandle(handle)));
                }
            })
        });
    }

    group.finish();
}

fn bench_completion_hot_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify_node_completion");

    for nodes in [1u32, 4, 8] {
        let harness = offline_harness(nodes);
        must(harness.pipeline.process_request(&CaptureRequest::single(1)));
        let ids: Vec<NodeId> = harness.nodes.iter().map(|node| node.node_id()).collect();

        group.bench_with_input(BenchmarkId::from_parameter(nodes), &ids, |b, ids| {
            b.iter(|| {
                for &id in ids {
                    let _ = black_box(harness.pipeline.notify_node_completion(
                        black_box(id),
                        black_box(1),
                        CompletionAxis::Output,
                    ));
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_slot_complete, bench_fence_list, bench_completion_hot_path);
criterion_main!(benches);
