//! Benchmarks comparing the two completion-time service strategies.
//!
//! The pipeline benchmark measures end-to-end submission cost, shutdown
//! included, so the queued strategy pays for draining its backlog. The
//! read benchmark measures the watermark read path while a writer keeps
//! the service busy, which is where the strategies differ most.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tideline::coord::new_completion_time_service;
use tideline::{
    CompletionTimeService, CompletionTimeStrategy, ErrorReporter, GlobalCompletionTimeReader,
    LocalCompletionTimeWriter, PeerId, Time,
};

const STRATEGIES: [CompletionTimeStrategy; 2] = [
    CompletionTimeStrategy::Synchronized,
    CompletionTimeStrategy::Queued,
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ramps `submissions` local initiated/completed pairs plus one peer
/// report through a fresh service and shuts it down.
fn run_pipeline(strategy: CompletionTimeStrategy, submissions: u64) -> Option<Time> {
    let reporter = Arc::new(ErrorReporter::new());
    let peers = [PeerId::new("alpha")];
    let handles =
        new_completion_time_service(strategy, PeerId::new("driver"), &peers, reporter).unwrap();
    let writer = handles.service.new_local_writer().unwrap();
    for t in 1..=submissions {
        writer.submit_initiated(Time::from_nanos(t)).unwrap();
        writer.submit_completed(Time::from_nanos(t)).unwrap();
    }
    handles
        .service
        .submit_peer_completed(&peers[0], Time::from_nanos(submissions))
        .unwrap();
    handles.service.shutdown().unwrap();
    handles.reader.global_completion_time()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_submission_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("submission_pipeline");
    for submissions in [128u64, 1_024, 8_192] {
        for strategy in STRATEGIES {
            group.bench_with_input(
                BenchmarkId::new(strategy.as_str(), submissions),
                &submissions,
                |b, &submissions| {
                    b.iter(|| std::hint::black_box(run_pipeline(strategy, submissions)));
                },
            );
        }
    }
    group.finish();
}

fn bench_watermark_read_under_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("watermark_read_under_load");
    for strategy in STRATEGIES {
        group.bench_function(BenchmarkId::from_parameter(strategy.as_str()), |b| {
            let reporter = Arc::new(ErrorReporter::new());
            let handles =
                new_completion_time_service(strategy, PeerId::new("driver"), &[], reporter)
                    .unwrap();
            let stop = Arc::new(AtomicBool::new(false));
            let load = {
                let writer = handles.service.new_local_writer().unwrap();
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    let mut t = 0u64;
                    while !stop.load(Ordering::Acquire) {
                        t += 1;
                        writer.submit_initiated(Time::from_nanos(t)).unwrap();
                        writer.submit_completed(Time::from_nanos(t)).unwrap();
                    }
                })
            };

            b.iter(|| std::hint::black_box(handles.reader.global_completion_time()));

            stop.store(true, Ordering::Release);
            load.join().unwrap();
            handles.service.shutdown().unwrap();
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_submission_pipeline,
    bench_watermark_read_under_load,
);
criterion_main!(benches);
