// Benchmark suite for the pipeline scheduler

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipeline_scheduler::{
    ExecuteOptions, ExecutionContext, ExecutionResult, ExecutionStatus, Payload,
    PipelineDescriptor, PipelineInstance, Scheduler, SchedulerConfig,
};
use tokio::runtime::Runtime;

struct EchoInstance;

#[async_trait]
impl PipelineInstance for EchoInstance {
    async fn execute(&self, ctx: ExecutionContext) -> ExecutionResult {
        ExecutionResult {
            execution_id: ctx.execution_id,
            pipeline_id: ctx.pipeline_id,
            instance_id: ctx.instance_id,
            status: ExecutionStatus::Completed,
            start_time: ctx.start_time,
            end_time: chrono::Utc::now(),
            duration: Duration::from_micros(1),
            error: None,
            retry_count: ctx.retry_count,
            output: Some(ctx.payload),
        }
    }

    async fn health_probe(&self) -> bool {
        true
    }
}

async fn setup_scheduler(pipeline_count: usize) -> Scheduler {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    for i in 0..pipeline_count {
        let descriptor = PipelineDescriptor::new(format!("p{i}"), format!("pipeline {i}"), "echo");
        scheduler.create_pipeline(descriptor, Arc::new(EchoInstance)).unwrap();
    }
    scheduler
}

fn benchmark_single_execute(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let scheduler = rt.block_on(setup_scheduler(1));

    c.bench_function("execute_single_pipeline", |b| {
        b.to_async(&rt).iter(|| async {
            scheduler.execute(Payload::new(vec![1, 2, 3]), ExecuteOptions::default()).await
        });
    });
}

fn benchmark_round_robin_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("round_robin_throughput");

    for pipeline_count in [1, 4, 16].iter() {
        let scheduler = Arc::new(rt.block_on(setup_scheduler(*pipeline_count)));
        group.throughput(Throughput::Elements(*pipeline_count as u64));
        group.bench_with_input(
            BenchmarkId::new("pipelines", pipeline_count),
            pipeline_count,
            |b, _| {
                b.to_async(&rt).iter(|| {
                    let scheduler = scheduler.clone();
                    async move {
                        scheduler.execute(Payload::new(vec![1]), ExecuteOptions::default()).await
                    }
                });
            },
        );
    }
    group.finish();
}

fn benchmark_concurrent_execute(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let scheduler = Arc::new(rt.block_on(setup_scheduler(8)));
    let mut group = c.benchmark_group("concurrent_execute");

    for concurrency in [1, 10, 50].iter() {
        group.throughput(Throughput::Elements(*concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("concurrent_requests", concurrency),
            concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| {
                    let scheduler = scheduler.clone();
                    async move {
                        let mut handles = Vec::new();
                        for i in 0..concurrency {
                            let scheduler = scheduler.clone();
                            handles.push(tokio::spawn(async move {
                                scheduler
                                    .execute(Payload::new(vec![i as u8]), ExecuteOptions::default())
                                    .await
                            }));
                        }
                        for handle in handles {
                            handle.await.unwrap();
                        }
                    }
                });
            },
        );
    }
    group.finish();
}

fn custom_criterion() -> Criterion {
    Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(50)
        .warm_up_time(Duration::from_secs(1))
}

criterion_group!(
    name = benches;
    config = custom_criterion();
    targets = benchmark_single_execute, benchmark_round_robin_throughput, benchmark_concurrent_execute
);
criterion_main!(benches);
