use async_trait::async_trait;
use common::{Deadline, GlobalId};
use criterion::{Criterion, criterion_group, criterion_main};
use saga::{Saga, SagaCoordinator, SagaError, Workflow};

struct Steps {
    count: usize,
    fail: bool,
}

#[async_trait]
impl Saga for Steps {
    type Payload = ();
    type Output = ();
    type Error = SagaError;

    fn name(&self) -> &'static str {
        "bench_workflow"
    }

    async fn run(&self, wf: &mut Workflow<SagaError>, _: ()) -> Result<(), SagaError> {
        for i in 0..self.count {
            wf.step(format!("step_{i}"))
                .on_rollback(|| async { Ok(()) });
        }
        if self.fail {
            return Err(SagaError::InvalidRegistration("bench".to_string()));
        }
        Ok(())
    }
}

fn bench_execute(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("saga_execute");

    for (label, fail) in [("forward_only", false), ("with_unwind", true)] {
        let handle = SagaCoordinator::register(Steps { count: 10, fail }).unwrap();
        group.bench_function(label, |b| {
            b.to_async(&rt)
                .iter(|| handle.execute(GlobalId::new(), Deadline::none(), ()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_execute);
criterion_main!(benches);
