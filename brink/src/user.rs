use crate::registry::MetricsRegistry;
use crate::transport::Transport;
use brink_core::{
    classify, IterationContext, JitterRange, TargetBuilder, ITERATIONS, ITERATION_DURATION,
};
use rand::Rng;
use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

/// Lifecycle of a virtual user. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Lifecycle {
    Active = 0,
    /// Finish the current iteration, then stop.
    Draining = 1,
    Stopped = 2,
}

#[derive(Debug)]
pub(crate) struct LifecycleCell(AtomicU8);

impl LifecycleCell {
    fn new() -> Self {
        Self(AtomicU8::new(Lifecycle::Active as u8))
    }

    pub fn get(&self) -> Lifecycle {
        match self.0.load(Ordering::Acquire) {
            0 => Lifecycle::Active,
            1 => Lifecycle::Draining,
            _ => Lifecycle::Stopped,
        }
    }

    fn drain(&self) {
        let _ = self.0.compare_exchange(
            Lifecycle::Active as u8,
            Lifecycle::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn stop(&self) {
        self.0.store(Lifecycle::Stopped as u8, Ordering::Release);
    }
}

/// Run-wide source of iteration indices.
#[derive(Clone, Debug, Default)]
pub(crate) struct IterationCounter {
    next: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
}

impl IterationCounter {
    pub fn next(&self, user: u64) -> IterationContext {
        IterationContext {
            index: self.next.fetch_add(1, Ordering::Relaxed),
            user,
        }
    }

    /// Marks an index as having produced a request.
    pub fn mark_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of indices that produced a request. An index whose target
    /// could not be derived is claimed but never counted.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

/// Everything a virtual user shares with the rest of the run.
pub(crate) struct UserContext<T> {
    pub transport: Arc<T>,
    pub targets: Arc<TargetBuilder>,
    pub registry: Arc<MetricsRegistry>,
    pub counter: IterationCounter,
    pub jitter: JitterRange,
}

impl<T> Clone for UserContext<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            targets: self.targets.clone(),
            registry: self.registry.clone(),
            counter: self.counter.clone(),
            jitter: self.jitter,
        }
    }
}

pub(crate) struct VirtualUser {
    id: u64,
    lifecycle: Arc<LifecycleCell>,
    handle: JoinHandle<()>,
}

impl VirtualUser {
    pub fn spawn<T, R>(id: u64, context: UserContext<T>, rng: R) -> Self
    where
        T: Transport,
        R: Rng + Send + 'static,
    {
        let lifecycle = Arc::new(LifecycleCell::new());
        let handle = tokio::spawn(run_user(id, context, lifecycle.clone(), rng));
        Self {
            id,
            lifecycle,
            handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask the user to stop after its current iteration. Never interrupts a request.
    pub fn drain(&self) {
        self.lifecycle.drain();
    }

    #[allow(unused)]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            error!("Virtual user {} terminated abnormally: {err}", self.id);
        }
    }
}

async fn run_user<T, R>(id: u64, context: UserContext<T>, lifecycle: Arc<LifecycleCell>, mut rng: R)
where
    T: Transport,
    R: Rng,
{
    trace!("Virtual user {id} started");

    loop {
        let start = Instant::now();
        let iteration = context.counter.next(id);

        let target = match context.targets.build(iteration) {
            Ok(target) => target,
            Err(err) => {
                error!("Virtual user {id} stopping: {err}");
                break;
            }
        };

        context.counter.mark_sent();
        let outcome = context.transport.send(&target).await;
        let verdict = classify(&outcome);
        trace!(
            "Iteration {} (user {id}): {:?} in {:?}",
            iteration.index,
            verdict,
            outcome.latency
        );
        context.registry.record(&outcome, verdict);

        tokio::time::sleep(context.jitter.sample(&mut rng)).await;

        context.registry.increment(ITERATIONS);
        context.registry.observe(ITERATION_DURATION, start.elapsed());

        if lifecycle.get() != Lifecycle::Active {
            break;
        }
    }

    lifecycle.stop();
    trace!("Virtual user {id} stopped");
}
