//! Ramp scheduling and the run lifecycle
use crate::registry::MetricsRegistry;
use crate::timer::Timer;
use crate::transport::Transport;
use crate::user::{IterationCounter, UserContext, VirtualUser};
use brink_core::{
    evaluate_thresholds, ConcurrencySample, ConfigError, LoadTestConfig, RunPlan, RunReport,
};
use rand::{rngs::SmallRng, SeedableRng};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Runs a load test to completion.
///
/// The config is validated before any virtual user is spawned; an invalid config sends no
/// requests at all.
pub async fn run<T: Transport>(
    config: &LoadTestConfig,
    transport: T,
) -> Result<RunReport, ConfigError> {
    run_until(config, transport, std::future::pending()).await
}

/// Runs a load test, ending it early once `shutdown` completes.
///
/// An early end is graceful: every virtual user finishes its in-flight request before the report
/// is produced, and the report is marked as aborted.
pub async fn run_until<T, S>(
    config: &LoadTestConfig,
    transport: T,
    shutdown: S,
) -> Result<RunReport, ConfigError>
where
    T: Transport,
    S: Future<Output = ()> + Send,
{
    run_shared(config, Arc::new(transport), shutdown).await
}

pub(crate) async fn run_shared<T, S>(
    config: &LoadTestConfig,
    transport: Arc<T>,
    shutdown: S,
) -> Result<RunReport, ConfigError>
where
    T: Transport,
    S: Future<Output = ()> + Send,
{
    let plan = config.validate()?;
    Ok(RampScheduler::new(plan, transport).run(shutdown).await)
}

/// Owns every virtual user of a run and keeps their number on the ramp.
pub(crate) struct RampScheduler<T> {
    plan: RunPlan,
    context: UserContext<T>,
    /// Oldest first.
    active: Vec<VirtualUser>,
    draining: Vec<VirtualUser>,
    next_user: u64,
}

impl<T: Transport> RampScheduler<T> {
    pub fn new(plan: RunPlan, transport: Arc<T>) -> Self {
        let context = UserContext {
            transport,
            targets: Arc::new(plan.targets.clone()),
            registry: Arc::new(MetricsRegistry::new()),
            counter: IterationCounter::default(),
            jitter: plan.jitter,
        };

        Self {
            plan,
            context,
            active: vec![],
            draining: vec![],
            next_user: 0,
        }
    }

    #[instrument(name = "load_test", skip_all, fields(name = self.plan.name))]
    pub async fn run<S: Future<Output = ()>>(mut self, shutdown: S) -> RunReport {
        let ramp = self.plan.ramp.clone();
        info!(
            "Running {} for {} ({:?} ramp over {} stages)",
            self.plan.name,
            humantime::format_duration(ramp.total_duration()),
            ramp.policy(),
            ramp.stages().len(),
        );

        tokio::pin!(shutdown);
        let start = Instant::now();
        let mut timer = Timer::new(self.plan.granularity).await;
        debug!("Scheduler ticking every {timer}");

        let mut timeline = vec![];
        let mut peak_concurrency = 0;
        let mut current_stage = None;
        let mut aborted = false;

        loop {
            let elapsed = start.elapsed();
            let Some(point) = ramp.point_at(elapsed) else {
                break;
            };

            if current_stage != Some(point.stage) {
                let stage = &ramp.stages()[point.stage];
                info!(
                    "Stage {} started: {} users over {}",
                    point.stage,
                    stage.target,
                    humantime::format_duration(stage.duration)
                );
                current_stage = Some(point.stage);
            }

            if self.reap().await > 0 {
                error!("Virtual users stopped on their own, ending the run early");
                aborted = true;
                break;
            }

            self.set_concurrency(point.concurrency);
            peak_concurrency = peak_concurrency.max(self.active.len());
            timeline.push(ConcurrencySample {
                elapsed,
                stage: point.stage,
                desired: point.concurrency,
                active: self.active.len() + self.draining.len(),
            });

            tokio::select! {
                _ = timer.tick() => {}
                _ = &mut shutdown => {
                    warn!("Shutdown requested, draining {} users", self.active.len());
                    aborted = true;
                    break;
                }
            }
        }

        let final_concurrency = if aborted {
            self.active.len()
        } else {
            ramp.final_target()
        };

        self.drain_all().await;

        let elapsed = start.elapsed();
        let snapshot = self.context.registry.snapshot(elapsed);
        let (passed, thresholds) = evaluate_thresholds(&self.plan.thresholds, &snapshot);

        for result in thresholds.iter().filter(|t| !t.passed) {
            warn!("Threshold crossed: {result}");
        }

        info!(
            "{} {} after {} ({} requests)",
            self.plan.name,
            if passed { "passed" } else { "failed" },
            humantime::format_duration(elapsed),
            snapshot.total_requests(),
        );

        RunReport {
            name: self.plan.name.clone(),
            passed,
            thresholds,
            snapshot,
            elapsed,
            iterations: self.context.counter.sent(),
            peak_concurrency,
            final_concurrency,
            timeline,
            aborted,
        }
    }

    /// Spawns or drains users until exactly `desired` are active.
    ///
    /// The newest users are drained first. A drained user is never brought back.
    fn set_concurrency(&mut self, desired: usize) {
        let current = self.active.len();

        if desired > current {
            for _ in current..desired {
                let id = self.next_user;
                self.next_user += 1;
                let rng = self.rng(id);
                self.active
                    .push(VirtualUser::spawn(id, self.context.clone(), rng));
            }
            debug!("Concurrency {current} -> {desired}");
        } else if desired < current {
            let excess = self.active.split_off(desired);
            for user in excess.into_iter().rev() {
                trace!("Draining virtual user {}", user.id());
                user.drain();
                self.draining.push(user);
            }
            debug!("Concurrency {current} -> {desired}");
        }
    }

    /// Joins finished users. Returns how many active users stopped without being drained.
    async fn reap(&mut self) -> usize {
        for user in take_finished(&mut self.draining) {
            user.join().await;
        }

        let stopped = take_finished(&mut self.active);
        let count = stopped.len();
        for user in stopped {
            user.join().await;
        }
        count
    }

    async fn drain_all(&mut self) {
        let users: Vec<_> = self
            .active
            .drain(..)
            .rev()
            .chain(self.draining.drain(..))
            .collect();

        info!("Draining {} users", users.len());
        for user in &users {
            user.drain();
        }
        for user in users {
            user.join().await;
        }
    }

    fn rng(&self, id: u64) -> SmallRng {
        match self.plan.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(id)),
            None => SmallRng::from_entropy(),
        }
    }
}

fn take_finished(users: &mut Vec<VirtualUser>) -> Vec<VirtualUser> {
    let (finished, running): (Vec<_>, Vec<_>) = users.drain(..).partition(|user| user.is_finished());
    *users = running;
    finished
}
