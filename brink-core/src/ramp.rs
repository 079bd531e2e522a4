use crate::config::duration_str;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A time-bounded segment of the ramp with a target concurrency level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "duration_str")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub const fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// How concurrency moves from one stage's target to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampPolicy {
    /// Interpolate from the previous stage's target (0 before the first stage) to this
    /// stage's target over the stage's duration, rounding to the nearest user.
    #[default]
    Linear,
    /// Jump to the stage target as soon as the stage begins.
    Step,
}

/// Desired concurrency at a given instant of the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RampPoint {
    pub stage: usize,
    pub concurrency: usize,
}

/// The full, ordered load profile of a run.
#[derive(Clone, Debug)]
pub struct Ramp {
    stages: Vec<Stage>,
    policy: RampPolicy,
    total: Duration,
}

impl Ramp {
    pub fn new(stages: Vec<Stage>, policy: RampPolicy) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        let total = stages.iter().map(|s| s.duration).sum();
        Ok(Self {
            stages,
            policy,
            total,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn policy(&self) -> RampPolicy {
        self.policy
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Concurrency held once the last stage has elapsed.
    pub fn final_target(&self) -> usize {
        self.stages.last().map(|s| s.target).unwrap_or(0)
    }

    /// Start and end offsets of stage `index`.
    pub fn stage_bounds(&self, index: usize) -> Option<(Duration, Duration)> {
        let start: Duration = self.stages.iter().take(index).map(|s| s.duration).sum();
        self.stages
            .get(index)
            .map(|stage| (start, start + stage.duration))
    }

    /// Returns `None` once the ramp is over.
    pub fn point_at(&self, elapsed: Duration) -> Option<RampPoint> {
        let mut stage_start = Duration::ZERO;
        let mut previous = 0;

        for (stage, Stage { duration, target }) in self.stages.iter().enumerate() {
            let stage_end = stage_start + *duration;

            // NOTE: Zero-length stages never match, so they act as an immediate step.
            if elapsed < stage_end {
                let concurrency = match self.policy {
                    RampPolicy::Step => *target,
                    RampPolicy::Linear => {
                        let progress =
                            (elapsed - stage_start).as_secs_f64() / duration.as_secs_f64();
                        interpolate(previous, *target, progress)
                    }
                };

                return Some(RampPoint { stage, concurrency });
            }

            previous = *target;
            stage_start = stage_end;
        }

        None
    }
}

fn interpolate(from: usize, to: usize, progress: f64) -> usize {
    let value = from as f64 + (to as f64 - from as f64) * progress.clamp(0., 1.);
    value.round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaking_point_stages() -> Vec<Stage> {
        vec![
            Stage::new(Duration::from_secs(30), 20),
            Stage::new(Duration::from_secs(30), 50),
            Stage::new(Duration::from_secs(60), 100),
            Stage::new(Duration::from_secs(20), 0),
        ]
    }

    #[test]
    fn empty_ramp_is_rejected() {
        assert!(matches!(
            Ramp::new(vec![], RampPolicy::Linear),
            Err(ConfigError::NoStages)
        ));
    }

    #[test]
    fn total_duration_is_sum_of_stages() {
        let ramp = Ramp::new(breaking_point_stages(), RampPolicy::Linear).unwrap();
        assert_eq!(ramp.total_duration(), Duration::from_secs(140));
        assert_eq!(ramp.final_target(), 0);
        assert_eq!(
            ramp.stage_bounds(2),
            Some((Duration::from_secs(60), Duration::from_secs(120)))
        );
        assert_eq!(ramp.stage_bounds(4), None);
    }

    #[test]
    fn linear_interpolates_between_targets() {
        let ramp = Ramp::new(breaking_point_stages(), RampPolicy::Linear).unwrap();

        let at = |secs: f64| ramp.point_at(Duration::from_secs_f64(secs)).unwrap();

        assert_eq!(at(0.), RampPoint { stage: 0, concurrency: 0 });
        assert_eq!(at(15.), RampPoint { stage: 0, concurrency: 10 });
        assert_eq!(at(30.), RampPoint { stage: 1, concurrency: 20 });
        assert_eq!(at(45.), RampPoint { stage: 1, concurrency: 35 });
        assert_eq!(at(90.), RampPoint { stage: 2, concurrency: 75 });
        assert_eq!(at(130.), RampPoint { stage: 3, concurrency: 50 });
        assert_eq!(ramp.point_at(Duration::from_secs(140)), None);
    }

    #[test]
    fn step_holds_stage_target() {
        let ramp = Ramp::new(breaking_point_stages(), RampPolicy::Step).unwrap();

        for (secs, expected) in [(0, 20), (29, 20), (30, 50), (61, 100), (119, 100), (120, 0)] {
            let point = ramp.point_at(Duration::from_secs(secs)).unwrap();
            assert_eq!(point.concurrency, expected, "at {secs}s");
        }
    }

    #[test]
    fn zero_length_stage_is_an_immediate_step() {
        let ramp = Ramp::new(
            vec![
                Stage::new(Duration::ZERO, 40),
                Stage::new(Duration::from_secs(10), 40),
            ],
            RampPolicy::Linear,
        )
        .unwrap();

        let point = ramp.point_at(Duration::ZERO).unwrap();
        assert_eq!(point, RampPoint { stage: 1, concurrency: 40 });
    }

    #[test]
    fn cooldown_reaches_zero() {
        let ramp = Ramp::new(
            vec![
                Stage::new(Duration::from_secs(10), 10),
                Stage::new(Duration::from_secs(10), 0),
            ],
            RampPolicy::Linear,
        )
        .unwrap();

        assert_eq!(
            ramp.point_at(Duration::from_millis(19_990)).unwrap().concurrency,
            0
        );
    }
}
