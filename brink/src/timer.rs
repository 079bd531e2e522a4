use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Fixed-period ticker pacing the scheduler's control loop.
pub(crate) struct Timer {
    interval: Interval,
    interval_dur: Duration,
}

impl Timer {
    pub async fn new(interval_dur: Duration) -> Self {
        let mut interval = interval(interval_dur);
        // NOTE: Skipping keeps ticks aligned with the ramp's clock after a slow iteration of
        // the control loop.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // NOTE: First tick completes instantly
        interval.tick().await;
        Self {
            interval,
            interval_dur,
        }
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

impl std::fmt::Display for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", humantime::format_duration(self.interval_dur))
    }
}
