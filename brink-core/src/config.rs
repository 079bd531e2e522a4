use crate::constants::{
    DEFAULT_GRANULARITY, DEFAULT_JITTER_MAX, DEFAULT_JITTER_MIN, DEFAULT_TIME_STEP,
    DEFAULT_USER_AGENT,
};
use crate::{ConfigError, Ramp, RampPolicy, Stage, TargetBuilder, Threshold};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Serde adapter for human readable durations (`"30s"`, `"1m"`, `"1s 500ms"`).
pub(crate) mod duration_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let input = String::deserialize(deserializer)?;
        humantime::parse_duration(&input).map_err(D::Error::custom)
    }
}

/// Bounds of the randomized sleep between two iterations of a virtual user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterRange {
    #[serde(with = "duration_str")]
    pub min: Duration,
    #[serde(with = "duration_str")]
    pub max: Duration,
}

impl JitterRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            Err(ConfigError::Jitter { min, max })
        } else {
            Ok(Self { min, max })
        }
    }

    /// Draw a sleep uniformly from `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min >= self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

impl Default for JitterRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_JITTER_MIN,
            max: DEFAULT_JITTER_MAX,
        }
    }
}

/// User facing description of a load test.
///
/// Nothing is validated until [`LoadTestConfig::validate`], which is called before any virtual
/// user is spawned.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadTestConfig {
    pub name: String,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub ramp: RampPolicy,
    /// Metric name to threshold expressions, e.g. `{"http_req_failed": ["rate<0.10"]}`.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
    /// RFC 3339 timestamp seeding target derivation.
    pub base_time: String,
    #[serde(default = "default_time_step", with = "duration_str")]
    pub time_step: Duration,
    /// Opaque prefix every derived timestamp is appended to.
    #[serde(default)]
    pub target_prefix: String,
    #[serde(default)]
    pub jitter: JitterRange,
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_granularity", with = "duration_str")]
    pub granularity: Duration,
    /// Fixes every virtual user's jitter RNG.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_time_step() -> Duration {
    DEFAULT_TIME_STEP
}

fn default_granularity() -> Duration {
    DEFAULT_GRANULARITY
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("User-Agent".to_string(), DEFAULT_USER_AGENT.to_string())])
}

impl LoadTestConfig {
    /// A config with no stages, based at the current time.
    pub fn new(name: &str) -> Self {
        let base_time = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        Self {
            name: name.to_string(),
            stages: vec![],
            ramp: RampPolicy::default(),
            thresholds: BTreeMap::new(),
            base_time,
            time_step: DEFAULT_TIME_STEP,
            target_prefix: String::new(),
            jitter: JitterRange::default(),
            headers: default_headers(),
            granularity: DEFAULT_GRANULARITY,
            seed: None,
        }
    }

    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn validate(&self) -> Result<RunPlan, ConfigError> {
        let ramp = Ramp::new(self.stages.clone(), self.ramp)?;

        if self.granularity.is_zero() {
            return Err(ConfigError::Granularity);
        }

        let jitter = JitterRange::new(self.jitter.min, self.jitter.max)?;

        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let targets =
            TargetBuilder::new(&self.target_prefix, &self.base_time, self.time_step, headers)?;

        let thresholds = self
            .thresholds
            .iter()
            .flat_map(|(metric, exprs)| exprs.iter().map(|expr| Threshold::parse(metric, expr)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RunPlan {
            name: self.name.clone(),
            ramp,
            thresholds,
            targets,
            jitter,
            granularity: self.granularity,
            seed: self.seed,
        })
    }
}

/// A validated load test, ready to be scheduled.
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub name: String,
    pub ramp: Ramp,
    pub thresholds: Vec<Threshold>,
    pub targets: TargetBuilder,
    pub jitter: JitterRange,
    pub granularity: Duration,
    pub seed: Option<u64>,
}
