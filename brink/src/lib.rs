#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod registry;
pub mod scenario;
pub mod scheduler;
pub mod transport;

pub(crate) mod timer;
pub(crate) mod user;

pub use brink_core as core;
pub use registry::MetricsRegistry;
pub use scenario::LoadTest;
pub use scheduler::{run, run_until};
pub use transport::Transport;

#[cfg(feature = "http")]
pub use transport::HttpTransport;

pub mod prelude {
    pub use crate::scenario::{ConfigurableLoadTest, LoadTest};
    pub use crate::scheduler::{run, run_until};
    pub use crate::transport::Transport;

    #[cfg(feature = "http")]
    pub use crate::transport::HttpTransport;

    pub use brink_core::{
        ConfigError, LoadTestConfig, Outcome, RampPolicy, RunReport, Stage, Target,
    };
}
