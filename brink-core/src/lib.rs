mod classify;
mod config;
mod constants;
mod error;
mod ramp;
mod stats;
mod target;
mod threshold;

pub use classify::*;
pub use config::*;
pub use constants::*;
pub use error::*;
pub use ramp::*;
pub use stats::*;
pub use target::*;
pub use threshold::*;
