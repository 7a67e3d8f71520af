#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use workload_steal_agent_core as core;

pub mod admission;
mod args;
pub mod metrics;
pub mod notify;
pub mod watch;

pub use self::args::Args;
