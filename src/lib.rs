#![warn(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub use config::{Args, Config, ConfigError, ListenAddr};
pub use dns::SystemResolver;
pub use ping_error::{GenericError, PingError, PingResult};
pub use ping_stat::{PingStat, PingStatAccumulator};
pub use probe_runner::{Probe, ProbeRunner, RunnerConfig};
pub use probe_session::{IcmpProber, ProbeConfig, ProbeOutcome, ProbeSession, SessionState};
pub use publisher::{render_metrics, ResultPublisher, DEFAULT_NAMESPACE};
pub use result_set::ResultSet;
pub use sweep::SweepCoordinator;
pub use target::{resolve_destinations, Destination, Resolve, Target, TargetId};

pub mod config;
mod dns;
pub mod icmp;
mod ping_error;
mod ping_stat;
mod probe_runner;
mod probe_session;
mod publisher;
mod result_set;
mod sweep;
mod target;
