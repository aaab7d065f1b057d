use crate::icmp::v4::{SocketType, Ttl};
use crate::{Destination, ProbeConfig, RunnerConfig, DEFAULT_NAMESPACE};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "/dev/shm/ping_exporter.sock";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no valid destination in '{0}'")]
    NoDestination(String),

    #[error("invalid value for --{option}: {message}")]
    InvalidOption { option: &'static str, message: String },
}

fn invalid(option: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidOption { option, message: message.into() }
}

#[derive(argh::FromArgs, Debug)]
/// ping-exporter - ping hosts periodically and expose latency and loss as metrics
pub struct Args {
    #[argh(option)]
    /// destinations to ping, IPv4 addresses and domain names separated by ','
    pub dest: String,

    #[argh(option, default = "5")]
    /// echo requests per destination and cycle
    pub count: u16,

    #[argh(option, default = "String::from(DEFAULT_LISTEN)")]
    /// where to serve metrics: <host>:<port> for TCP, anything else is a unix socket path
    pub listen: String,

    #[argh(option, default = "String::from(DEFAULT_METRICS_PATH)")]
    /// path under which to expose metrics
    pub metrics_path: String,

    #[argh(option, default = "String::from(DEFAULT_NAMESPACE)")]
    /// prefix of every metric name
    pub namespace: String,

    #[argh(option, default = "3000")]
    /// how long to wait for each reply, in milliseconds
    pub timeout_ms: u64,

    #[argh(option, default = "800")]
    /// pause between two echo requests to the same destination, in milliseconds
    pub interval_ms: u64,

    #[argh(option, default = "254")]
    /// time-to-live of outgoing echo requests
    pub ttl: u8,

    #[argh(option, default = "60")]
    /// seconds between two measurement cycles
    pub cycle_secs: u64,

    #[argh(option, default = "0")]
    /// maximum number of destinations probed at once, 0 for no limit
    pub max_concurrency: usize,

    #[argh(option, default = "SocketType::Raw")]
    /// socket kind, 'raw' (needs CAP_NET_RAW) or 'dgram'
    pub socket_type: SocketType,

    #[argh(option, default = "tracing::Level::INFO")]
    /// one of trace, debug, info, warn, error
    pub log_level: tracing::Level,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl ListenAddr {
    #[must_use]
    pub fn parse(s: &str) -> ListenAddr {
        match s.parse::<SocketAddr>() {
            Ok(addr) => ListenAddr::Tcp(addr),
            Err(_) => ListenAddr::Unix(PathBuf::from(s)),
        }
    }
}

impl std::fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "{addr}"),
            ListenAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Validated startup configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub destinations: Vec<Destination>,
    pub listen: ListenAddr,
    pub metrics_path: String,
    pub namespace: String,
    pub probe: ProbeConfig,
    pub runner: RunnerConfig,
    pub cycle_interval: Duration,
    pub max_concurrency: usize,
    pub socket_type: SocketType,
    pub log_level: tracing::Level,
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let destinations = parse_destinations(&args.dest)?;
        if args.count == 0 {
            return Err(invalid("count", "must be at least 1"));
        }
        if args.timeout_ms == 0 {
            return Err(invalid("timeout-ms", "must be at least 1"));
        }
        if args.ttl == 0 {
            return Err(invalid("ttl", "must be at least 1"));
        }
        if args.cycle_secs == 0 {
            return Err(invalid("cycle-secs", "must be at least 1"));
        }
        if !args.metrics_path.starts_with('/') || args.metrics_path.len() < 2 {
            return Err(invalid("metrics-path", format!("'{}' must start with '/' and not be '/'", args.metrics_path)));
        }
        if !is_static_route(&args.metrics_path) {
            return Err(invalid("metrics-path", format!("'{}' must not contain route parameters", args.metrics_path)));
        }
        if !is_metric_name(&args.namespace) {
            return Err(invalid("namespace", format!("'{}' is not a valid metric name", args.namespace)));
        }

        Ok(Config {
            destinations,
            listen: ListenAddr::parse(&args.listen),
            metrics_path: args.metrics_path,
            namespace: args.namespace,
            probe: ProbeConfig { timeout: Duration::from_millis(args.timeout_ms), ttl: Ttl(args.ttl) },
            runner: RunnerConfig { rounds: args.count, interval: Duration::from_millis(args.interval_ms) },
            cycle_interval: Duration::from_secs(args.cycle_secs),
            max_concurrency: args.max_concurrency,
            socket_type: args.socket_type,
            log_level: args.log_level,
        })
    }
}

/// Splits a ',' separated destination list. Entries that are neither an IPv4 address nor a
/// domain name are skipped; an empty result is an error.
pub fn parse_destinations(list: &str) -> Result<Vec<Destination>, ConfigError> {
    let mut destinations = vec![];
    for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        match Destination::parse(entry) {
            Some(destination) => destinations.push(destination),
            None => tracing::warn!("'{}' is neither an IPv4 address nor a domain name, ignored", entry),
        }
    }
    if destinations.is_empty() {
        return Err(ConfigError::NoDestination(list.to_owned()));
    }
    Ok(destinations)
}

// The router treats ':x', '*x' and '{x}' segments as parameters.
fn is_static_route(path: &str) -> bool {
    path.split('/').all(|segment| !segment.starts_with([':', '*']) && !segment.contains(['{', '}']))
}

fn is_metric_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
