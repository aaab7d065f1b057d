use crate::{PingError, Resolve};
use std::net::{IpAddr, Ipv4Addr};

/// Resolves through the system resolver (`getaddrinfo`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, name: &str) -> Result<Vec<Ipv4Addr>, PingError> {
        let ips: Vec<IpAddr> = dns_lookup::lookup_host(name)
            .map_err(|e| PingError::Resolution { name: name.to_owned(), message: e.to_string() })?;
        Ok(ipv4_only(ips))
    }
}

// getaddrinfo reports one entry per socket type, so the same address shows up repeatedly.
fn ipv4_only(ips: Vec<IpAddr>) -> Vec<Ipv4Addr> {
    let mut result: Vec<Ipv4Addr> = Vec::with_capacity(ips.len());
    for ip in ips {
        if let IpAddr::V4(ipv4) = ip {
            if !result.contains(&ipv4) {
                result.push(ipv4);
            }
        }
    }
    result
}
