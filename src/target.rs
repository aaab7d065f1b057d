use crate::PingError;
use std::fmt;
use std::net::Ipv4Addr;

/// One configured entry of the destination list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Destination {
    Literal(Ipv4Addr),
    Domain(String),
}

impl Destination {
    /// Parses one entry: an IPv4 literal or a domain name. Anything else is `None`.
    #[must_use]
    pub fn parse(entry: &str) -> Option<Destination> {
        let entry = entry.trim();
        if let Ok(ip) = entry.parse::<Ipv4Addr>() {
            return Some(Destination::Literal(ip));
        }
        if is_domain_name(entry) {
            return Some(Destination::Domain(entry.to_owned()));
        }
        None
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Destination::Literal(ip) => ip.to_string(),
            Destination::Domain(name) => name.clone(),
        }
    }
}

// Labels of letters, digits and inner hyphens, 63 characters each at most. A single label
// such as 'localhost' is a plain host name.
fn is_domain_name(s: &str) -> bool {
    let s = s.strip_suffix('.').unwrap_or(s);
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = s.split('.').collect();
    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
        // an all-numeric name is a mistyped address, not a host
        && !labels.iter().all(|label| label.chars().all(|c| c.is_ascii_digit()))
}

/// Identity of one published result: the configured name and one address it resolved to.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct TargetId {
    pub name: String,
    pub addr: Ipv4Addr,
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.addr)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Target {
    pub original_name: String,
    pub is_literal_address: bool,
    pub resolved_address: Ipv4Addr,
}

impl Target {
    #[must_use]
    pub fn literal(ip: Ipv4Addr) -> Self {
        Target { original_name: ip.to_string(), is_literal_address: true, resolved_address: ip }
    }

    #[must_use]
    pub fn resolved(name: &str, ip: Ipv4Addr) -> Self {
        Target { original_name: name.to_owned(), is_literal_address: false, resolved_address: ip }
    }

    #[must_use]
    pub fn id(&self) -> TargetId {
        TargetId { name: self.original_name.clone(), addr: self.resolved_address }
    }
}

/// Name resolution for domain destinations.
pub trait Resolve: Send + Sync {
    /// All IPv4 addresses of `name`, in resolver order.
    fn resolve(&self, name: &str) -> Result<Vec<Ipv4Addr>, PingError>;
}

/// Expands destinations into targets in declaration order.
///
/// A domain that fails to resolve, or resolves to nothing, is left out.
pub fn resolve_destinations<R>(destinations: &[Destination], resolver: &R) -> Vec<Target>
where
    R: Resolve + ?Sized,
{
    let mut targets = Vec::with_capacity(destinations.len());
    for destination in destinations {
        match destination {
            Destination::Literal(ip) => targets.push(Target::literal(*ip)),
            Destination::Domain(name) => match resolver.resolve(name) {
                Ok(ips) if ips.is_empty() => tracing::warn!("{} resolved to no IPv4 address, skipped", name),
                Ok(ips) => targets.extend(ips.into_iter().map(|ip| Target::resolved(name, ip))),
                Err(e) => tracing::warn!("{}, skipped", e),
            },
        }
    }
    targets
}
