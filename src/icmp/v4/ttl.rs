type TtlInnerType = u8;

/// Time-to-live of an outgoing IPv4 packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Ttl(pub TtlInnerType);

impl Ttl {
    /// Hop limit used when none is configured.
    pub const DEFAULT: Ttl = Ttl(254);
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<TtlInnerType> for Ttl {
    fn from(integer: TtlInnerType) -> Self {
        Ttl(integer)
    }
}

impl From<Ttl> for TtlInnerType {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl From<Ttl> for u32 {
    fn from(ttl: Ttl) -> Self {
        u32::from(ttl.0)
    }
}

impl std::fmt::Display for Ttl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
