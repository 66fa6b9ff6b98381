use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::SkeinError;

/// An IP address with a prefix length, e.g. `172.16.0.1/32` or `fd00::/48`.
///
/// The address is kept as written: `10.0.0.1/24` and `10.0.0.0/24` are
/// distinct values, which keeps equality exact when prefixes are compared
/// for de-duplication.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix {
    addr: IpAddr,
    bits: u8,
}

impl Prefix {
    pub fn new(addr: IpAddr, bits: u8) -> Result<Self, SkeinError> {
        let max = max_bits(&addr);
        if bits > max {
            return Err(SkeinError::InvalidArgument(format!(
                "prefix length {bits} exceeds {max} for {addr}"
            )));
        }
        Ok(Prefix { addr, bits })
    }

    /// Like [`Prefix::new`], with the length capped at the address width.
    pub fn saturating(addr: IpAddr, bits: u8) -> Self {
        Prefix { addr, bits: bits.min(max_bits(&addr)) }
    }

    /// Single-address prefix (`/32` or `/128`).
    pub fn host(addr: IpAddr) -> Self {
        Prefix { addr, bits: max_bits(&addr) }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    /// Whether `ip` falls inside this prefix. Addresses of the other family
    /// never match.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.bits == 0 { 0 } else { u32::MAX << (32 - self.bits) };
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.bits == 0 { 0 } else { u128::MAX << (128 - self.bits) };
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }
}

fn max_bits(addr: &IpAddr) -> u8 {
    if addr.is_ipv4() {
        32
    } else {
        128
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.bits)
    }
}

impl FromStr for Prefix {
    type Err = SkeinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, bits) = s
            .split_once('/')
            .ok_or_else(|| SkeinError::InvalidArgument(format!("{s:?} is not a CIDR prefix")))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| SkeinError::InvalidArgument(format!("invalid address in {s:?}")))?;
        let bits: u8 = bits
            .parse()
            .map_err(|_| SkeinError::InvalidArgument(format!("invalid prefix length in {s:?}")))?;
        Prefix::new(addr, bits)
    }
}

impl TryFrom<String> for Prefix {
    type Error = SkeinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Prefix> for String {
    fn from(p: Prefix) -> Self {
        p.to_string()
    }
}
