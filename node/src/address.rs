// Copyright (C) 2024-2025 The spectre-crawler authors.
// This file is part of the spectre-crawler library.

// The spectre-crawler library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The spectre-crawler library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the spectre-crawler library. If not, see <https://www.gnu.org/licenses/>.

use spectre_crawler_protowire::NetAddress;

use std::{
    fmt,
    net::{IpAddr, Ipv6Addr},
};
use thiserror::Error;

/// The default p2p port appended to seed addresses given without one.
pub const DEFAULT_PORT: u16 = 18111;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("malformed address '{0}'")]
    Malformed(String),
    #[error("invalid port in '{0}'")]
    InvalidPort(String),
}

#[derive(Debug, Error)]
pub enum WireAddressError {
    /// Raw ip bytes that parse as neither IPv4 nor IPv6; the frontier bans
    /// such hosts from further parsing attempts.
    #[error("un-parseable ip bytes {}", hex::encode(.0))]
    BadIp(Vec<u8>),
    #[error("port {0} out of range")]
    BadPort(u32),
}

/// The canonical identifier of a peer: `host:port`, or `ipv6:[addr]:port` for
/// IPv6 hosts. Equality and hashing operate on the canonical form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    host: String,
    port: u16,
    ipv6: bool,
}

/// One entry of a peer's known-addresses table, kept raw so a session can
/// deduplicate repeated replies before any parsing happens.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WireAddress {
    pub timestamp: i64,
    pub ip: Vec<u8>,
    pub port: u32,
}

impl From<&NetAddress> for WireAddress {
    fn from(address: &NetAddress) -> Self {
        Self { timestamp: address.timestamp, ip: address.ip.clone(), port: address.port }
    }
}

impl Address {
    /// Creates an address from a literal IP; IPv6 hosts are stored in the
    /// compressed lowercase textual form.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { host: ip.to_string(), port, ipv6: ip.is_ipv6() }
    }

    /// Parses a seed given as `host[:port]`, where `host` may be a hostname,
    /// an IPv4 literal, or an IPv6 literal (bracketed or `ipv6:`-prefixed).
    pub fn parse_seed(seed: &str, default_port: u16) -> Result<Self, AddressError> {
        let trimmed = seed.trim();
        let stripped = trimmed.strip_prefix("ipv6:").unwrap_or(trimmed);

        // A bracketed IPv6 literal, with or without a port.
        if let Some(rest) = stripped.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| AddressError::Malformed(seed.into()))?;
            let ip: Ipv6Addr = host.parse().map_err(|_| AddressError::Malformed(seed.into()))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port).ok_or_else(|| AddressError::InvalidPort(seed.into()))?,
                None if tail.is_empty() => default_port,
                None => return Err(AddressError::Malformed(seed.into())),
            };
            return Ok(Self::new(IpAddr::V6(ip), port));
        }

        // A bare IPv6 literal.
        if let Ok(ip) = stripped.parse::<Ipv6Addr>() {
            return Ok(Self::new(IpAddr::V6(ip), default_port));
        }

        let (host, port) = match stripped.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port).ok_or_else(|| AddressError::InvalidPort(seed.into()))?),
            None => (stripped, default_port),
        };
        if host.is_empty() {
            return Err(AddressError::Malformed(seed.into()));
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => Ok(Self::new(ip, port)),
            Err(_) => Ok(Self { host: host.to_ascii_lowercase(), port, ipv6: false }),
        }
    }

    /// Converts raw wire bytes into a canonical address. The ip bytes must be
    /// 4 or 16 octets in network order and the port must fit 1..=65535.
    pub fn from_wire(ip: &[u8], port: u32) -> Result<Self, WireAddressError> {
        let ip: IpAddr = match ip.len() {
            4 => <[u8; 4]>::try_from(ip).map_err(|_| WireAddressError::BadIp(ip.to_vec()))?.into(),
            16 => <[u8; 16]>::try_from(ip).map_err(|_| WireAddressError::BadIp(ip.to_vec()))?.into(),
            _ => return Err(WireAddressError::BadIp(ip.to_vec())),
        };
        match u16::try_from(port) {
            Ok(port) if port != 0 => Ok(Self::new(ip, port)),
            _ => Err(WireAddressError::BadPort(port)),
        }
    }

    /// Returns `false` for hosts that can't be part of the public overlay:
    /// private, loopback, link-local, and unspecified IPs. Hostnames are
    /// presumed routable.
    pub fn is_routable(&self) -> bool {
        match self.host.parse::<IpAddr>() {
            Ok(ip) => is_routable_ip(&ip),
            Err(_) => true,
        }
    }

    /// The host with no brackets or `ipv6:` prefix, as expected by the
    /// geolocation API.
    pub fn geo_host(&self) -> &str {
        &self.host
    }

    /// The URI the gRPC channel dials.
    pub fn endpoint_uri(&self) -> String {
        match self.ipv6 {
            true => format!("http://[{}]:{}", self.host, self.port),
            false => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ipv6 {
            true => write!(f, "ipv6:[{}]:{}", self.host, self.port),
            false => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

fn parse_port(port: &str) -> Option<u16> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

fn is_routable_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => !(ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified()),
        IpAddr::V6(ip) => {
            let unique_local = (ip.segments()[0] & 0xfe00) == 0xfc00;
            let link_local = (ip.segments()[0] & 0xffc0) == 0xfe80;
            !(ip.is_loopback() || ip.is_unspecified() || unique_local || link_local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_parsing() {
        let seed = Address::parse_seed("n-mainnet.spectre.ws", DEFAULT_PORT).unwrap();
        assert_eq!(seed.to_string(), "n-mainnet.spectre.ws:18111");

        let seed = Address::parse_seed("203.0.113.5:16111", DEFAULT_PORT).unwrap();
        assert_eq!(seed.to_string(), "203.0.113.5:16111");

        let seed = Address::parse_seed("ipv6:[2001:db8::1]:16111", DEFAULT_PORT).unwrap();
        assert_eq!(seed.to_string(), "ipv6:[2001:db8::1]:16111");

        let seed = Address::parse_seed("[2001:db8::1]", DEFAULT_PORT).unwrap();
        assert_eq!(seed.to_string(), "ipv6:[2001:db8::1]:18111");

        let seed = Address::parse_seed("2001:db8::1", DEFAULT_PORT).unwrap();
        assert_eq!(seed.to_string(), "ipv6:[2001:db8::1]:18111");

        // Hostnames are canonicalized to lowercase.
        let seed = Address::parse_seed("N-Mainnet.Spectre.WS:18111", DEFAULT_PORT).unwrap();
        assert_eq!(seed.to_string(), "n-mainnet.spectre.ws:18111");

        assert!(Address::parse_seed("", DEFAULT_PORT).is_err());
        assert!(Address::parse_seed("host:0", DEFAULT_PORT).is_err());
        assert!(Address::parse_seed("host:notaport", DEFAULT_PORT).is_err());
        assert!(Address::parse_seed("[2001:db8::1", DEFAULT_PORT).is_err());
    }

    #[test]
    fn wire_conversion() {
        let address = Address::from_wire(&[203, 0, 113, 5], 18111).unwrap();
        assert_eq!(address.to_string(), "203.0.113.5:18111");
        assert_eq!(address.endpoint_uri(), "http://203.0.113.5:18111");

        let mut bytes = [0u8; 16];
        bytes[0] = 0x20;
        bytes[1] = 0x01;
        bytes[15] = 0x01;
        let address = Address::from_wire(&bytes, 18111).unwrap();
        assert_eq!(address.to_string(), "ipv6:[2001::1]:18111");
        assert_eq!(address.endpoint_uri(), "http://[2001::1]:18111");
        assert_eq!(address.geo_host(), "2001::1");

        assert!(matches!(Address::from_wire(&[1, 2, 3], 18111), Err(WireAddressError::BadIp(_))));
        assert!(matches!(Address::from_wire(&[1; 5], 18111), Err(WireAddressError::BadIp(_))));
        assert!(matches!(Address::from_wire(&[203, 0, 113, 5], 0), Err(WireAddressError::BadPort(0))));
        assert!(matches!(Address::from_wire(&[203, 0, 113, 5], 65536), Err(WireAddressError::BadPort(65536))));
    }

    #[test]
    fn routability() {
        let routable = |host: &str| Address::new(host.parse().unwrap(), 18111).is_routable();

        assert!(routable("203.0.113.5"));
        assert!(routable("2001::1"));
        assert!(!routable("10.0.0.2"));
        assert!(!routable("127.0.0.1"));
        assert!(!routable("192.168.1.1"));
        assert!(!routable("169.254.0.1"));
        assert!(!routable("0.0.0.0"));
        assert!(!routable("::1"));
        assert!(!routable("fe80::1"));
        assert!(!routable("fc00::1"));

        // Hostnames can't be classified and pass through.
        assert!(Address::parse_seed("n-mainnet.spectre.ws", DEFAULT_PORT).unwrap().is_routable());
    }

    #[test]
    fn equality_is_canonical() {
        let a = Address::parse_seed("203.0.113.5:18111", DEFAULT_PORT).unwrap();
        let b = Address::from_wire(&[203, 0, 113, 5], 18111).unwrap();
        assert_eq!(a, b);
    }
}
