//! Network address parsing and formatting.
//!
//! Addresses take the form `scheme://host:port` or `host:port`. The host may
//! be an IPv4 literal, a bracketed (or trailing-segment) IPv6 literal, or a
//! DNS name. Canonical strings are produced by [`AddressInfo::to_string`]
//! after the host has been resolved; the peer index is keyed by them, so
//! two addresses are the same peer iff scheme, resolved host, and port all
//! match.

use std::fmt;

use crate::error::NetError;

/// A parsed network address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressInfo {
    /// URL scheme; empty when the address was given as bare `host:port`.
    pub scheme: String,
    /// Host part: IP literal or DNS name, without brackets.
    pub host: String,
    /// Port in 1..=65535.
    pub port: u16,
}

impl AddressInfo {
    /// Creates a new address info.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Returns `host:port` without the scheme, bracketing IPv6 hosts.
    pub fn raw(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

impl fmt::Display for AddressInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme.is_empty() {
            write!(f, "{}", self.raw())
        } else {
            write!(f, "{}://{}", self.scheme, self.raw())
        }
    }
}

/// Formats an address from its parts.
pub fn format_address(scheme: &str, host: &str, port: u16) -> String {
    AddressInfo::new(scheme, host, port).to_string()
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn split_host_port(s: &str) -> Option<(&str, &str)> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        Some((host, port))
    } else {
        s.rsplit_once(':')
    }
}

/// Parses an address into scheme, host, and port.
///
/// Surrounding whitespace is ignored. Fails on empty input, a missing or
/// zero port, or an empty host.
pub fn parse_address(address: &str) -> Result<AddressInfo, NetError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(NetError::InvalidAddress("address was empty".to_string()));
    }

    let (scheme, rest) = match address.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("", address),
    };

    let (host, raw_port) = split_host_port(rest)
        .ok_or_else(|| NetError::InvalidAddress(format!("missing port in {address}")))?;
    if host.is_empty() {
        return Err(NetError::InvalidAddress(format!("missing host in {address}")));
    }

    let port: u16 = raw_port
        .parse()
        .map_err(|_| NetError::InvalidAddress(format!("bad port in {address}")))?;
    if port == 0 {
        return Err(NetError::InvalidAddress(format!("bad port in {address}")));
    }

    Ok(AddressInfo::new(scheme, host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_scheme() {
        let info = parse_address("quic://127.0.0.1:4242").unwrap();
        assert_eq!(info, AddressInfo::new("quic", "127.0.0.1", 4242));
        assert_eq!(info.to_string(), "quic://127.0.0.1:4242");
    }

    #[test]
    fn test_parse_without_scheme() {
        let info = parse_address("example.com:80").unwrap();
        assert_eq!(info, AddressInfo::new("", "example.com", 80));
        assert_eq!(info.to_string(), "example.com:80");
        assert_eq!(info.raw(), "example.com:80");
    }

    #[test]
    fn test_parse_ipv6_bracketed() {
        let info = parse_address("quic://[::1]:9000").unwrap();
        assert_eq!(info.host, "::1");
        assert_eq!(info.port, 9000);
        assert_eq!(info.to_string(), "quic://[::1]:9000");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let info = parse_address("  quic://10.0.0.1:1\n").unwrap();
        assert_eq!(info.port, 1);
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            parse_address("   "),
            Err(NetError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_rejects_missing_port() {
        assert!(parse_address("quic://127.0.0.1").is_err());
        assert!(parse_address("[::1]").is_err());
    }

    #[test]
    fn test_rejects_zero_and_overflow_port() {
        assert!(parse_address("127.0.0.1:0").is_err());
        assert!(parse_address("127.0.0.1:70000").is_err());
        assert!(parse_address("127.0.0.1:x").is_err());
    }

    #[test]
    fn test_rejects_missing_host() {
        assert!(parse_address(":4242").is_err());
    }

    #[test]
    fn test_format_address() {
        assert_eq!(format_address("quic", "::1", 1), "quic://[::1]:1");
        assert_eq!(format_address("", "10.0.0.1", 5), "10.0.0.1:5");
    }
}
