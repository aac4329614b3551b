//! Netmask and prefix length conversion

use crate::error::{Error, Result};
use std::net::IpAddr;

/// Prefix length of a dotted IPv4 or colon-separated IPv6 netmask
///
/// Non-contiguous masks are rejected.
pub fn prefix_len(netmask: &str) -> Result<u8> {
    let invalid = || Error::InvalidNetmask(netmask.to_string());
    match netmask.parse::<IpAddr>().map_err(|_| invalid())? {
        IpAddr::V4(mask) => ipnet::ipv4_mask_to_prefix(mask).map_err(|_| invalid()),
        IpAddr::V6(mask) => ipnet::ipv6_mask_to_prefix(mask).map_err(|_| invalid()),
    }
}

/// IPv6 prefix length written as a plain integer
pub fn ipv6_prefix_len(value: &str) -> Result<u8> {
    match value.trim().parse::<u8>() {
        Ok(len) if len <= 128 => Ok(len),
        _ => Err(Error::InvalidPrefixLength(value.to_string())),
    }
}

/// `address/prefix` for an interface address with a separate netmask
///
/// IPv6 addresses carry the prefix length itself in `netmask`.
pub fn cidr(address: &str, netmask: &str) -> Result<String> {
    let prefix = if address.contains(':') {
        ipv6_prefix_len(netmask)?
    } else {
        prefix_len(netmask)?
    };
    Ok(format!("{}/{}", address, prefix))
}
