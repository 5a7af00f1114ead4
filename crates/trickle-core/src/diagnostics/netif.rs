//! Local network identity
//!
//! Finds the address other machines on the LAN can use to reach this
//! process, for printing clickable startup URLs.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{error, warn};

/// One address assigned to a network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub addr: IpAddr,
    pub loopback: bool,
}

/// First IPv4 address that does not belong to a loopback interface
pub fn first_external_ipv4(interfaces: &[Interface]) -> Option<Ipv4Addr> {
    interfaces.iter().find_map(|iface| match iface.addr {
        IpAddr::V4(v4) if !iface.loopback && !v4.is_loopback() => Some(v4),
        _ => None,
    })
}

/// Resolve the host's LAN IPv4 address
///
/// Never fails: problems are logged and reported as `None`, and callers fall
/// back to a placeholder host.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let interfaces = match interfaces() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            error!(error = %e, "failed to enumerate network interfaces");
            return None;
        }
    };

    if interfaces.is_empty() {
        warn!("no network interfaces found");
        return None;
    }

    let found = first_external_ipv4(&interfaces);
    if found.is_none() {
        warn!(interfaces = interfaces.len(), "no non-loopback IPv4 address found");
    }
    found
}

/// Addresses of every interface, in the order the OS reports them
pub fn interfaces() -> io::Result<Vec<Interface>> {
    Ok(if_addrs::get_if_addrs()?
        .into_iter()
        .map(|iface| Interface {
            addr: iface.ip(),
            loopback: iface.is_loopback(),
            name: iface.name,
        })
        .collect())
}
