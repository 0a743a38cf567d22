//! Lease-derived variables.
//!
//! Every variable is a pure function of a [`LeaseSnapshot`]. Snapshots are
//! taken fresh from the session for each lookup and never stored.

use crate::{engine::LeaseSession, error::BridgeError};
use std::{fmt::Write as _, net::Ipv4Addr, str::FromStr};

/// Upper bound on the DNS servers reported for one lease.
pub const MAX_DNS_SERVERS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSnapshot {
    pub client_addr: Ipv4Addr,
    pub client_mask: Ipv4Addr,
    pub router: Option<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub server_mac: [u8; 6],
}

impl LeaseSnapshot {
    pub fn capture<S: LeaseSession + ?Sized>(session: &S) -> Self {
        let mut dns_servers = session.dns_servers(MAX_DNS_SERVERS);
        dns_servers.truncate(MAX_DNS_SERVERS);

        Self {
            client_addr: session.client_address(),
            client_mask: session.client_mask(),
            router: session.router(),
            dns_servers,
            server_mac: session.server_mac(),
        }
    }
}

/// The variables an instance exposes while up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fact {
    Addr,
    Prefix,
    CidrAddr,
    Gateway,
    DnsServers,
    ServerMac,
}

impl Fact {
    pub const ALL: [Fact; 6] = [
        Fact::Addr,
        Fact::Prefix,
        Fact::CidrAddr,
        Fact::Gateway,
        Fact::DnsServers,
        Fact::ServerMac,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Fact::Addr => "addr",
            Fact::Prefix => "prefix",
            Fact::CidrAddr => "cidr_addr",
            Fact::Gateway => "gateway",
            Fact::DnsServers => "dns_servers",
            Fact::ServerMac => "server_mac",
        }
    }
}

impl FromStr for Fact {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Fact::ALL
            .into_iter()
            .find(|fact| fact.name() == name)
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    String(String),
    List(Vec<String>),
}

/// Computes the prefix length of a contiguous netmask.
pub fn prefix_from_mask(mask: Ipv4Addr) -> Result<u8, BridgeError> {
    let bits = u32::from(mask);
    let prefix = bits.leading_ones();
    // Anything left after the leading ones means the mask has holes.
    if bits.checked_shl(prefix).unwrap_or(0) != 0 {
        return Err(BridgeError::InvalidMask(mask));
    }
    Ok(prefix as u8)
}

/// Formats a hardware address as `AB:CD:EF:01:02:03`.
pub fn format_mac(mac: &[u8; 6]) -> String {
    let mut out = String::with_capacity(17);
    for (i, byte) in mac.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

pub fn derive(fact: Fact, lease: &LeaseSnapshot) -> Result<Variable, BridgeError> {
    let value = match fact {
        Fact::Addr => lease.client_addr.to_string(),
        Fact::Prefix => prefix_from_mask(lease.client_mask)?.to_string(),
        Fact::CidrAddr => {
            let prefix = prefix_from_mask(lease.client_mask)?;
            format!("{}/{}", lease.client_addr, prefix)
        }
        Fact::Gateway => match lease.router {
            Some(router) => router.to_string(),
            None => "none".to_string(),
        },
        Fact::DnsServers => {
            return Ok(Variable::List(
                lease.dns_servers.iter().map(Ipv4Addr::to_string).collect(),
            ))
        }
        Fact::ServerMac => format_mac(&lease.server_mac),
    };
    Ok(Variable::String(value))
}
