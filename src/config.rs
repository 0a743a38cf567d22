use crate::value::Value;
use clap::Parser;
use std::{net::Ipv4Addr, time::Duration};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to run the DHCP client on (e.g., 'eth0')
    #[arg(short, long)]
    pub interface: String,

    /// Hostname to send to the DHCP server
    #[arg(long)]
    pub hostname: Option<String>,

    /// Vendor class identifier to send to the DHCP server
    #[arg(long)]
    pub vendorclassid: Option<String>,

    /// Send a client identifier generated from the interface MAC address
    #[arg(long)]
    pub auto_clientid: bool,
}

impl Args {
    /// Builds the `(ifname, opts)` argument list an instance is created from.
    pub fn to_values(&self) -> Vec<Value> {
        let mut opts = Vec::new();
        if let Some(hostname) = &self.hostname {
            opts.push(Value::from("hostname"));
            opts.push(Value::from(hostname.as_str()));
        }
        if let Some(vendorclassid) = &self.vendorclassid {
            opts.push(Value::from("vendorclassid"));
            opts.push(Value::from(vendorclassid.as_str()));
        }
        if self.auto_clientid {
            opts.push(Value::from("auto_clientid"));
        }

        vec![Value::from(self.interface.as_str()), Value::List(opts)]
    }
}

/// Tunables of the socket-backed lease engine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_port: u16,
    pub server_port: u16,
    pub broadcast_address: Ipv4Addr,
    /// How long to wait for an OFFER before retransmitting DISCOVER.
    pub initial_timeout: Duration,
    /// How long to wait for an ACK before retransmitting REQUEST.
    pub request_timeout: Duration,
    /// REQUEST retransmissions before falling back to discovery.
    pub request_attempts: u32,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            client_port: 68,
            server_port: 67,
            broadcast_address: Ipv4Addr::BROADCAST,
            initial_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            request_attempts: 3,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
