//! DHCPv4 state machine implementation
//!
//! This module implements the DHCPv4 client state machine that handles
//! the DORA (Discover, Offer, Request, Acknowledge) exchange and restarts
//! discovery when a lease runs out.

use super::message::{build_dhcp_discover, build_dhcp_request};
use crate::{
    config::ClientConfig,
    engine::socket::{Action, DhcpStateMachine, Event, Lease},
    error::EngineError,
    options::DhcpOptions,
};
use bytes::Bytes;
use dhcproto::{v4, Decodable};
use rand::{rngs::StdRng, Rng as _};
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

/// Shortest lease the client will hold. Shorter lease times are raised to this.
pub const MIN_LEASE_TIME: Duration = Duration::from_secs(60);

#[derive(Debug, PartialEq, Clone, Copy)]
enum DhcpV4State {
    Init,
    Selecting,
    Requesting,
    Bound,
}

/// The parts of an OFFER needed to request it.
#[derive(Debug, Clone, Copy)]
struct Offer {
    offered_ip: Ipv4Addr,
    server_id: Ipv4Addr,
}

pub struct DhcpV4Handler {
    state: DhcpV4State,
    mac_address: Bytes,
    options: DhcpOptions,
    rng: StdRng,
    xid: u32,
    offer: Option<Offer>,
    request_attempts: u32,
    server_addr: SocketAddr,
    initial_timeout: Duration,
    request_timeout: Duration,
    max_request_attempts: u32,
}

impl DhcpV4Handler {
    pub fn new(
        mac_address: Bytes,
        options: DhcpOptions,
        mut rng: StdRng,
        config: &ClientConfig,
    ) -> Self {
        let xid = rng.random();
        Self {
            state: DhcpV4State::Init,
            mac_address,
            options,
            rng,
            xid,
            offer: None,
            request_attempts: 0,
            server_addr: SocketAddrV4::new(config.broadcast_address, config.server_port).into(),
            initial_timeout: config.initial_timeout,
            request_timeout: config.request_timeout,
            max_request_attempts: config.request_attempts,
        }
    }

    fn restart(&mut self) -> Result<Action, EngineError> {
        self.offer = None;
        self.request_attempts = 0;
        self.xid = self.rng.random();
        self.handle_init()
    }

    fn handle_init(&mut self) -> Result<Action, EngineError> {
        self.state = DhcpV4State::Selecting;
        let discover_packet = build_dhcp_discover(&self.mac_address, self.xid, &self.options)?;
        Ok(Action::Send(
            discover_packet,
            self.server_addr,
            self.initial_timeout,
        ))
    }

    /// Decodes a reply addressed to our transaction, or returns `None`.
    fn decode_reply(&self, data: &[u8]) -> Option<(v4::Message, v4::MessageType)> {
        let msg = match v4::Message::decode(&mut v4::Decoder::new(data)) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Ignoring undecodable packet: {}", e);
                return None;
            }
        };

        if msg.xid() != self.xid {
            tracing::debug!("XID mismatch ({:x} != {:x}), ignoring packet", msg.xid(), self.xid);
            return None;
        }

        match msg.opts().get(v4::OptionCode::MessageType) {
            Some(v4::DhcpOption::MessageType(msg_type)) => {
                let msg_type = *msg_type;
                Some((msg, msg_type))
            }
            _ => {
                tracing::debug!("No message type option found");
                None
            }
        }
    }

    fn handle_selecting(&mut self, event: Event) -> Result<Action, EngineError> {
        match event {
            Event::PacketReceived(data) => {
                let Some((msg, v4::MessageType::Offer)) = self.decode_reply(data) else {
                    return Ok(Action::Wait(self.initial_timeout));
                };

                let Some(server_id) = server_identifier(&msg) else {
                    tracing::warn!("Ignoring OFFER without server identifier");
                    return Ok(Action::Wait(self.initial_timeout));
                };

                tracing::info!(
                    "Received DHCP OFFER of {} from server {}",
                    msg.yiaddr(),
                    server_id
                );
                self.offer = Some(Offer {
                    offered_ip: msg.yiaddr(),
                    server_id,
                });
                self.state = DhcpV4State::Requesting;
                self.request_attempts = 0;
                self.send_request()
            }
            Event::Timeout => {
                tracing::debug!("No OFFER received, retrying discovery");
                self.handle_init()
            }
        }
    }

    fn send_request(&mut self) -> Result<Action, EngineError> {
        let Some(offer) = self.offer else {
            tracing::warn!("No offer to request, restarting discovery");
            return self.restart();
        };

        self.request_attempts += 1;
        let request_packet = build_dhcp_request(
            &self.mac_address,
            self.xid,
            offer.offered_ip,
            offer.server_id,
            &self.options,
        )?;
        Ok(Action::Send(
            request_packet,
            self.server_addr,
            self.request_timeout,
        ))
    }

    fn handle_requesting(&mut self, event: Event) -> Result<Action, EngineError> {
        match event {
            Event::PacketReceived(data) => match self.decode_reply(data) {
                Some((msg, v4::MessageType::Ack)) => match extract_lease(&msg) {
                    Some(lease) => {
                        self.state = DhcpV4State::Bound;
                        Ok(Action::Bind(lease))
                    }
                    None => Ok(Action::Wait(self.request_timeout)),
                },
                Some((_, v4::MessageType::Nak)) => {
                    tracing::warn!("Received DHCP NAK, restarting discovery");
                    self.restart()
                }
                _ => Ok(Action::Wait(self.request_timeout)),
            },
            Event::Timeout if self.request_attempts < self.max_request_attempts => {
                tracing::debug!("Timeout waiting for DHCP ACK, retrying request");
                self.send_request()
            }
            Event::Timeout => {
                tracing::warn!("No ACK after {} requests, restarting discovery", self.request_attempts);
                self.restart()
            }
        }
    }
}

fn server_identifier(msg: &v4::Message) -> Option<Ipv4Addr> {
    match msg.opts().get(v4::OptionCode::ServerIdentifier) {
        Some(v4::DhcpOption::ServerIdentifier(ip)) => Some(*ip),
        _ => None,
    }
}

/// Pulls the lease out of an ACK. An ACK without a subnet mask or lease time
/// is not usable.
fn extract_lease(msg: &v4::Message) -> Option<Lease> {
    let subnet_mask = match msg.opts().get(v4::OptionCode::SubnetMask) {
        Some(v4::DhcpOption::SubnetMask(mask)) => *mask,
        _ => {
            tracing::warn!("Ignoring ACK without subnet mask");
            return None;
        }
    };

    let lease_duration = match msg.opts().get(v4::OptionCode::AddressLeaseTime) {
        Some(v4::DhcpOption::AddressLeaseTime(secs)) => {
            let offered = Duration::from_secs(u64::from(*secs));
            if offered < MIN_LEASE_TIME {
                tracing::warn!(
                    "Server offered a {:?} lease, holding it for {:?}",
                    offered,
                    MIN_LEASE_TIME
                );
            }
            offered.max(MIN_LEASE_TIME)
        }
        _ => {
            tracing::warn!("Ignoring ACK without lease time");
            return None;
        }
    };

    let routers = match msg.opts().get(v4::OptionCode::Router) {
        Some(v4::DhcpOption::Router(routers)) => routers.clone(),
        _ => Vec::new(),
    };

    let dns_servers = match msg.opts().get(v4::OptionCode::DomainNameServer) {
        Some(v4::DhcpOption::DomainNameServer(dns)) => dns.clone(),
        _ => Vec::new(),
    };

    Some(Lease {
        client_addr: msg.yiaddr(),
        subnet_mask,
        routers,
        dns_servers,
        lease_duration,
        server_identifier: server_identifier(msg),
    })
}

impl DhcpStateMachine for DhcpV4Handler {
    fn state_name(&self) -> &'static str {
        match self.state {
            DhcpV4State::Init => "Init",
            DhcpV4State::Selecting => "Selecting",
            DhcpV4State::Requesting => "Requesting",
            DhcpV4State::Bound => "Bound",
        }
    }

    fn handle_event(&mut self, event: Event) -> Result<Action, EngineError> {
        tracing::trace!("Handling event {:?} in state {:?}", event, self.state);
        match self.state {
            DhcpV4State::Init => self.handle_init(),
            DhcpV4State::Selecting => self.handle_selecting(event),
            DhcpV4State::Requesting => self.handle_requesting(event),
            // Leaving Bound means the lease is gone.
            DhcpV4State::Bound => self.restart(),
        }
    }
}
