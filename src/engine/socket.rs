//! Socket-backed lease engine
//!
//! Runs the DHCPv4 state machine over a UDP socket bound to the interface:
//! - Drives the state machine with packets and timeouts
//! - Publishes the bound lease for queries
//! - Reports lease up/down and fatal errors as events

use super::{EventSender, LeaseEngine, LeaseEvent, LeaseSession};
use crate::{
    config::ClientConfig,
    error::EngineError,
    facts::{LeaseSnapshot, MAX_DNS_SERVERS},
    network,
    options::DhcpOptions,
    v4::DhcpV4Handler,
};
use bytes::Bytes;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{net::UdpSocket, runtime::Handle, task::JoinHandle, time};
use tracing::Instrument as _;

/// Actions the state machine asks the driver to perform.
#[derive(Debug)]
pub enum Action {
    /// Send a packet, then wait up to the given duration for a reply.
    Send(Vec<u8>, SocketAddr, Duration),
    /// Keep waiting for a reply.
    Wait(Duration),
    /// A lease was acknowledged.
    Bind(Lease),
}

/// External events the state machine reacts to.
#[derive(Debug)]
pub enum Event<'a> {
    PacketReceived(&'a [u8]),
    Timeout,
}

/// Lease parameters taken from a DHCP ACK.
#[derive(Debug, Clone)]
pub struct Lease {
    pub client_addr: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub routers: Vec<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub lease_duration: Duration,
    pub server_identifier: Option<Ipv4Addr>,
}

pub trait DhcpStateMachine {
    /// Handles one event and returns the next action for the driver.
    fn handle_event(&mut self, event: Event) -> Result<Action, EngineError>;
    /// Name of the current state, for logging.
    fn state_name(&self) -> &'static str;
}

type SharedLease = Arc<Mutex<Option<LeaseSnapshot>>>;

/// Lease engine talking DHCP over a UDP socket.
#[derive(Debug, Clone, Default)]
pub struct SocketEngine {
    config: ClientConfig,
}

impl SocketEngine {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl LeaseEngine for SocketEngine {
    type Session = SocketSession;

    fn start(
        &self,
        ifname: &str,
        options: &DhcpOptions,
        reactor: &Handle,
        rng: &mut dyn RngCore,
        events: EventSender,
    ) -> Result<SocketSession, EngineError> {
        let mac_address = network::read_mac_address(ifname)?;
        tracing::debug!("Using MAC address {}", crate::facts::format_mac(&mac_address));

        let socket = {
            let _guard = reactor.enter();
            network::open_client_socket(ifname, self.config.client_port)?
        };

        let handler = DhcpV4Handler::new(
            Bytes::copy_from_slice(&mac_address),
            options.clone(),
            StdRng::seed_from_u64(rng.next_u64()),
            &self.config,
        );

        Ok(Driver::spawn(socket, Box::new(handler), reactor, events))
    }
}

/// A running socket engine. Dropping it stops the engine.
///
/// The last bound lease stays visible until the next one replaces it, so a
/// query racing a `LeaseDown` still sees the lease that was just lost.
pub struct SocketSession {
    lease: SharedLease,
    task: JoinHandle<()>,
}

impl SocketSession {
    fn with_lease<T>(&self, f: impl FnOnce(&LeaseSnapshot) -> T, default: T) -> T {
        let guard = self.lease.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map_or(default, f)
    }
}

impl LeaseSession for SocketSession {
    fn client_address(&self) -> Ipv4Addr {
        self.with_lease(|l| l.client_addr, Ipv4Addr::UNSPECIFIED)
    }

    fn client_mask(&self) -> Ipv4Addr {
        self.with_lease(|l| l.client_mask, Ipv4Addr::UNSPECIFIED)
    }

    fn router(&self) -> Option<Ipv4Addr> {
        self.with_lease(|l| l.router, None)
    }

    fn dns_servers(&self, max: usize) -> Vec<Ipv4Addr> {
        self.with_lease(
            |l| l.dns_servers.iter().take(max).copied().collect(),
            Vec::new(),
        )
    }

    fn server_mac(&self) -> [u8; 6] {
        self.with_lease(|l| l.server_mac, [0; 6])
    }
}

impl Drop for SocketSession {
    fn drop(&mut self) {
        tracing::debug!("Stopping lease engine");
        self.task.abort();
    }
}

struct Driver {
    socket: UdpSocket,
    state_machine: Box<dyn DhcpStateMachine + Send>,
    lease: SharedLease,
    events: EventSender,
}

impl Driver {
    fn spawn(
        socket: UdpSocket,
        state_machine: Box<dyn DhcpStateMachine + Send>,
        reactor: &Handle,
        events: EventSender,
    ) -> SocketSession {
        let lease = SharedLease::default();
        let driver = Driver {
            socket,
            state_machine,
            lease: Arc::clone(&lease),
            events,
        };
        let task = reactor.spawn(driver.run().instrument(tracing::Span::current()));
        SocketSession { lease, task }
    }

    async fn run(mut self) {
        match self.drive().await {
            Ok(()) => tracing::debug!("Lease engine driver finished"),
            Err(e) => {
                tracing::error!("Lease engine failed: {}", e);
                let _ = self.events.send(LeaseEvent::Fatal);
            }
        }
    }

    /// Runs until the instance stops listening or an error occurs.
    async fn drive(&mut self) -> Result<(), EngineError> {
        let mut next_action = self.state_machine.handle_event(Event::Timeout)?;

        loop {
            tracing::debug!(
                "State: {}, Action: {:?}",
                self.state_machine.state_name(),
                next_action
            );

            next_action = match next_action {
                Action::Send(packet, addr, timeout) => {
                    self.socket.send_to(&packet, addr).await?;
                    self.wait_for_response(timeout).await?
                }
                Action::Wait(duration) => self.wait_for_response(duration).await?,
                Action::Bind(lease) => {
                    let lease_duration = lease.lease_duration;
                    let snapshot = Self::snapshot(lease).await;
                    tracing::info!(
                        "Bound to {}/{} for {:?}",
                        snapshot.client_addr,
                        snapshot.client_mask,
                        lease_duration
                    );

                    self.publish(snapshot);
                    if self.events.send(LeaseEvent::LeaseUp).is_err() {
                        return Ok(());
                    }

                    time::sleep(lease_duration).await;

                    tracing::warn!("Lease expired");
                    if self.events.send(LeaseEvent::LeaseDown).is_err() {
                        return Ok(());
                    }
                    self.state_machine.handle_event(Event::Timeout)?
                }
            };
        }
    }

    async fn wait_for_response(&mut self, duration: Duration) -> Result<Action, EngineError> {
        let mut buf = [0u8; 1500];
        tracing::trace!("Waiting for response with timeout: {:?}", duration);
        match time::timeout(duration, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, addr))) => {
                tracing::trace!("Received {} bytes from {}", len, addr);
                self.state_machine
                    .handle_event(Event::PacketReceived(&buf[..len]))
            }
            Ok(Err(e)) => Err(EngineError::Io(e)),
            Err(_) => {
                tracing::debug!("Timeout waiting for response");
                self.state_machine.handle_event(Event::Timeout)
            }
        }
    }

    async fn snapshot(lease: Lease) -> LeaseSnapshot {
        let server_mac = match lease.server_identifier {
            Some(server) => network::lookup_arp_entry(server).await,
            None => None,
        };
        if server_mac.is_none() {
            tracing::warn!("Server hardware address not in ARP cache, reporting 00:00:00:00:00:00");
        }

        let mut dns_servers = lease.dns_servers;
        dns_servers.truncate(MAX_DNS_SERVERS);

        LeaseSnapshot {
            client_addr: lease.client_addr,
            client_mask: lease.subnet_mask,
            router: lease.routers.first().copied(),
            dns_servers,
            server_mac: server_mac.unwrap_or([0; 6]),
        }
    }

    fn publish(&self, snapshot: LeaseSnapshot) {
        *self.lease.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }
}
