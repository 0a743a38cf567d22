//! Lease engine interface
//!
//! The lease engine owns the DHCP conversation itself. This crate only needs
//! to start it, be told when a lease comes and goes, and ask it about the
//! current lease. A started engine is represented by a [`LeaseSession`];
//! dropping the session stops the engine, after which no further events are
//! delivered.

pub mod socket;

use crate::{error::EngineError, options::DhcpOptions};
use rand::RngCore;
use std::net::Ipv4Addr;
use tokio::{runtime::Handle, sync::mpsc};

pub use socket::{SocketEngine, SocketSession};

/// Events a running lease engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseEvent {
    /// A usable lease was obtained.
    LeaseUp,
    /// The lease was lost or expired.
    LeaseDown,
    /// The engine failed and will not recover.
    Fatal,
}

pub type EventSender = mpsc::UnboundedSender<LeaseEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<LeaseEvent>;

/// Starts lease sessions.
pub trait LeaseEngine {
    type Session: LeaseSession;

    /// Starts a session on `ifname`.
    ///
    /// Any background work must run on `reactor`. Events are delivered through
    /// `events` until the returned session is dropped.
    fn start(
        &self,
        ifname: &str,
        options: &DhcpOptions,
        reactor: &Handle,
        rng: &mut dyn RngCore,
        events: EventSender,
    ) -> Result<Self::Session, EngineError>;
}

/// Point-in-time queries against the lease a session currently holds.
///
/// Only meaningful between a [`LeaseEvent::LeaseUp`] and the next
/// [`LeaseEvent::LeaseDown`].
pub trait LeaseSession {
    fn client_address(&self) -> Ipv4Addr;
    fn client_mask(&self) -> Ipv4Addr;
    /// `None` when the server did not provide a router.
    fn router(&self) -> Option<Ipv4Addr>;
    /// At most `max` servers, in the order the server listed them.
    fn dns_servers(&self, max: usize) -> Vec<Ipv4Addr>;
    fn server_mac(&self) -> [u8; 6];
}
