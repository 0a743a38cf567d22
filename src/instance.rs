//! Lifecycle of a single DHCP instance
//!
//! This module bridges the lease engine to the host:
//! - Argument validation and engine start-up
//! - Mapping engine events to up/down/error/dead signals
//! - Teardown and variable lookup

use crate::{
    engine::{EventReceiver, LeaseEngine, LeaseEvent, LeaseSession},
    error::BridgeError,
    facts::{self, Fact, LeaseSnapshot, Variable},
    host::{HostHandle, HostSignal},
    options::{self, DhcpOptions},
    value::Value,
};
use rand::RngCore;
use tokio::{runtime::Handle, sync::mpsc};
use tracing::Span;

/// Observable state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The engine is running but holds no usable lease.
    NotUp,
    /// A lease is held and variables may be queried.
    Up,
    /// The engine has been released; nothing more will happen.
    Dead,
}

pub struct DhcpInstance<S: LeaseSession> {
    ifname: String,
    options: DhcpOptions,
    session: Option<S>,
    events: EventReceiver,
    state: LinkState,
    host: HostHandle,
    span: Span,
}

impl<S: LeaseSession> DhcpInstance<S> {
    /// Validates `args` and starts a lease session.
    ///
    /// On failure the host has already been told `Error` followed by `Dead`
    /// and no engine is left running. On success the instance is `NotUp`;
    /// the first lease arrives later as an event.
    pub fn new<E>(
        args: &[Value],
        engine: &E,
        reactor: &Handle,
        rng: &mut dyn RngCore,
        host: HostHandle,
    ) -> Result<Self, BridgeError>
    where
        E: LeaseEngine<Session = S>,
    {
        let (ifname, options) = match options::parse_args(args) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!("Invalid arguments: {}", e);
                Self::fail_construction(&host);
                return Err(e.into());
            }
        };

        let span = tracing::info_span!("dhcp", ifname = %ifname);
        let enter = span.enter();

        let (tx, events) = mpsc::unbounded_channel();
        let session = match engine.start(&ifname, &options, reactor, rng, tx) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to start lease engine: {}", e);
                Self::fail_construction(&host);
                return Err(BridgeError::EngineStart(e));
            }
        };
        tracing::info!("Lease engine started with {:?}", options);

        drop(enter);
        Ok(Self {
            ifname,
            options,
            session: Some(session),
            events,
            state: LinkState::NotUp,
            host,
            span,
        })
    }

    fn fail_construction(host: &HostHandle) {
        host.report(HostSignal::Error);
        host.report(HostSignal::Dead);
    }

    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    pub fn options(&self) -> &DhcpOptions {
        &self.options
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Waits for the next engine event.
    ///
    /// Returns `None` once the instance is dead.
    pub async fn next_event(&mut self) -> Option<LeaseEvent> {
        if self.state == LinkState::Dead {
            return None;
        }
        self.events.recv().await
    }

    /// Receives and handles one engine event.
    ///
    /// Returns `Ok(false)` when the instance is dead and there is nothing
    /// left to wait for.
    pub async fn step(&mut self) -> Result<bool, BridgeError> {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event)?;
                Ok(self.state != LinkState::Dead)
            }
            None => {
                if self.state != LinkState::Dead {
                    // Engine went away without saying goodbye.
                    let span = self.span.clone();
                    let _enter = span.enter();
                    tracing::error!("Lease engine event channel closed unexpectedly");
                    self.fail();
                    return Err(BridgeError::EngineFatal);
                }
                Ok(false)
            }
        }
    }

    /// Applies one engine event to the lifecycle.
    pub fn handle_event(&mut self, event: LeaseEvent) -> Result<(), BridgeError> {
        let span = self.span.clone();
        let _enter = span.enter();
        tracing::debug!("Handling event {:?} in state {:?}", event, self.state);

        match (self.state, event) {
            (LinkState::Dead, _) => {
                tracing::debug!("Ignoring {:?} after release", event);
                Ok(())
            }
            (LinkState::NotUp, LeaseEvent::LeaseUp) => {
                tracing::info!("Lease acquired");
                self.state = LinkState::Up;
                self.host.report(HostSignal::Up);
                Ok(())
            }
            (LinkState::Up, LeaseEvent::LeaseDown) => {
                tracing::info!("Lease lost");
                self.state = LinkState::NotUp;
                self.host.report(HostSignal::Down);
                Ok(())
            }
            (_, LeaseEvent::Fatal) => {
                tracing::error!("Lease engine failed");
                self.fail();
                Err(BridgeError::EngineFatal)
            }
            (state, event) => {
                tracing::error!("Lease engine sent {:?} while {:?}", event, state);
                self.fail();
                Err(BridgeError::Critical(format!(
                    "unexpected {event:?} in state {state:?}"
                )))
            }
        }
    }

    fn fail(&mut self) {
        self.host.report(HostSignal::Error);
        self.release();
    }

    /// Host-requested destruction. Safe to call in any state.
    pub fn die(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.state == LinkState::Dead {
            return;
        }
        tracing::info!("Destroying instance");
        self.release();
    }

    fn release(&mut self) {
        // Stop the engine first so nothing can be delivered once Dead is out.
        if let Some(session) = self.session.take() {
            drop(session);
        }
        self.events.close();
        while self.events.try_recv().is_ok() {}

        self.state = LinkState::Dead;
        self.host.report(HostSignal::Dead);
    }

    /// Looks up a variable by name.
    ///
    /// Unknown names yield `Ok(None)`. Only valid while [`LinkState::Up`].
    pub fn getvar(&self, name: &str) -> Result<Option<Variable>, BridgeError> {
        let Ok(fact) = name.parse::<Fact>() else {
            return Ok(None);
        };
        self.fact(fact).map(Some)
    }

    pub fn fact(&self, fact: Fact) -> Result<Variable, BridgeError> {
        let _enter = self.span.enter();
        let session = match (&self.session, self.state) {
            (Some(session), LinkState::Up) => session,
            _ => return Err(BridgeError::NotUp),
        };

        let lease = LeaseSnapshot::capture(session);
        facts::derive(fact, &lease).inspect_err(|e| {
            tracing::error!("Cannot compute {}: {}", fact.name(), e);
        })
    }
}

impl<S: LeaseSession> Drop for DhcpInstance<S> {
    fn drop(&mut self) {
        self.die();
    }
}
