//! # Leasebridge - DHCP Leases as a Lifecycle
//!
//! Leasebridge runs a DHCPv4 client session on one network interface and
//! presents it to a host as a simple lifecycle: the instance goes up when a
//! lease is acquired, down when it is lost, and reports an error followed by
//! its death when the lease engine fails. While up, the lease can be queried
//! through a fixed set of variables.
//!
//! ## Features
//!
//! - Validation of `(ifname [, opts])` constructor arguments
//! - Up/down/error/dead signalling driven by lease engine events
//! - Lease-derived variables (`addr`, `prefix`, `cidr_addr`, `gateway`,
//!   `dns_servers`, `server_mac`)
//! - A socket-backed lease engine built on Tokio
//!
//! Nothing here configures the interface; the lease is only reported.
//!
//! ## Example
//!
//! ```rust,no_run
//! use leasebridge::{ClientConfig, DhcpInstance, HostHandle, SocketEngine, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = SocketEngine::new(ClientConfig::new());
//!     let (host, mut signals) = HostHandle::channel();
//!     let args = [Value::from("eth0"), Value::List(vec![Value::from("auto_clientid")])];
//!     let mut instance = DhcpInstance::new(
//!         &args,
//!         &engine,
//!         &tokio::runtime::Handle::current(),
//!         &mut rand::rng(),
//!         host,
//!     )?;
//!     while instance.step().await? {
//!         if let Some(addr) = instance.getvar("cidr_addr").ok().flatten() {
//!             println!("Lease: {:?}", addr);
//!         }
//!     }
//!     while let Ok(signal) = signals.try_recv() {
//!         println!("{:?}", signal);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod facts;
pub mod host;
pub mod instance;
pub mod network;
pub mod options;
pub mod v4;
pub mod value;

pub use config::{Args, ClientConfig};
pub use engine::{LeaseEngine, LeaseEvent, LeaseSession, SocketEngine};
pub use error::{ArgError, BridgeError, EngineError};
pub use facts::{Fact, LeaseSnapshot, Variable};
pub use host::{HostHandle, HostSignal};
pub use instance::{DhcpInstance, LinkState};
pub use options::DhcpOptions;
pub use value::Value;
