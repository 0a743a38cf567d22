use crate::network::SocketError;
use dhcproto::error::EncodeError;
use std::{io, net::Ipv4Addr};
use thiserror::Error;

/// Failures while validating the constructor arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("wrong arity: expected 1 or 2 arguments, got {0}")]
    Arity(usize),

    #[error("wrong type: {0}")]
    Type(&'static str),

    #[error("option value missing for '{0}'")]
    MissingValue(String),

    #[error("unknown option name '{0}'")]
    UnknownOption(String),
}

/// Failures reported by a lease engine while starting a session.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Interface '{0}' not found or has no MAC address")]
    InterfaceInvalid(String),

    #[error("Failed to parse MAC address: {0}")]
    MacParse(String),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Failed to encode DHCP message")]
    Encode(#[from] EncodeError),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("invalid arguments")]
    Args(#[from] ArgError),

    #[error("lease engine failed to start")]
    EngineStart(#[source] EngineError),

    #[error("lease engine reported a fatal error")]
    EngineFatal,

    #[error("bad netmask {0}")]
    InvalidMask(Ipv4Addr),

    #[error("variables are only available while the lease is up")]
    NotUp,

    #[error("Lifecycle reached a critical failure: {0}")]
    Critical(String),
}
