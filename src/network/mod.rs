//! Host network plumbing: the client socket, the interface MAC and the ARP cache.

use crate::error::EngineError;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    fmt, io,
    net::{Ipv4Addr, SocketAddrV4},
};
use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

/// The step of opening the client socket that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStep {
    Create,
    Broadcast,
    ReuseAddress,
    BindToDevice,
    Bind,
    NonBlocking,
    Register,
}

impl fmt::Display for SocketStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SocketStep::Create => "creating the socket",
            SocketStep::Broadcast => "enabling SO_BROADCAST",
            SocketStep::ReuseAddress => "enabling SO_REUSEADDR",
            SocketStep::BindToDevice => "setting SO_BINDTODEVICE",
            SocketStep::Bind => "binding the client port",
            SocketStep::NonBlocking => "switching to non-blocking mode",
            SocketStep::Register => "registering with the runtime",
        })
    }
}

#[derive(Error, Debug)]
#[error("cannot open DHCP client socket on '{interface}': {step} failed")]
pub struct SocketError {
    pub step: SocketStep,
    pub interface: String,
    #[source]
    pub source: io::Error,
}

fn failed(step: SocketStep, interface: &str) -> impl FnOnce(io::Error) -> SocketError + '_ {
    move |source| SocketError {
        step,
        interface: interface.to_string(),
        source,
    }
}

/// Opens the broadcast UDP socket a DHCP client listens on: `0.0.0.0:port`,
/// receiving only from `interface`.
///
/// Must be called from within a tokio runtime context.
pub fn open_client_socket(interface: &str, port: u16) -> Result<TokioUdpSocket, SocketError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(failed(SocketStep::Create, interface))?;
    socket
        .set_broadcast(true)
        .map_err(failed(SocketStep::Broadcast, interface))?;
    socket
        .set_reuse_address(true)
        .map_err(failed(SocketStep::ReuseAddress, interface))?;
    restrict_to_device(&socket, interface).map_err(failed(SocketStep::BindToDevice, interface))?;
    socket
        .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
        .map_err(failed(SocketStep::Bind, interface))?;
    socket
        .set_nonblocking(true)
        .map_err(failed(SocketStep::NonBlocking, interface))?;

    TokioUdpSocket::from_std(socket.into()).map_err(failed(SocketStep::Register, interface))
}

#[cfg(target_os = "linux")]
fn restrict_to_device(socket: &Socket, interface: &str) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: the fd stays open for the call and the option value points at
    // `interface.len()` readable bytes.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            interface.as_ptr().cast::<libc::c_void>(),
            interface.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn restrict_to_device(_socket: &Socket, _interface: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SO_BINDTODEVICE is only available on Linux",
    ))
}

/// Parses a MAC address string (e.g., "0a:1b:2c:3d:4e:5f").
pub fn parse_mac_address(mac_str: &str) -> Result<[u8; 6], EngineError> {
    let mut mac = [0u8; 6];
    let mut parts = mac_str.split(':');
    for byte in mac.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| EngineError::MacParse(mac_str.to_string()))?;
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| EngineError::MacParse(mac_str.to_string()))?;
    }
    if parts.next().is_some() {
        return Err(EngineError::MacParse(mac_str.to_string()));
    }
    Ok(mac)
}

/// Reads the hardware address of `interface` from sysfs.
pub fn read_mac_address(interface: &str) -> Result<[u8; 6], EngineError> {
    let mac_path = format!("/sys/class/net/{interface}/address");
    let mac_str = std::fs::read_to_string(&mac_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => EngineError::InterfaceInvalid(interface.to_string()),
        _ => EngineError::Io(e),
    })?;
    let mac = parse_mac_address(mac_str.trim())?;
    if mac == [0u8; 6] {
        return Err(EngineError::InterfaceInvalid(interface.to_string()));
    }
    Ok(mac)
}

/// Finds `ip` in the kernel's ARP cache.
pub async fn lookup_arp_entry(ip: Ipv4Addr) -> Option<[u8; 6]> {
    let table = tokio::fs::read_to_string("/proc/net/arp").await.ok()?;
    find_arp_entry(&table, ip)
}

/// Columns: IP address, HW type, Flags, HW address, Mask, Device.
fn find_arp_entry(table: &str, ip: Ipv4Addr) -> Option<[u8; 6]> {
    table.lines().skip(1).find_map(|line| {
        let mut columns = line.split_whitespace();
        let entry_ip: Ipv4Addr = columns.next()?.parse().ok()?;
        if entry_ip != ip {
            return None;
        }
        let hw_address = columns.nth(2)?;
        parse_mac_address(hw_address).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_open_client_socket_on_missing_interface() {
        let err = open_client_socket("nosuchif0", 0).unwrap_err();
        assert_eq!(err.step, SocketStep::BindToDevice);
        assert_eq!(
            err.to_string(),
            "cannot open DHCP client socket on 'nosuchif0': setting SO_BINDTODEVICE failed"
        );
    }

    #[test]
    fn test_parse_mac_address() {
        assert_eq!(
            parse_mac_address("00:0c:29:a8:92:f4").unwrap(),
            [0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]
        );
        assert!(parse_mac_address("00:0c:29:a8:92").is_err());
        assert!(parse_mac_address("00:0c:29:a8:92:f4:01").is_err());
        assert!(parse_mac_address("zz:0c:29:a8:92:f4").is_err());
    }

    #[test]
    fn test_find_arp_entry() {
        let table = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.1      0x1         0x2         ab:0c:ef:01:02:03     *        eth0
192.168.1.7      0x1         0x2         00:11:22:33:44:55     *        eth0
";
        assert_eq!(
            find_arp_entry(table, Ipv4Addr::new(192, 168, 1, 1)),
            Some([0xAB, 0x0C, 0xEF, 0x01, 0x02, 0x03])
        );
        assert_eq!(find_arp_entry(table, Ipv4Addr::new(192, 168, 1, 2)), None);
    }
}
