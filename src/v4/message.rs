use crate::options::DhcpOptions;
use bytes::{BufMut as _, Bytes, BytesMut};
use dhcproto::{
    error::EncodeError,
    v4::{self, OptionCode},
    Encodable as _, Encoder,
};
use std::net::Ipv4Addr;

/// Constructs a DHCP Discover message.
pub fn build_dhcp_discover(
    mac_addr: &Bytes,
    xid: u32,
    options: &DhcpOptions,
) -> Result<Vec<u8>, EncodeError> {
    let mut msg = base_message(mac_addr, xid);

    // DHCP Message Type (53) - DISCOVER
    msg.opts_mut()
        .insert(v4::DhcpOption::MessageType(v4::MessageType::Discover));

    insert_client_options(&mut msg, mac_addr, options);
    encode(&msg)
}

/// Constructs a DHCP Request for an offer received while selecting.
pub fn build_dhcp_request(
    mac_addr: &Bytes,
    xid: u32,
    offered_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
    options: &DhcpOptions,
) -> Result<Vec<u8>, EncodeError> {
    let mut msg = base_message(mac_addr, xid);

    // DHCP Message Type (53) - REQUEST
    msg.opts_mut()
        .insert(v4::DhcpOption::MessageType(v4::MessageType::Request));

    // Requested IP Address (50)
    msg.opts_mut()
        .insert(v4::DhcpOption::RequestedIpAddress(offered_ip));

    // Server Identifier (54)
    msg.opts_mut()
        .insert(v4::DhcpOption::ServerIdentifier(server_ip));

    insert_client_options(&mut msg, mac_addr, options);
    encode(&msg)
}

fn base_message(mac_addr: &Bytes, xid: u32) -> v4::Message {
    let mut msg = v4::Message::default();
    msg.set_opcode(v4::Opcode::BootRequest)
        .set_chaddr(mac_addr)
        .set_htype(v4::HType::Eth)
        .set_hops(0)
        .set_xid(xid)
        .set_secs(0)
        .set_ciaddr(Ipv4Addr::UNSPECIFIED)
        // No address yet, so replies have to be broadcast.
        .set_flags(v4::Flags::default().set_broadcast());
    msg
}

/// Adds the options that identify this client and what it asks for.
fn insert_client_options(msg: &mut v4::Message, mac_addr: &Bytes, options: &DhcpOptions) {
    if let Some(hostname) = &options.hostname {
        msg.opts_mut()
            .insert(v4::DhcpOption::Hostname(hostname.clone()));
    }

    if let Some(vendor_class_id) = &options.vendor_class_id {
        msg.opts_mut().insert(v4::DhcpOption::ClassIdentifier(
            vendor_class_id.as_bytes().to_vec(),
        ));
    }

    if options.auto_client_id {
        // htype 1 (Ethernet) followed by the MAC address
        let mut client_id_data = BytesMut::with_capacity(1 + mac_addr.len());
        client_id_data.put_u8(1);
        client_id_data.extend_from_slice(mac_addr);
        msg.opts_mut().insert(v4::DhcpOption::ClientIdentifier(
            client_id_data.freeze().to_vec(),
        ));
    }

    msg.opts_mut()
        .insert(v4::DhcpOption::ParameterRequestList(vec![
            OptionCode::SubnetMask,
            OptionCode::Router,
            OptionCode::DomainNameServer,
            OptionCode::AddressLeaseTime,
            OptionCode::ServerIdentifier,
        ]));
}

fn encode(msg: &v4::Message) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer);
    msg.encode(&mut encoder)?;
    Ok(buffer)
}
