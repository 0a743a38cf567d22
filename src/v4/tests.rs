use super::*;
use crate::{
    config::ClientConfig,
    engine::socket::{Action, DhcpStateMachine, Event},
    options::DhcpOptions,
};
use bytes::Bytes;
use dhcproto::{
    v4::{self, DhcpOption, MessageType, OptionCode},
    Decodable, Decoder, Encodable,
};
use rand::{rngs::StdRng, SeedableRng};
use std::{net::Ipv4Addr, time::Duration};

const MAC: [u8; 6] = [0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4];
const SERVER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const OFFERED: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);

fn decode(packet: &[u8]) -> v4::Message {
    v4::Message::decode(&mut Decoder::new(packet)).unwrap()
}

fn handler(options: DhcpOptions) -> DhcpV4Handler {
    DhcpV4Handler::new(
        Bytes::from_static(&MAC),
        options,
        StdRng::seed_from_u64(7),
        &ClientConfig::new(),
    )
}

fn expect_send(action: Action) -> v4::Message {
    match action {
        Action::Send(packet, addr, _) => {
            assert_eq!(addr.port(), 67);
            decode(&packet)
        }
        other => panic!("Expected Send action, got {other:?}"),
    }
}

fn reply(xid: u32, msg_type: MessageType, opts: Vec<DhcpOption>) -> Vec<u8> {
    let mut msg = v4::Message::default();
    msg.set_opcode(v4::Opcode::BootReply)
        .set_xid(xid)
        .set_yiaddr(OFFERED)
        .set_chaddr(&MAC);
    msg.opts_mut().insert(DhcpOption::MessageType(msg_type));
    for opt in opts {
        msg.opts_mut().insert(opt);
    }
    msg.to_vec().unwrap()
}

fn offer(xid: u32) -> Vec<u8> {
    reply(xid, MessageType::Offer, vec![DhcpOption::ServerIdentifier(SERVER)])
}

fn full_ack(xid: u32) -> Vec<u8> {
    reply(
        xid,
        MessageType::Ack,
        vec![
            DhcpOption::ServerIdentifier(SERVER),
            DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)),
            DhcpOption::AddressLeaseTime(3600),
            DhcpOption::Router(vec![SERVER, Ipv4Addr::new(192, 168, 1, 2)]),
            DhcpOption::DomainNameServer(vec![
                Ipv4Addr::new(9, 9, 9, 9),
                Ipv4Addr::new(1, 1, 1, 1),
            ]),
        ],
    )
}

/// Drives a fresh handler up to the point where it has sent a REQUEST.
fn requesting(handler: &mut DhcpV4Handler) -> u32 {
    let discover = expect_send(handler.handle_event(Event::Timeout).unwrap());
    let xid = discover.xid();
    expect_send(handler.handle_event(Event::PacketReceived(&offer(xid))).unwrap());
    assert_eq!(handler.state_name(), "Requesting");
    xid
}

#[test]
fn test_build_dhcp_discover_without_options() {
    let mac_addr = Bytes::from_static(&MAC);
    let packet = build_dhcp_discover(&mac_addr, 0x12345678, &DhcpOptions::default()).unwrap();
    let msg = decode(&packet);

    assert_eq!(msg.xid(), 0x12345678);
    assert_eq!(msg.chaddr(), &MAC[..]);
    assert_eq!(msg.opcode(), v4::Opcode::BootRequest);
    assert!(msg.flags().broadcast());
    assert!(matches!(
        msg.opts().get(OptionCode::MessageType),
        Some(DhcpOption::MessageType(MessageType::Discover))
    ));
    assert!(msg.opts().get(OptionCode::Hostname).is_none());
    assert!(msg.opts().get(OptionCode::ClassIdentifier).is_none());
    assert!(msg.opts().get(OptionCode::ClientIdentifier).is_none());
}

#[test]
fn test_build_dhcp_discover_with_options() {
    let mac_addr = Bytes::from_static(&MAC);
    let options = DhcpOptions {
        hostname: Some("box".to_string()),
        vendor_class_id: Some("acme".to_string()),
        auto_client_id: true,
    };
    let msg = decode(&build_dhcp_discover(&mac_addr, 1, &options).unwrap());

    assert!(matches!(
        msg.opts().get(OptionCode::Hostname),
        Some(DhcpOption::Hostname(h)) if h == "box"
    ));
    assert!(matches!(
        msg.opts().get(OptionCode::ClassIdentifier),
        Some(DhcpOption::ClassIdentifier(v)) if v == b"acme"
    ));
    let mut expected_id = vec![1];
    expected_id.extend_from_slice(&MAC);
    assert!(matches!(
        msg.opts().get(OptionCode::ClientIdentifier),
        Some(DhcpOption::ClientIdentifier(id)) if *id == expected_id
    ));
}

#[test]
fn test_build_dhcp_request() {
    let mac_addr = Bytes::from_static(&MAC);
    let options = DhcpOptions {
        hostname: Some("box".to_string()),
        ..DhcpOptions::default()
    };
    let packet = build_dhcp_request(&mac_addr, 0x87654321, OFFERED, SERVER, &options).unwrap();
    let msg = decode(&packet);

    assert_eq!(msg.xid(), 0x87654321);
    assert!(matches!(
        msg.opts().get(OptionCode::MessageType),
        Some(DhcpOption::MessageType(MessageType::Request))
    ));
    assert!(matches!(
        msg.opts().get(OptionCode::RequestedIpAddress),
        Some(DhcpOption::RequestedIpAddress(ip)) if *ip == OFFERED
    ));
    assert!(matches!(
        msg.opts().get(OptionCode::ServerIdentifier),
        Some(DhcpOption::ServerIdentifier(ip)) if *ip == SERVER
    ));
    assert!(msg.opts().get(OptionCode::Hostname).is_some());
}

#[test]
fn test_handler_starts_in_init() {
    let handler = handler(DhcpOptions::default());
    assert_eq!(handler.state_name(), "Init");
}

#[test]
fn test_full_exchange_binds_lease() {
    let mut handler = handler(DhcpOptions::default());
    let xid = requesting(&mut handler);

    let action = handler
        .handle_event(Event::PacketReceived(&full_ack(xid)))
        .unwrap();
    let Action::Bind(lease) = action else {
        panic!("Expected Bind action, got {action:?}");
    };

    assert_eq!(handler.state_name(), "Bound");
    assert_eq!(lease.client_addr, OFFERED);
    assert_eq!(lease.subnet_mask, Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(lease.routers[0], SERVER);
    assert_eq!(
        lease.dns_servers,
        vec![Ipv4Addr::new(9, 9, 9, 9), Ipv4Addr::new(1, 1, 1, 1)]
    );
    assert_eq!(lease.lease_duration, Duration::from_secs(3600));
    assert_eq!(lease.server_identifier, Some(SERVER));
}

#[test]
fn test_offer_with_foreign_xid_is_ignored() {
    let mut handler = handler(DhcpOptions::default());
    let discover = expect_send(handler.handle_event(Event::Timeout).unwrap());

    let action = handler
        .handle_event(Event::PacketReceived(&offer(discover.xid().wrapping_add(1))))
        .unwrap();
    assert!(matches!(action, Action::Wait(_)));
    assert_eq!(handler.state_name(), "Selecting");

    let action = handler
        .handle_event(Event::PacketReceived(&[0xde, 0xad]))
        .unwrap();
    assert!(matches!(action, Action::Wait(_)));
}

#[test]
fn test_ack_without_mask_is_ignored() {
    let mut handler = handler(DhcpOptions::default());
    let xid = requesting(&mut handler);

    let ack = reply(
        xid,
        MessageType::Ack,
        vec![DhcpOption::AddressLeaseTime(3600)],
    );
    let action = handler.handle_event(Event::PacketReceived(&ack)).unwrap();
    assert!(matches!(action, Action::Wait(_)));
    assert_eq!(handler.state_name(), "Requesting");
}

#[test]
fn test_short_lease_time_is_raised() {
    let mut handler = handler(DhcpOptions::default());
    let xid = requesting(&mut handler);

    let ack = reply(
        xid,
        MessageType::Ack,
        vec![
            DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)),
            DhcpOption::AddressLeaseTime(0),
        ],
    );
    let action = handler.handle_event(Event::PacketReceived(&ack)).unwrap();
    let Action::Bind(lease) = action else {
        panic!("Expected Bind action, got {action:?}");
    };
    assert_eq!(lease.lease_duration, super::handler::MIN_LEASE_TIME);
}

#[test]
fn test_nak_restarts_discovery() {
    let mut handler = handler(DhcpOptions::default());
    let xid = requesting(&mut handler);

    let nak = reply(xid, MessageType::Nak, vec![]);
    let msg = expect_send(handler.handle_event(Event::PacketReceived(&nak)).unwrap());
    assert!(matches!(
        msg.opts().get(OptionCode::MessageType),
        Some(DhcpOption::MessageType(MessageType::Discover))
    ));
    assert_eq!(handler.state_name(), "Selecting");
}

#[test]
fn test_request_retries_then_restarts() {
    let mut handler = handler(DhcpOptions::default());
    requesting(&mut handler);

    // One REQUEST went out already; the rest of the attempts are retries.
    for _ in 1..ClientConfig::new().request_attempts {
        let msg = expect_send(handler.handle_event(Event::Timeout).unwrap());
        assert!(matches!(
            msg.opts().get(OptionCode::MessageType),
            Some(DhcpOption::MessageType(MessageType::Request))
        ));
    }

    let msg = expect_send(handler.handle_event(Event::Timeout).unwrap());
    assert!(matches!(
        msg.opts().get(OptionCode::MessageType),
        Some(DhcpOption::MessageType(MessageType::Discover))
    ));
    assert_eq!(handler.state_name(), "Selecting");
}

#[test]
fn test_expiry_restarts_discovery() {
    let mut handler = handler(DhcpOptions::default());
    let xid = requesting(&mut handler);
    handler
        .handle_event(Event::PacketReceived(&full_ack(xid)))
        .unwrap();

    let msg = expect_send(handler.handle_event(Event::Timeout).unwrap());
    assert!(matches!(
        msg.opts().get(OptionCode::MessageType),
        Some(DhcpOption::MessageType(MessageType::Discover))
    ));
    assert_eq!(handler.state_name(), "Selecting");
}
