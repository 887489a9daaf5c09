use super::transport::{
    CastMode, LowerTransport, PortRange, ServerPorts, TransportHeader, TransportParseError,
};
use proptest::prelude::*;

#[test]
fn test_parse_server_port_range() {
    let transport = TransportHeader::parse(
        "RTP/AVP/UDP;unicast;mode=record;server_port=6000-6001;timing_port=6002",
    )
    .unwrap();

    assert_eq!(transport.lower_transport, LowerTransport::Udp);
    assert_eq!(transport.cast, CastMode::Unicast);
    assert_eq!(transport.mode.as_deref(), Some("record"));
    assert_eq!(
        transport.server_ports().unwrap(),
        ServerPorts {
            audio: 6000,
            control: 6001,
            timing: 6002
        }
    );
}

#[test]
fn test_single_server_port_uses_control_port_param() {
    let transport =
        TransportHeader::parse("RTP/AVP/UDP;unicast;server_port=53561;control_port=53570").unwrap();
    let ports = transport.server_ports().unwrap();

    assert_eq!(ports.audio, 53561);
    assert_eq!(ports.control, 53570);
    assert_eq!(ports.timing, 53571);
}

#[test]
fn test_single_server_port_defaults_to_adjacent() {
    let transport = TransportHeader::parse("RTP/AVP;unicast;server_port=7000").unwrap();
    let ports = transport.server_ports().unwrap();

    assert_eq!(
        (ports.audio, ports.control, ports.timing),
        (7000, 7001, 7002)
    );
}

#[test]
fn test_tolerates_unknown_params_and_whitespace() {
    let transport = TransportHeader::parse(
        "  RTP/AVP/UDP ; unicast ; foo=bar ; server_port = 6000-6001 ; event_port=7\r\n",
    )
    .unwrap();

    assert_eq!(transport.server_ports().unwrap().audio, 6000);
}

#[test]
fn test_invalid_transport_rejected() {
    assert!(matches!(
        TransportHeader::parse("Invalid transport"),
        Err(TransportParseError::UnsupportedProtocol(_))
    ));
    assert!(matches!(
        TransportHeader::parse(""),
        Err(TransportParseError::MissingProtocol)
    ));
}

#[test]
fn test_invalid_port_rejected() {
    assert!(matches!(
        TransportHeader::parse("RTP/AVP/UDP;server_port=abc"),
        Err(TransportParseError::InvalidPort(_))
    ));
    assert!(matches!(
        TransportHeader::parse("RTP/AVP/UDP;server_port=70000"),
        Err(TransportParseError::InvalidPort(_))
    ));
}

#[test]
fn test_missing_server_port() {
    let transport = TransportHeader::parse("RTP/AVP/UDP;unicast;mode=record").unwrap();
    assert!(matches!(
        transport.server_ports(),
        Err(TransportParseError::MissingServerPort)
    ));
}

#[test]
fn test_client_request_format() {
    let header = TransportHeader::client_request(6000, 6001, 6002).to_string();
    assert_eq!(
        header,
        "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;client_port=6000-6001;control_port=6001;timing_port=6002"
    );

    let parsed = TransportHeader::parse(&header).unwrap();
    assert_eq!(
        parsed.client_port,
        Some(PortRange {
            start: 6000,
            end: Some(6001)
        })
    );
    assert_eq!(parsed.interleaved, Some((0, 1)));
}

#[test]
fn test_tcp_transport() {
    let transport = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap();
    assert_eq!(transport.lower_transport, LowerTransport::Tcp);
}

proptest! {
    #[test]
    fn server_response_resolves_to_same_ports(audio in 1u16..60000, control in 1u16..60000, timing in 1u16..60000) {
        let header = TransportHeader::server_response(audio, control, timing).to_string();
        let ports = TransportHeader::parse(&header).unwrap().server_ports().unwrap();
        prop_assert_eq!(ports, ServerPorts { audio, control, timing });
    }
}
