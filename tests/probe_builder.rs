use huginn_net_probe::packet_builder::{encode_tcp_options, PacketBuilder};
use huginn_net_probe::packet_parser::parse_ipv4_reply;
use huginn_net_probe::probe::{PROBE_TSECR, PROBE_TSVAL};
use huginn_net_probe::probe_builder::{UDP_PROBE_IP_ID, UDP_PROBE_PAYLOAD_LEN};
use huginn_net_probe::{
    encode_options, ProbeBuilder, ProbeKind, ProbeProtocol, ReplyLayer, TcpProbeOption,
};
use pnet::packet::tcp::TcpFlags::{ACK, CWR, ECE, FIN, PSH, SYN, URG};
use std::net::Ipv4Addr;

const TARGET: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 10);
const SOURCE: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const OPEN: u16 = 22;
const CLOSED: u16 = 1;

fn builder() -> ProbeBuilder {
    ProbeBuilder::new(TARGET, OPEN, CLOSED)
}

#[test]
fn test_battery_order() {
    let probes = builder().build_all();
    let kinds: Vec<ProbeKind> = probes.iter().map(|probe| probe.kind).collect();

    assert_eq!(kinds, ProbeKind::VALUES.to_vec());
    assert!(probes.iter().all(|probe| probe.destination == TARGET));
}

#[test]
fn test_build_is_deterministic() {
    assert_eq!(builder().build_all(), builder().build_all());
}

#[test]
fn test_sequence_probes() {
    let windows: Vec<Option<u16>> =
        builder().sequence_probes().iter().map(|probe| probe.window()).collect();
    assert_eq!(windows, [1, 63, 4, 4, 16, 512].map(Some).to_vec());

    for probe in builder().sequence_probes() {
        assert!(probe.kind.is_sequence());
        assert_eq!(probe.port(), Some(OPEN));
        assert_eq!(probe.tcp_flags(), Some(SYN));
        assert!(!probe.ip.dont_fragment);
        assert!(probe.payload.is_empty());
        assert!(probe.tcp_options().contains(&TcpProbeOption::probe_timestamp()));
    }
}

#[test]
fn test_sequence_option_layouts() {
    use TcpProbeOption::*;
    let ts = Timestamp { tsval: PROBE_TSVAL, tsecr: PROBE_TSECR };
    let probes = builder().sequence_probes();

    assert_eq!(probes[0].tcp_options(), &[WindowScale(10), Nop, Mss(1460), ts, SackPermitted]);
    assert_eq!(probes[1].tcp_options(), &[Mss(1400), WindowScale(0), SackPermitted, ts, Eol]);
    assert_eq!(probes[2].tcp_options(), &[ts, Nop, Nop, WindowScale(5), Nop, Mss(640)]);
    assert_eq!(probes[3].tcp_options(), &[SackPermitted, ts, WindowScale(10), Eol]);
    assert_eq!(probes[4].tcp_options(), &[Mss(536), SackPermitted, ts, WindowScale(10), Eol]);
    assert_eq!(probes[5].tcp_options(), &[Mss(265), SackPermitted, ts]);

    for probe in &probes {
        let raw = encode_tcp_options(probe.tcp_options());
        assert_eq!(raw.len() % 4, 0, "{}", probe.kind);
        assert!(raw.len() <= 40, "{}", probe.kind);
    }
}

#[test]
fn test_encoded_option_lengths() {
    let options = [
        TcpProbeOption::Mss(1460),
        TcpProbeOption::Nop,
        TcpProbeOption::WindowScale(7),
        TcpProbeOption::SackPermitted,
    ];
    let raw = encode_tcp_options(&options);

    let wire_len: usize = options.iter().map(TcpProbeOption::wire_len).sum();
    assert_eq!(wire_len, 10);
    assert_eq!(raw, [2, 4, 0x05, 0xb4, 1, 3, 3, 7, 4, 2, 0, 0]);
}

#[test]
fn test_icmp_echo_probes() {
    let probes = builder().icmp_echo_probes();

    match &probes[0].protocol {
        ProbeProtocol::Icmp { icmp_type, code, identifier, sequence } => {
            assert_eq!((*icmp_type, *code, *identifier, *sequence), (8, 9, 12345, 295));
        }
        other => panic!("Expected an ICMP probe, got {other:?}"),
    }
    assert_eq!(probes[0].ip.tos, 0);
    assert!(probes[0].ip.dont_fragment);
    assert_eq!(probes[0].payload, vec![0; 120]);

    match &probes[1].protocol {
        ProbeProtocol::Icmp { icmp_type, code, identifier, sequence } => {
            assert_eq!((*icmp_type, *code, *identifier, *sequence), (8, 0, 12346, 296));
        }
        other => panic!("Expected an ICMP probe, got {other:?}"),
    }
    assert_eq!(probes[1].ip.tos, 4);
    assert!(!probes[1].ip.dont_fragment);
    assert_eq!(probes[1].payload, vec![0; 150]);
}

#[test]
fn test_ecn_probe() {
    let ecn = builder().build(ProbeKind::Ecn);

    assert_eq!(ecn.port(), Some(OPEN));
    assert_eq!(ecn.tcp_flags(), Some(SYN | CWR | ECE));
    assert_eq!(ecn.window(), Some(3));
    assert_eq!(ecn.ip.tos, 0);
}

#[test]
fn test_tcp_battery() {
    let expected = [
        (ProbeKind::T2, OPEN, 0, 128, true),
        (ProbeKind::T3, OPEN, SYN | FIN | URG | PSH, 256, false),
        (ProbeKind::T4, OPEN, ACK, 1024, true),
        (ProbeKind::T5, CLOSED, SYN, 31337, false),
        (ProbeKind::T6, CLOSED, ACK, 32768, true),
        (ProbeKind::T7, CLOSED, FIN | PSH | URG, 65535, false),
    ];

    let probes = builder().tcp_probes();
    assert_eq!(probes.len(), expected.len());

    for (probe, (kind, port, flags, window, df)) in probes.iter().zip(expected) {
        assert_eq!(probe.kind, kind);
        assert_eq!(probe.port(), Some(port), "{kind}");
        assert_eq!(probe.tcp_flags(), Some(flags), "{kind}");
        assert_eq!(probe.window(), Some(window), "{kind}");
        assert_eq!(probe.ip.dont_fragment, df, "{kind}");
    }

    let scale = if let [TcpProbeOption::WindowScale(scale), ..] = probes[5].tcp_options() {
        *scale
    } else {
        panic!("T7 must start with a window scale option");
    };
    assert_eq!(scale, 15);
}

#[test]
fn test_udp_probe() {
    let udp = builder().build(ProbeKind::U1);

    assert_eq!(udp.protocol, ProbeProtocol::Udp { port: CLOSED });
    assert_eq!(udp.ip.identification, Some(UDP_PROBE_IP_ID));
    assert_eq!(udp.payload.len(), UDP_PROBE_PAYLOAD_LEN);
    assert!(udp.payload.iter().all(|byte| *byte == b'C'));
}

#[test]
fn test_syn_datagram() {
    let packets = PacketBuilder::new(SOURCE, 40000).with_sequence_base(1000);
    let probe = builder().build(ProbeKind::Seq1);
    let raw = match packets.build(&probe) {
        Ok(raw) => raw,
        Err(e) => panic!("Failed to build {}: {e}", probe.kind),
    };
    let packet = match parse_ipv4_reply(&raw) {
        Ok(packet) => packet,
        Err(e) => panic!("Failed to parse {}: {e}", probe.kind),
    };

    assert_eq!(raw.len(), 20 + 20 + 20);
    assert_eq!(packet.source, SOURCE);
    assert_eq!(packet.destination, TARGET);
    assert!(!packet.dont_fragment);

    let tcp = match packet.tcp() {
        Some(tcp) => tcp,
        None => panic!("Expected a TCP segment, got {:?}", packet.layer),
    };
    assert_eq!(tcp.source_port, 40000);
    assert_eq!(tcp.destination_port, OPEN);
    assert_eq!(tcp.sequence, 1000);
    assert_eq!(tcp.flags, SYN);
    assert_eq!(tcp.window, 1);
    assert_eq!(encode_options(&tcp.options), "W10NM5B4T10S");
}

#[test]
fn test_each_probe_has_its_own_source_port() {
    let packets = PacketBuilder::new(SOURCE, 40000);
    let probes = builder().build_all();
    let mut ports: Vec<u16> = probes.iter().map(|probe| packets.source_port_for(probe)).collect();
    ports.dedup();

    assert_eq!(ports.len(), ProbeKind::VALUES.len());
    assert_eq!(packets.source_port_for(&probes.udp), 40015);
}

#[test]
fn test_echo_datagram() {
    let packets = PacketBuilder::new(SOURCE, 40000);
    let probe = builder().build(ProbeKind::Ie2);
    let packet = match packets.build(&probe).and_then(|raw| parse_ipv4_reply(&raw)) {
        Ok(packet) => packet,
        Err(e) => panic!("Failed to round trip {}: {e}", probe.kind),
    };

    assert_eq!(packet.tos, 4);
    assert!(!packet.dont_fragment);
    match packet.icmp() {
        Some(icmp) => {
            assert_eq!((icmp.icmp_type, icmp.code), (8, 0));
            // identifier and sequence, then the zero payload
            assert_eq!(icmp.payload_len, 4 + 150);
        }
        None => panic!("Expected an ICMP message, got {:?}", packet.layer),
    }
}

#[test]
fn test_udp_datagram() {
    let packets = PacketBuilder::new(SOURCE, 40000).with_identification_base(7);
    let probe = builder().build(ProbeKind::U1);
    let raw = match packets.build(&probe) {
        Ok(raw) => raw,
        Err(e) => panic!("Failed to build {}: {e}", probe.kind),
    };
    let packet = match parse_ipv4_reply(&raw) {
        Ok(packet) => packet,
        Err(e) => panic!("Failed to parse {}: {e}", probe.kind),
    };

    assert_eq!(raw.len(), 20 + 8 + UDP_PROBE_PAYLOAD_LEN);
    assert_eq!(packet.ip_id, UDP_PROBE_IP_ID);
    assert_eq!(packet.layer, ReplyLayer::Other(17));
}

#[test]
fn test_identification_follows_base() {
    let packets = PacketBuilder::new(SOURCE, 40000).with_identification_base(u16::MAX);
    let probe = builder().build(ProbeKind::Seq2);
    let packet = match packets.build(&probe).and_then(|raw| parse_ipv4_reply(&raw)) {
        Ok(packet) => packet,
        Err(e) => panic!("Failed to round trip {}: {e}", probe.kind),
    };

    assert_eq!(packet.ip_id, 0);
}

#[test]
fn test_battery_datagrams_carry_dont_fragment() {
    let packets = PacketBuilder::new(SOURCE, 40000);

    for probe in builder().build_all().iter() {
        let packet = match packets.build(probe).and_then(|raw| parse_ipv4_reply(&raw)) {
            Ok(packet) => packet,
            Err(e) => panic!("Failed to round trip {}: {e}", probe.kind),
        };
        assert_eq!(packet.dont_fragment, probe.ip.dont_fragment, "{}", probe.kind);
        assert_eq!(packet.ttl, 64, "{}", probe.kind);
    }
}
