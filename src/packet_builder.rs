use crate::error::HuginnNetProbeError;
use crate::probe::{Probe, ProbeProtocol, TcpProbeOption};
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpType};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::{self, Ipv4Flags, MutableIpv4Packet};
use pnet::packet::tcp::{self, MutableTcpPacket};
use pnet::packet::udp::{self, MutableUdpPacket};
use pnet::packet::util;
use pnet::packet::MutablePacket;
use pnet::packet::Packet;
use std::net::Ipv4Addr;

pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const ICMP_ECHO_HEADER_LEN: usize = 8;
pub const DEFAULT_TTL: u8 = 64;

/// Serializes probes into complete IPv4 datagrams.
///
/// Each probe kind is sent from its own source port (`source_port + kind index`) so that
/// replies can be matched back to the probe that elicited them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketBuilder {
    pub source: Ipv4Addr,
    pub source_port: u16,
    pub sequence_base: u32,
    pub identification_base: u16,
    pub ttl: u8,
}

impl PacketBuilder {
    pub fn new(source: Ipv4Addr, source_port: u16) -> Self {
        Self { source, source_port, sequence_base: 0, identification_base: 0, ttl: DEFAULT_TTL }
    }

    pub fn with_sequence_base(mut self, sequence_base: u32) -> Self {
        self.sequence_base = sequence_base;
        self
    }

    pub fn with_identification_base(mut self, identification_base: u16) -> Self {
        self.identification_base = identification_base;
        self
    }

    pub fn source_port_for(&self, probe: &Probe) -> u16 {
        self.source_port.wrapping_add(probe.kind.index() as u16)
    }

    pub fn build(&self, probe: &Probe) -> Result<Vec<u8>, HuginnNetProbeError> {
        let (protocol, segment) = match &probe.protocol {
            ProbeProtocol::Tcp { port, flags, window, options } => (
                IpNextHeaderProtocols::Tcp,
                self.build_tcp(probe, *port, *flags, *window, options)?,
            ),
            ProbeProtocol::Icmp { icmp_type, code, identifier, sequence } => (
                IpNextHeaderProtocols::Icmp,
                build_icmp_echo(*icmp_type, *code, *identifier, *sequence, &probe.payload)?,
            ),
            ProbeProtocol::Udp { port } => {
                (IpNextHeaderProtocols::Udp, self.build_udp(probe, *port)?)
            }
        };

        self.build_ipv4(probe, protocol, &segment)
    }

    fn build_ipv4(
        &self,
        probe: &Probe,
        protocol: IpNextHeaderProtocol,
        segment: &[u8],
    ) -> Result<Vec<u8>, HuginnNetProbeError> {
        let total_len = IPV4_HEADER_LEN + segment.len();
        let total_len_u16 = u16::try_from(total_len).map_err(|_| {
            HuginnNetProbeError::UnexpectedPackage(format!(
                "{} datagram of {total_len} bytes exceeds the IPv4 limit",
                probe.kind
            ))
        })?;

        let mut buffer = vec![0u8; total_len];
        let mut ip = MutableIpv4Packet::new(&mut buffer)
            .ok_or_else(|| too_small(probe, "IPv4"))?;

        ip.set_version(4);
        ip.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ip.set_dscp(probe.ip.tos >> 2);
        ip.set_ecn(probe.ip.tos & 0b11);
        ip.set_total_length(total_len_u16);
        let identification = probe
            .ip
            .identification
            .unwrap_or_else(|| self.identification_base.wrapping_add(probe.kind.index() as u16));
        ip.set_identification(identification);
        ip.set_flags(if probe.ip.dont_fragment { Ipv4Flags::DontFragment } else { 0 });
        ip.set_fragment_offset(0);
        ip.set_ttl(self.ttl);
        ip.set_next_level_protocol(protocol);
        ip.set_source(self.source);
        ip.set_destination(probe.destination);
        ip.set_payload(segment);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);

        Ok(buffer)
    }

    fn build_tcp(
        &self,
        probe: &Probe,
        port: u16,
        flags: u8,
        window: u16,
        options: &[TcpProbeOption],
    ) -> Result<Vec<u8>, HuginnNetProbeError> {
        let raw_options = encode_tcp_options(options);
        let header_len = TCP_HEADER_LEN + raw_options.len();
        if header_len > 60 {
            return Err(HuginnNetProbeError::UnexpectedPackage(format!(
                "{} carries {} bytes of TCP options",
                probe.kind,
                raw_options.len()
            )));
        }

        let mut buffer = vec![0u8; header_len + probe.payload.len()];
        let mut segment =
            MutableTcpPacket::new(&mut buffer).ok_or_else(|| too_small(probe, "TCP"))?;

        segment.set_source(self.source_port_for(probe));
        segment.set_destination(port);
        segment.set_sequence(self.sequence_base.wrapping_add(probe.kind.index() as u32));
        segment.set_acknowledgement(0);
        segment.set_data_offset((header_len / 4) as u8);
        segment.set_flags(flags);
        segment.set_window(window);
        segment.set_urgent_ptr(0);
        segment.packet_mut()[TCP_HEADER_LEN..header_len].copy_from_slice(&raw_options);
        segment.set_payload(&probe.payload);
        let checksum =
            tcp::ipv4_checksum(&segment.to_immutable(), &self.source, &probe.destination);
        segment.set_checksum(checksum);

        Ok(buffer)
    }

    fn build_udp(&self, probe: &Probe, port: u16) -> Result<Vec<u8>, HuginnNetProbeError> {
        let len = UDP_HEADER_LEN + probe.payload.len();
        let mut buffer = vec![0u8; len];
        let mut datagram =
            MutableUdpPacket::new(&mut buffer).ok_or_else(|| too_small(probe, "UDP"))?;

        datagram.set_source(self.source_port_for(probe));
        datagram.set_destination(port);
        datagram.set_length(len as u16);
        datagram.set_payload(&probe.payload);
        let checksum =
            udp::ipv4_checksum(&datagram.to_immutable(), &self.source, &probe.destination);
        datagram.set_checksum(checksum);

        Ok(buffer)
    }
}

fn build_icmp_echo(
    icmp_type: u8,
    code: u8,
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Result<Vec<u8>, HuginnNetProbeError> {
    let mut buffer = vec![0u8; ICMP_ECHO_HEADER_LEN + payload.len()];
    let mut echo = MutableEchoRequestPacket::new(&mut buffer).ok_or_else(|| {
        HuginnNetProbeError::UnexpectedPackage("buffer too small for ICMP echo".to_string())
    })?;

    echo.set_icmp_type(IcmpType::new(icmp_type));
    echo.set_icmp_code(IcmpCode::new(code));
    echo.set_identifier(identifier);
    echo.set_sequence_number(sequence);
    echo.set_payload(payload);
    let checksum = util::checksum(echo.packet(), 1);
    echo.set_checksum(checksum);

    Ok(buffer)
}

/// Writes options in order and pads the result to a 32-bit boundary with EOL bytes.
pub fn encode_tcp_options(options: &[TcpProbeOption]) -> Vec<u8> {
    let len: usize = options.iter().map(TcpProbeOption::wire_len).sum();
    let mut raw = Vec::with_capacity(len.next_multiple_of(4));

    for option in options {
        raw.push(option.number());
        let wire_len = option.wire_len() as u8;
        match *option {
            TcpProbeOption::Eol | TcpProbeOption::Nop => {}
            TcpProbeOption::Mss(mss) => {
                raw.push(wire_len);
                raw.extend_from_slice(&mss.to_be_bytes());
            }
            TcpProbeOption::WindowScale(scale) => {
                raw.push(wire_len);
                raw.push(scale);
            }
            TcpProbeOption::SackPermitted => raw.push(wire_len),
            TcpProbeOption::Timestamp { tsval, tsecr } => {
                raw.push(wire_len);
                raw.extend_from_slice(&tsval.to_be_bytes());
                raw.extend_from_slice(&tsecr.to_be_bytes());
            }
        }
    }

    while raw.len() % 4 != 0 {
        raw.push(0);
    }
    raw
}

fn too_small(probe: &Probe, layer: &str) -> HuginnNetProbeError {
    HuginnNetProbeError::UnexpectedPackage(format!(
        "buffer too small for {} {layer} header",
        probe.kind
    ))
}
