use crate::error::HuginnNetProbeError;
use crate::response::{
    IcmpReply, ObservedTcpOption, QuotedDatagram, ReplyLayer, ResponsePacket, TcpReply,
};
use pnet::packet::icmp::{echo_reply::EchoReplyPacket, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{Ipv4Flags, Ipv4Packet};
use pnet::packet::tcp::{TcpOptionNumbers::*, TcpOptionPacket, TcpPacket};
use pnet::packet::{Packet, PacketSize};

/// Parses a raw IPv4 datagram (starting at the IP header) into its observable fields.
pub fn parse_ipv4_reply(raw: &[u8]) -> Result<ResponsePacket, HuginnNetProbeError> {
    let ip = Ipv4Packet::new(raw).ok_or_else(|| {
        HuginnNetProbeError::UnexpectedPackage("IPv4 packet too short".to_string())
    })?;
    if ip.get_version() != 4 {
        return Err(HuginnNetProbeError::UnexpectedPackage(format!(
            "IP version {} is not supported",
            ip.get_version()
        )));
    }

    let protocol = ip.get_next_level_protocol();
    let layer = match protocol {
        IpNextHeaderProtocols::Tcp => ReplyLayer::Tcp(parse_tcp(ip.payload())?),
        IpNextHeaderProtocols::Icmp => ReplyLayer::Icmp(parse_icmp(ip.payload())?),
        other => ReplyLayer::Other(other.0),
    };

    Ok(ResponsePacket {
        source: ip.get_source(),
        destination: ip.get_destination(),
        ttl: ip.get_ttl(),
        ip_id: ip.get_identification(),
        dont_fragment: ip.get_flags() & Ipv4Flags::DontFragment != 0,
        tos: (ip.get_dscp() << 2) | ip.get_ecn(),
        layer,
    })
}

pub fn parse_tcp(raw: &[u8]) -> Result<TcpReply, HuginnNetProbeError> {
    let tcp = TcpPacket::new(raw).ok_or_else(|| {
        HuginnNetProbeError::UnexpectedPackage("TCP segment too short".to_string())
    })?;

    Ok(TcpReply {
        source_port: tcp.get_source(),
        destination_port: tcp.get_destination(),
        sequence: tcp.get_sequence(),
        acknowledgement: tcp.get_acknowledgement(),
        flags: tcp.get_flags(),
        window: tcp.get_window(),
        options: parse_tcp_options(tcp.get_options_raw()),
    })
}

/// Walks raw TCP option bytes in order. Truncated options end the walk.
pub fn parse_tcp_options(raw: &[u8]) -> Vec<ObservedTcpOption> {
    let mut buf = raw;
    let mut options = vec![];

    while let Some(opt) = TcpOptionPacket::new(buf) {
        let size = opt.packet_size();
        if size == 0 || size > buf.len() {
            break;
        }
        buf = &buf[size..];

        let data: &[u8] = opt.payload();

        let option = match opt.get_number() {
            EOL => ObservedTcpOption::Eol,
            NOP => ObservedTcpOption::Nop,
            MSS => match data {
                [hi, lo, ..] => ObservedTcpOption::Mss(u16::from_be_bytes([*hi, *lo])),
                _ => break,
            },
            WSCALE => match data.first() {
                Some(scale) => ObservedTcpOption::WindowScale(*scale),
                None => break,
            },
            SACK_PERMITTED => ObservedTcpOption::SackPermitted,
            SACK => ObservedTcpOption::Sack(
                data.chunks_exact(8)
                    .map(|block| {
                        (
                            u32::from_be_bytes([block[0], block[1], block[2], block[3]]),
                            u32::from_be_bytes([block[4], block[5], block[6], block[7]]),
                        )
                    })
                    .collect(),
            ),
            TIMESTAMPS => match data {
                [a, b, c, d, e, f, g, h, ..] => ObservedTcpOption::Timestamp {
                    tsval: u32::from_be_bytes([*a, *b, *c, *d]),
                    tsecr: u32::from_be_bytes([*e, *f, *g, *h]),
                },
                _ => break,
            },
            other => ObservedTcpOption::Unknown(other.0),
        };

        let end_of_list = option == ObservedTcpOption::Eol;
        options.push(option);
        if end_of_list {
            break;
        }
    }

    options
}

pub fn parse_icmp(raw: &[u8]) -> Result<IcmpReply, HuginnNetProbeError> {
    let icmp = IcmpPacket::new(raw).ok_or_else(|| {
        HuginnNetProbeError::UnexpectedPackage("ICMP message too short".to_string())
    })?;

    let icmp_type = icmp.get_icmp_type();
    let echo = if icmp_type == IcmpTypes::EchoReply {
        EchoReplyPacket::new(raw)
            .map(|reply| (reply.get_identifier(), reply.get_sequence_number()))
    } else {
        None
    };

    // error messages carry 4 unused bytes, then the offending datagram
    let quoted = if icmp_type == IcmpTypes::DestinationUnreachable
        || icmp_type == IcmpTypes::TimeExceeded
    {
        icmp.payload().get(4..).and_then(parse_quoted)
    } else {
        None
    };

    Ok(IcmpReply {
        icmp_type: icmp_type.0,
        code: icmp.get_icmp_code().0,
        echo,
        quoted,
        payload_len: icmp.payload().len(),
    })
}

fn parse_quoted(raw: &[u8]) -> Option<QuotedDatagram> {
    let ip = Ipv4Packet::new(raw)?;
    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < Ipv4Packet::minimum_packet_size() {
        return None;
    }
    // routers may quote fewer than the 8 transport bytes
    let transport = raw.get(header_len..).unwrap_or_default();
    let port_at = |offset: usize| match ip.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp | IpNextHeaderProtocols::Udp => transport
            .get(offset..offset + 2)
            .map(|port| u16::from_be_bytes([port[0], port[1]])),
        _ => None,
    };

    Some(QuotedDatagram {
        protocol: ip.get_next_level_protocol().0,
        destination: ip.get_destination(),
        ip_id: ip.get_identification(),
        source_port: port_at(0),
        destination_port: port_at(2),
    })
}
