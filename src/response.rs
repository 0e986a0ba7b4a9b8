use crate::probe::ProbeKind;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

/// A TCP option as found on a reply, in wire order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObservedTcpOption {
    Eol,
    Nop,
    Mss(u16),
    WindowScale(u8),
    SackPermitted,
    /// Selective acknowledgement blocks as (left edge, right edge).
    Sack(Vec<(u32, u32)>),
    Timestamp { tsval: u32, tsecr: u32 },
    Unknown(u8),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpReply {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub flags: u8,
    pub window: u16,
    pub options: Vec<ObservedTcpOption>,
}

impl TcpReply {
    /// TSval of the first timestamp option, if the reply carried one.
    pub fn tsval(&self) -> Option<u32> {
        self.options.iter().find_map(|option| match option {
            ObservedTcpOption::Timestamp { tsval, .. } => Some(*tsval),
            _ => None,
        })
    }
}

/// Header of the datagram quoted inside an ICMP error message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotedDatagram {
    pub protocol: u8,
    pub destination: Ipv4Addr,
    pub ip_id: u16,
    /// Transport ports, when the quote is long enough and the protocol has them.
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IcmpReply {
    pub icmp_type: u8,
    pub code: u8,
    /// Echo identifier and sequence, for echo replies.
    pub echo: Option<(u16, u16)>,
    pub quoted: Option<QuotedDatagram>,
    pub payload_len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyLayer {
    Tcp(TcpReply),
    Icmp(IcmpReply),
    /// Any other IP protocol, by number.
    Other(u8),
}

/// The observable fields of one IPv4 reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponsePacket {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub ip_id: u16,
    pub dont_fragment: bool,
    pub tos: u8,
    pub layer: ReplyLayer,
}

impl ResponsePacket {
    pub fn tcp(&self) -> Option<&TcpReply> {
        match &self.layer {
            ReplyLayer::Tcp(tcp) => Some(tcp),
            _ => None,
        }
    }

    pub fn icmp(&self) -> Option<&IcmpReply> {
        match &self.layer {
            ReplyLayer::Icmp(icmp) => Some(icmp),
            _ => None,
        }
    }
}

/// What came back for one probe.
///
/// A probe that elicited nothing is still represented, with `packet` set to `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResponse {
    pub probe: ProbeKind,
    /// Wall-clock time taken immediately before the probe was handed to the transport.
    pub sent_at: SystemTime,
    /// Time spent in the send-and-wait call.
    pub rtt: Duration,
    pub packet: Option<ResponsePacket>,
}

impl ProbeResponse {
    pub fn is_answered(&self) -> bool {
        self.packet.is_some()
    }

    pub fn tcp(&self) -> Option<&TcpReply> {
        self.packet.as_ref().and_then(ResponsePacket::tcp)
    }
}
