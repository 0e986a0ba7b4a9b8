use crate::probe::{IpFields, Probe, ProbeKind, ProbeProtocol, TcpProbeOption};
use pnet::packet::tcp::TcpFlags::{ACK, CWR, ECE, FIN, PSH, SYN, URG};
use std::net::Ipv4Addr;

const ICMP_ECHO_REQUEST: u8 = 8;
/// IP identification carried by the UDP probe.
pub const UDP_PROBE_IP_ID: u16 = 0x1042;
pub const UDP_PROBE_PAYLOAD_LEN: usize = 300;
const UDP_PROBE_FILL: u8 = b'C';

/// Builds the fixed probe battery for one target.
///
/// Construction is pure: the same target and ports always give the same probes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeBuilder {
    pub target: Ipv4Addr,
    pub open_port: u16,
    pub closed_port: u16,
}

/// Every probe of the battery, grouped by test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSet {
    pub sequence: Vec<Probe>,
    pub icmp_echo: Vec<Probe>,
    pub ecn: Probe,
    pub tcp: Vec<Probe>,
    pub udp: Probe,
}

impl ProbeSet {
    /// All probes in battery order (SEQ1-6, IE1-2, ECN, T2-T7, U1).
    pub fn iter(&self) -> impl Iterator<Item = &Probe> {
        self.sequence
            .iter()
            .chain(self.icmp_echo.iter())
            .chain(std::iter::once(&self.ecn))
            .chain(self.tcp.iter())
            .chain(std::iter::once(&self.udp))
    }
}

impl ProbeBuilder {
    pub fn new(target: Ipv4Addr, open_port: u16, closed_port: u16) -> Self {
        Self { target, open_port, closed_port }
    }

    pub fn build_all(&self) -> ProbeSet {
        ProbeSet {
            sequence: self.sequence_probes(),
            icmp_echo: self.icmp_echo_probes(),
            ecn: self.build(ProbeKind::Ecn),
            tcp: self.tcp_probes(),
            udp: self.build(ProbeKind::U1),
        }
    }

    /// The six SYN probes of the SEQ/OPS/WIN/T1 test, in send order.
    pub fn sequence_probes(&self) -> Vec<Probe> {
        ProbeKind::SEQUENCE.iter().map(|&kind| self.build(kind)).collect()
    }

    pub fn icmp_echo_probes(&self) -> Vec<Probe> {
        ProbeKind::ICMP_ECHO.iter().map(|&kind| self.build(kind)).collect()
    }

    /// T2 to T7.
    pub fn tcp_probes(&self) -> Vec<Probe> {
        ProbeKind::TCP_BATTERY.iter().map(|&kind| self.build(kind)).collect()
    }

    pub fn build(&self, kind: ProbeKind) -> Probe {
        match kind {
            ProbeKind::Seq1 => self.syn(kind, 1),
            ProbeKind::Seq2 => self.syn(kind, 63),
            ProbeKind::Seq3 => self.syn(kind, 4),
            ProbeKind::Seq4 => self.syn(kind, 4),
            ProbeKind::Seq5 => self.syn(kind, 16),
            ProbeKind::Seq6 => self.syn(kind, 512),
            ProbeKind::Ie1 => {
                let ip = IpFields { tos: 0, dont_fragment: true, identification: None };
                self.echo(kind, ip, 9, 12345, 295, 120)
            }
            ProbeKind::Ie2 => {
                let ip = IpFields { tos: 4, dont_fragment: false, identification: None };
                self.echo(kind, ip, 0, 12346, 296, 150)
            }
            ProbeKind::Ecn => self.tcp(
                kind,
                self.open_port,
                SYN | CWR | ECE,
                3,
                false,
                vec![
                    TcpProbeOption::WindowScale(10),
                    TcpProbeOption::Nop,
                    TcpProbeOption::Mss(1460),
                    TcpProbeOption::SackPermitted,
                    TcpProbeOption::Nop,
                    TcpProbeOption::Nop,
                ],
            ),
            ProbeKind::T2 => self.tcp(kind, self.open_port, 0, 128, true, battery_options(10)),
            ProbeKind::T3 => {
                let flags = SYN | FIN | URG | PSH;
                self.tcp(kind, self.open_port, flags, 256, false, battery_options(10))
            }
            ProbeKind::T4 => self.tcp(kind, self.open_port, ACK, 1024, true, battery_options(10)),
            ProbeKind::T5 => {
                self.tcp(kind, self.closed_port, SYN, 31337, false, battery_options(10))
            }
            ProbeKind::T6 => {
                self.tcp(kind, self.closed_port, ACK, 32768, true, battery_options(10))
            }
            ProbeKind::T7 => {
                self.tcp(kind, self.closed_port, FIN | PSH | URG, 65535, false, battery_options(15))
            }
            ProbeKind::U1 => Probe {
                kind,
                destination: self.target,
                protocol: ProbeProtocol::Udp { port: self.closed_port },
                ip: IpFields { identification: Some(UDP_PROBE_IP_ID), ..IpFields::default() },
                payload: vec![UDP_PROBE_FILL; UDP_PROBE_PAYLOAD_LEN],
            },
        }
    }

    fn syn(&self, kind: ProbeKind, window: u16) -> Probe {
        self.tcp(kind, self.open_port, SYN, window, false, sequence_options(kind))
    }

    fn tcp(
        &self,
        kind: ProbeKind,
        port: u16,
        flags: u8,
        window: u16,
        dont_fragment: bool,
        options: Vec<TcpProbeOption>,
    ) -> Probe {
        Probe {
            kind,
            destination: self.target,
            protocol: ProbeProtocol::Tcp { port, flags, window, options },
            ip: IpFields { dont_fragment, ..IpFields::default() },
            payload: Vec::new(),
        }
    }

    fn echo(
        &self,
        kind: ProbeKind,
        ip: IpFields,
        code: u8,
        identifier: u16,
        sequence: u16,
        payload_len: usize,
    ) -> Probe {
        Probe {
            kind,
            destination: self.target,
            protocol: ProbeProtocol::Icmp {
                icmp_type: ICMP_ECHO_REQUEST,
                code,
                identifier,
                sequence,
            },
            ip,
            payload: vec![0; payload_len],
        }
    }
}

fn sequence_options(kind: ProbeKind) -> Vec<TcpProbeOption> {
    use TcpProbeOption::*;
    let ts = TcpProbeOption::probe_timestamp();

    match kind {
        ProbeKind::Seq1 => vec![WindowScale(10), Nop, Mss(1460), ts, SackPermitted],
        ProbeKind::Seq2 => vec![Mss(1400), WindowScale(0), SackPermitted, ts, Eol],
        ProbeKind::Seq3 => vec![ts, Nop, Nop, WindowScale(5), Nop, Mss(640)],
        ProbeKind::Seq4 => vec![SackPermitted, ts, WindowScale(10), Eol],
        ProbeKind::Seq5 => vec![Mss(536), SackPermitted, ts, WindowScale(10), Eol],
        ProbeKind::Seq6 => vec![Mss(265), SackPermitted, ts],
        _ => Vec::new(),
    }
}

/// Options shared by T2-T7, which differ only in the window scale.
fn battery_options(window_scale: u8) -> Vec<TcpProbeOption> {
    vec![
        TcpProbeOption::WindowScale(window_scale),
        TcpProbeOption::Nop,
        TcpProbeOption::Mss(265),
        TcpProbeOption::probe_timestamp(),
        TcpProbeOption::SackPermitted,
    ]
}
