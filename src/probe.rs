use std::fmt;
use std::net::Ipv4Addr;

/// TSval carried by every probe timestamp option.
pub const PROBE_TSVAL: u32 = 0xFFFF_FFFF;
/// TSecr carried by every probe timestamp option.
pub const PROBE_TSECR: u32 = 0;

/// Identifies one probe of the fixed battery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Seq1,
    Seq2,
    Seq3,
    Seq4,
    Seq5,
    Seq6,
    Ie1,
    Ie2,
    Ecn,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    U1,
}

impl ProbeKind {
    pub const SEQUENCE: [Self; 6] =
        [Self::Seq1, Self::Seq2, Self::Seq3, Self::Seq4, Self::Seq5, Self::Seq6];

    pub const ICMP_ECHO: [Self; 2] = [Self::Ie1, Self::Ie2];

    pub const TCP_BATTERY: [Self; 6] = [Self::T2, Self::T3, Self::T4, Self::T5, Self::T6, Self::T7];

    pub const VALUES: [Self; 16] = [
        Self::Seq1,
        Self::Seq2,
        Self::Seq3,
        Self::Seq4,
        Self::Seq5,
        Self::Seq6,
        Self::Ie1,
        Self::Ie2,
        Self::Ecn,
        Self::T2,
        Self::T3,
        Self::T4,
        Self::T5,
        Self::T6,
        Self::T7,
        Self::U1,
    ];

    pub fn name(&self) -> &'static str {
        match *self {
            ProbeKind::Seq1 => "SEQ1",
            ProbeKind::Seq2 => "SEQ2",
            ProbeKind::Seq3 => "SEQ3",
            ProbeKind::Seq4 => "SEQ4",
            ProbeKind::Seq5 => "SEQ5",
            ProbeKind::Seq6 => "SEQ6",
            ProbeKind::Ie1 => "IE1",
            ProbeKind::Ie2 => "IE2",
            ProbeKind::Ecn => "ECN",
            ProbeKind::T2 => "T2",
            ProbeKind::T3 => "T3",
            ProbeKind::T4 => "T4",
            ProbeKind::T5 => "T5",
            ProbeKind::T6 => "T6",
            ProbeKind::T7 => "T7",
            ProbeKind::U1 => "U1",
        }
    }

    /// Position in the battery, from 0 (SEQ1) to 15 (U1).
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_sequence(&self) -> bool {
        Self::SEQUENCE.contains(self)
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A TCP option as placed on an outgoing probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TcpProbeOption {
    Eol,
    Nop,
    Mss(u16),
    WindowScale(u8),
    SackPermitted,
    Timestamp { tsval: u32, tsecr: u32 },
}

impl TcpProbeOption {
    /// The timestamp option used by every probe: TSval=0xFFFFFFFF, TSecr=0.
    pub const fn probe_timestamp() -> Self {
        TcpProbeOption::Timestamp { tsval: PROBE_TSVAL, tsecr: PROBE_TSECR }
    }

    /// Option kind number as defined by IANA.
    pub fn number(&self) -> u8 {
        match *self {
            TcpProbeOption::Eol => 0,
            TcpProbeOption::Nop => 1,
            TcpProbeOption::Mss(_) => 2,
            TcpProbeOption::WindowScale(_) => 3,
            TcpProbeOption::SackPermitted => 4,
            TcpProbeOption::Timestamp { .. } => 8,
        }
    }

    /// Size of the option on the wire, kind and length bytes included.
    pub fn wire_len(&self) -> usize {
        match *self {
            TcpProbeOption::Eol | TcpProbeOption::Nop => 1,
            TcpProbeOption::Mss(_) => 4,
            TcpProbeOption::WindowScale(_) => 3,
            TcpProbeOption::SackPermitted => 2,
            TcpProbeOption::Timestamp { .. } => 10,
        }
    }
}

/// IP-level fields stamped on a probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpFields {
    pub tos: u8,
    pub dont_fragment: bool,
    /// Fixed identification, or `None` to let the transport choose one.
    pub identification: Option<u16>,
}

impl Default for IpFields {
    fn default() -> Self {
        Self { tos: 0, dont_fragment: false, identification: None }
    }
}

/// Transport-layer description of a probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeProtocol {
    Tcp { port: u16, flags: u8, window: u16, options: Vec<TcpProbeOption> },
    Icmp { icmp_type: u8, code: u8, identifier: u16, sequence: u16 },
    Udp { port: u16 },
}

/// An immutable description of one diagnostic packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Probe {
    pub kind: ProbeKind,
    pub destination: Ipv4Addr,
    pub protocol: ProbeProtocol,
    pub ip: IpFields,
    pub payload: Vec<u8>,
}

impl Probe {
    /// Destination port for TCP and UDP probes.
    pub fn port(&self) -> Option<u16> {
        match self.protocol {
            ProbeProtocol::Tcp { port, .. } | ProbeProtocol::Udp { port } => Some(port),
            ProbeProtocol::Icmp { .. } => None,
        }
    }

    pub fn tcp_flags(&self) -> Option<u8> {
        match self.protocol {
            ProbeProtocol::Tcp { flags, .. } => Some(flags),
            _ => None,
        }
    }

    pub fn window(&self) -> Option<u16> {
        match self.protocol {
            ProbeProtocol::Tcp { window, .. } => Some(window),
            _ => None,
        }
    }

    pub fn tcp_options(&self) -> &[TcpProbeOption] {
        match &self.protocol {
            ProbeProtocol::Tcp { options, .. } => options,
            _ => &[],
        }
    }
}
