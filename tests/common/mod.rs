#![allow(dead_code)]

use huginn_net_probe::response::IcmpReply;
use huginn_net_probe::{
    HuginnNetProbeError, ObservedTcpOption, PacketTransport, Probe, ProbeKind, ProbeProtocol,
    ReplyLayer, ResponsePacket, TcpReply,
};
use pnet::packet::tcp::TcpFlags::{ACK, SYN};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub const TARGET: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 10);
pub const SOURCE: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
pub const OPEN_PORT: u16 = 80;
pub const CLOSED_PORT: u16 = 1;

type Responder =
    dyn Fn(&Probe) -> Result<Option<ResponsePacket>, HuginnNetProbeError> + Send + Sync;

/// In-memory transport answering each probe through a closure.
pub struct MockTransport {
    responder: Box<Responder>,
    delay: Duration,
    sent: Mutex<Vec<ProbeKind>>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Probe) -> Result<Option<ResponsePacket>, HuginnNetProbeError>
            + Send
            + Sync
            + 'static,
    {
        Self { responder: Box::new(responder), delay: Duration::ZERO, sent: Mutex::new(vec![]) }
    }

    /// Never answers.
    pub fn silent() -> Self {
        Self::new(|_| Ok(None))
    }

    /// Holds every call for `delay`, whatever timeout the caller asked for.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn sent(&self) -> Vec<ProbeKind> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(e) => panic!("sent probes lock poisoned: {e}"),
        }
    }

    fn record(&self, probe: &Probe) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(probe.kind);
        }
    }
}

impl PacketTransport for MockTransport {
    fn send_and_receive_one(
        &self,
        probe: &Probe,
        _timeout: Duration,
    ) -> Result<Option<ResponsePacket>, HuginnNetProbeError> {
        self.record(probe);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        (self.responder)(probe)
    }

    fn send_only(&self, probe: &Probe) -> Result<(), HuginnNetProbeError> {
        self.record(probe);
        Ok(())
    }
}

pub fn tcp_reply(
    probe: &Probe,
    isn: u32,
    ip_id: u16,
    options: Vec<ObservedTcpOption>,
) -> ResponsePacket {
    ResponsePacket {
        source: probe.destination,
        destination: SOURCE,
        ttl: 64,
        ip_id,
        dont_fragment: true,
        tos: 0,
        layer: ReplyLayer::Tcp(TcpReply {
            source_port: probe.port().unwrap_or_default(),
            destination_port: 54433,
            sequence: isn,
            acknowledgement: 1,
            flags: SYN | ACK,
            window: 5840,
            options,
        }),
    }
}

pub fn echo_reply(probe: &Probe, ip_id: u16) -> ResponsePacket {
    let echo = match probe.protocol {
        ProbeProtocol::Icmp { identifier, sequence, .. } => Some((identifier, sequence)),
        _ => None,
    };

    ResponsePacket {
        source: probe.destination,
        destination: SOURCE,
        ttl: 64,
        ip_id,
        dont_fragment: false,
        tos: 0,
        layer: ReplyLayer::Icmp(IcmpReply {
            icmp_type: 0,
            code: 0,
            echo,
            quoted: None,
            payload_len: 4 + probe.payload.len(),
        }),
    }
}

/// ISN of a counter-based stack: +1000 per sequence probe.
pub fn counter_isn(kind: ProbeKind) -> u32 {
    5000 + 1000 * kind.index() as u32
}

/// A stack with a global +1 IP ID counter, ISNs from [`counter_isn`], MSS 1460 and no
/// timestamps. Only sequence probes and ICMP echoes are answered.
pub fn counter_based_stack() -> MockTransport {
    let ip_id = AtomicU16::new(100);

    MockTransport::new(move |probe| match probe.protocol {
        ProbeProtocol::Tcp { .. } if probe.kind.is_sequence() => {
            let id = ip_id.fetch_add(1, Ordering::SeqCst);
            let options = vec![ObservedTcpOption::Mss(1460)];
            Ok(Some(tcp_reply(probe, counter_isn(probe.kind), id, options)))
        }
        ProbeProtocol::Icmp { .. } => {
            let id = ip_id.fetch_add(1, Ordering::SeqCst);
            Ok(Some(echo_reply(probe, id)))
        }
        _ => Ok(None),
    })
}
