use crate::config::ProbeConfig;
use crate::error::HuginnNetProbeError;
use crate::packet_builder::PacketBuilder;
use crate::packet_parser::parse_ipv4_reply;
use crate::probe::{Probe, ProbeProtocol};
use crate::response::{ProbeResponse, ResponsePacket};
use pnet::datalink;
use pnet::packet::icmp::destination_unreachable::IcmpCodes;
use pnet::packet::icmp::IcmpTypes;
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::transport::TransportChannelType::Layer3;
use pnet::transport::{ipv4_packet_iter, transport_channel, TransportReceiver, TransportSender};
use std::net::{IpAddr, Ipv4Addr};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, trace};

const CHANNEL_BUFFER_SIZE: usize = 4096;

/// Capability to put probes on the wire and collect what comes back.
///
/// A timeout is not an error: it is reported as `Ok(None)`, because the absence of a reply
/// is itself part of the fingerprint. `Err` is reserved for failures of the transport.
pub trait PacketTransport: Send + Sync {
    /// Sends `probe` and waits up to `timeout` for the reply it elicits.
    fn send_and_receive_one(
        &self,
        probe: &Probe,
        timeout: Duration,
    ) -> Result<Option<ResponsePacket>, HuginnNetProbeError>;

    /// Sends `probe` without waiting for any reply.
    fn send_only(&self, probe: &Probe) -> Result<(), HuginnNetProbeError>;

    /// Sends each probe in turn, pausing `inter_packet_delay` between sends.
    ///
    /// The result holds exactly one entry per probe, in the same order; probes that got
    /// no reply are kept with an empty packet.
    fn send_and_receive_many(
        &self,
        probes: &[Probe],
        timeout: Duration,
        inter_packet_delay: Duration,
    ) -> Result<Vec<ProbeResponse>, HuginnNetProbeError> {
        let mut responses = Vec::with_capacity(probes.len());

        for (i, probe) in probes.iter().enumerate() {
            if i > 0 && !inter_packet_delay.is_zero() {
                thread::sleep(inter_packet_delay);
            }
            let sent_at = SystemTime::now();
            let started = Instant::now();
            let packet = self.send_and_receive_one(probe, timeout)?;
            responses.push(ProbeResponse {
                probe: probe.kind,
                sent_at,
                rtt: started.elapsed(),
                packet,
            });
        }

        Ok(responses)
    }
}

/// [`PacketTransport`] over raw IPv4 sockets with the IP header included.
///
/// Every call opens its own channel, so concurrent callers each see every reply and pick
/// out their own. Requires raw-socket privileges.
#[derive(Clone, Debug)]
pub struct RawSocketTransport {
    builder: PacketBuilder,
}

impl RawSocketTransport {
    pub fn new(source: Ipv4Addr, config: &ProbeConfig) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or_default();
        let builder = PacketBuilder::new(source, config.source_port)
            .with_sequence_base(seed)
            .with_identification_base((seed >> 16) as u16);

        Self { builder }
    }

    /// Picks the source address of the first usable interface for `target`.
    pub fn for_target(target: Ipv4Addr, config: &ProbeConfig) -> Result<Self, HuginnNetProbeError> {
        let source = source_address_for(target)?;
        debug!("Using source address {} for target {}", source, target);
        Ok(Self::new(source, config))
    }

    pub fn source(&self) -> Ipv4Addr {
        self.builder.source
    }

    fn send(&self, probe: &Probe) -> Result<(), HuginnNetProbeError> {
        let raw = self.builder.build(probe)?;
        let packet = Ipv4Packet::new(&raw).ok_or_else(|| {
            let reason = format!("{} is not a valid datagram", probe.kind);
            HuginnNetProbeError::UnexpectedPackage(reason)
        })?;

        let (mut tx, _) = open_channel(send_protocol(probe))?;
        tx.send_to(packet, IpAddr::V4(probe.destination)).map_err(|e| {
            error!("Failed to send {}: {}", probe.kind, e);
            HuginnNetProbeError::Transport(format!("failed to send {}: {e}", probe.kind))
        })?;
        trace!("Sent {} ({} bytes) to {}", probe.kind, raw.len(), probe.destination);
        Ok(())
    }
}

impl PacketTransport for RawSocketTransport {
    fn send_and_receive_one(
        &self,
        probe: &Probe,
        timeout: Duration,
    ) -> Result<Option<ResponsePacket>, HuginnNetProbeError> {
        // open the receiving side first so a fast reply is not missed
        let (_, mut rx) = open_channel(reply_protocol(probe))?;
        self.send(probe)?;

        let source_port = self.builder.source_port_for(probe);
        let deadline = Instant::now() + timeout;
        let mut replies = ipv4_packet_iter(&mut rx);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("No reply to {} within {:?}", probe.kind, timeout);
                return Ok(None);
            }

            match replies.next_with_timeout(remaining) {
                Ok(Some((packet, _addr))) => match parse_ipv4_reply(packet.packet()) {
                    Ok(reply) if reply_matches(probe, source_port, &reply) => {
                        trace!("Reply to {} from {}", probe.kind, reply.source);
                        return Ok(Some(reply));
                    }
                    Ok(_) => {}
                    Err(e) => trace!("Ignoring unparsable packet: {}", e),
                },
                Ok(None) => {
                    debug!("No reply to {} within {:?}", probe.kind, timeout);
                    return Ok(None);
                }
                Err(e) => {
                    error!("Receive failed while waiting for {}: {}", probe.kind, e);
                    return Err(HuginnNetProbeError::Transport(format!(
                        "receive failed for {}: {e}",
                        probe.kind
                    )));
                }
            }
        }
    }

    fn send_only(&self, probe: &Probe) -> Result<(), HuginnNetProbeError> {
        self.send(probe)
    }
}

/// Whether `reply` answers `probe`, sent from `source_port`.
///
/// TCP probes match on the port pair, echo requests on their identifier, and the UDP probe
/// on a port-unreachable error quoting the datagram it was sent as.
pub fn reply_matches(probe: &Probe, source_port: u16, reply: &ResponsePacket) -> bool {
    match &probe.protocol {
        ProbeProtocol::Tcp { port, .. } => reply.source == probe.destination
            && reply
                .tcp()
                .is_some_and(|tcp| tcp.source_port == *port && tcp.destination_port == source_port),
        ProbeProtocol::Icmp { identifier, .. } => reply.source == probe.destination
            && reply.icmp().is_some_and(|icmp| {
                icmp.icmp_type == IcmpTypes::EchoReply.0
                    && icmp.echo.is_some_and(|(id, _)| id == *identifier)
            }),
        ProbeProtocol::Udp { port } => reply.icmp().is_some_and(|icmp| {
            icmp.icmp_type == IcmpTypes::DestinationUnreachable.0
                && icmp.code == IcmpCodes::DestinationPortUnreachable.0
                && icmp.quoted.as_ref().is_some_and(|quoted| {
                    quoted.protocol == IpNextHeaderProtocols::Udp.0
                        && quoted.destination == probe.destination
                        && quoted.source_port == Some(source_port)
                        && quoted.destination_port == Some(*port)
                })
        }),
    }
}

fn send_protocol(probe: &Probe) -> IpNextHeaderProtocol {
    match probe.protocol {
        ProbeProtocol::Tcp { .. } => IpNextHeaderProtocols::Tcp,
        ProbeProtocol::Icmp { .. } => IpNextHeaderProtocols::Icmp,
        ProbeProtocol::Udp { .. } => IpNextHeaderProtocols::Udp,
    }
}

fn reply_protocol(probe: &Probe) -> IpNextHeaderProtocol {
    match probe.protocol {
        ProbeProtocol::Tcp { .. } => IpNextHeaderProtocols::Tcp,
        ProbeProtocol::Icmp { .. } | ProbeProtocol::Udp { .. } => IpNextHeaderProtocols::Icmp,
    }
}

fn open_channel(
    protocol: IpNextHeaderProtocol,
) -> Result<(TransportSender, TransportReceiver), HuginnNetProbeError> {
    transport_channel(CHANNEL_BUFFER_SIZE, Layer3(protocol)).map_err(|e| {
        error!("Unable to open raw channel: {}", e);
        HuginnNetProbeError::Transport(format!(
            "unable to open raw channel for protocol {}: {e}",
            protocol.0
        ))
    })
}

fn source_address_for(target: Ipv4Addr) -> Result<Ipv4Addr, HuginnNetProbeError> {
    let interfaces = datalink::interfaces();

    let candidates = interfaces
        .iter()
        .filter(|iface| iface.is_up() && iface.is_loopback() == target.is_loopback())
        .flat_map(|iface| iface.ips.iter())
        .filter_map(|network| match network.ip() {
            IpAddr::V4(addr) => Some((network.contains(IpAddr::V4(target)), addr)),
            IpAddr::V6(_) => None,
        });

    let mut fallback = None;
    for (same_network, addr) in candidates {
        if same_network {
            return Ok(addr);
        }
        fallback.get_or_insert(addr);
    }

    fallback.ok_or_else(|| {
        HuginnNetProbeError::Misconfiguration(format!(
            "no IPv4 interface available to reach {target}"
        ))
    })
}
