#![forbid(unsafe_code)]

//! # huginn-net-probe
//!
//! Active TCP/IP stack fingerprinting.
//!
//! A fixed battery of probes is sent to a target, and the replies are reduced to a
//! signature of classification codes:
//! - ISN greatest common divisor, counter rate and predictability
//! - IP ID generation class for TCP and ICMP replies, and whether they share a counter
//! - TCP timestamp option class
//! - TCP options string
//!
//! The signature can be looked up in a static OS fingerprint table.

pub mod config;
pub mod db;
pub mod db_parse;
pub mod display;
pub mod error;
pub mod ip_id;
pub mod isn;
pub mod output;
pub mod packet_builder;
pub mod packet_parser;
pub mod probe;
pub mod probe_builder;
pub mod response;
pub mod signature;
pub mod signature_matcher;
pub mod tcp_options;
pub mod timed_prober;
pub mod timestamp;
pub mod transport;

// Re-exports
pub use config::ProbeConfig;
pub use db::{Database, Label, Type};
pub use error::HuginnNetProbeError;
pub use ip_id::{classify_ip_ids, shared_sequence, IpIdClass, SharedSequence};
pub use isn::{calculate_gcd, calculate_isr, calculate_sp, GcdAnalysis, IsrAnalysis};
pub use output::{FingerprintResult, OperativeSystem, NO_MATCH};
pub use probe::{IpFields, Probe, ProbeKind, ProbeProtocol, TcpProbeOption};
pub use probe_builder::{ProbeBuilder, ProbeSet};
pub use response::{ObservedTcpOption, ProbeResponse, ReplyLayer, ResponsePacket, TcpReply};
pub use signature::{Analysis, AnalysisFailure, IpIdSource, Signature};
pub use signature_matcher::SignatureMatcher;
pub use tcp_options::encode_options;
pub use timed_prober::{SequenceSample, SequenceSeries, TimedProber};
pub use timestamp::{classify_timestamps, TimestampClass};
pub use transport::{PacketTransport, RawSocketTransport};

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// An active OS fingerprinting engine.
///
/// The `HuginnNetProbe` struct sends the probe battery through a [`PacketTransport`],
/// derives the signature from the replies and optionally matches it against a database.
pub struct HuginnNetProbe<'a> {
    pub matcher: Option<SignatureMatcher<'a>>,
    transport: Arc<dyn PacketTransport>,
    config: ProbeConfig,
    cancel_signal: Option<Arc<AtomicBool>>,
}

impl<'a> HuginnNetProbe<'a> {
    /// Creates a new instance of `HuginnNetProbe` with the default configuration.
    ///
    /// # Parameters
    /// - `transport`: Sends probes and collects replies
    /// - `database`: Optional signature database for OS matching
    pub fn new(
        transport: Arc<dyn PacketTransport>,
        database: Option<&'a Database>,
    ) -> Result<Self, HuginnNetProbeError> {
        Self::with_config(transport, database, ProbeConfig::default())
    }

    /// Creates a new instance of `HuginnNetProbe` with the given configuration.
    ///
    /// # Returns
    /// `Misconfiguration` if `config` does not validate.
    pub fn with_config(
        transport: Arc<dyn PacketTransport>,
        database: Option<&'a Database>,
        config: ProbeConfig,
    ) -> Result<Self, HuginnNetProbeError> {
        config.validate()?;
        let matcher = database.map(SignatureMatcher::new);

        Ok(Self { matcher, transport, config, cancel_signal: None })
    }

    /// Stops a running fingerprint as soon as `cancel_signal` is set.
    pub fn with_cancel_signal(mut self, cancel_signal: Arc<AtomicBool>) -> Self {
        self.cancel_signal = Some(cancel_signal);
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Fingerprints `target` using one port known to be open and one known to be closed.
    ///
    /// Sub-analyses that cannot be computed do not fail the run: they are listed in
    /// [`FingerprintResult::failures`]. The run itself fails on transport errors and on
    /// cancellation.
    pub fn fingerprint(
        &self,
        target: Ipv4Addr,
        open_port: u16,
        closed_port: u16,
    ) -> Result<FingerprintResult, HuginnNetProbeError> {
        let started = Instant::now();
        let probes = ProbeBuilder::new(target, open_port, closed_port).build_all();
        info!(
            "Fingerprinting {} (open port {}, closed port {})",
            target, open_port, closed_port
        );

        let prober = TimedProber::new(Arc::clone(&self.transport), self.config.clone());
        let series = prober.run(&probes.sequence, self.cancel_signal.as_ref())?;
        if series.cancelled {
            warn!("Process stopped after {} sequence replies", series.len());
            return Err(HuginnNetProbeError::Cancelled);
        }
        self.check_cancelled()?;

        let echo_replies = self.transport.send_and_receive_many(
            &probes.icmp_echo,
            self.config.reply_timeout,
            self.config.inter_packet_delay,
        )?;
        let icmp_ids: Vec<u16> = echo_replies
            .iter()
            .filter_map(|response| response.packet.as_ref())
            .filter(|packet| packet.icmp().is_some())
            .map(|packet| packet.ip_id)
            .collect();

        let mut replies = series.responses.clone();
        replies.extend(echo_replies);
        for probe in std::iter::once(&probes.ecn).chain(probes.tcp.iter()).chain([&probes.udp]) {
            self.check_cancelled()?;
            replies.extend(self.transport.send_and_receive_many(
                std::slice::from_ref(probe),
                self.config.reply_timeout,
                self.config.inter_packet_delay,
            )?);
        }

        let (signature, failures) = analyze(&series, &icmp_ids);
        info!("Signature for {}: {}", target, signature);

        let os = self.matcher.as_ref().and_then(|matcher| {
            let matched = matcher.matching_by_signature(&signature);
            match matched {
                Some((label, _)) => debug!("Matched {}", label),
                None => debug!("{}", NO_MATCH),
            }
            matched.map(|(label, _)| OperativeSystem::from(label))
        });

        Ok(FingerprintResult {
            target,
            open_port,
            closed_port,
            signature,
            failures,
            replies,
            os,
            duration: started.elapsed(),
        })
    }

    fn check_cancelled(&self) -> Result<(), HuginnNetProbeError> {
        if let Some(ref cancel) = self.cancel_signal {
            if cancel.load(Ordering::Relaxed) {
                warn!("Process stopped");
                return Err(HuginnNetProbeError::Cancelled);
            }
        }
        Ok(())
    }
}

/// Runs every sub-analysis over the collected data, in signature order.
///
/// Returns the signature with every code that could be computed, and one failure per code
/// that could not.
pub fn analyze(series: &SequenceSeries, icmp_ids: &[u16]) -> (Signature, Vec<AnalysisFailure>) {
    let mut signature = Signature::default();
    let mut failures = Vec::new();
    let mut fail = |analysis: Analysis, error: HuginnNetProbeError| {
        let failure = AnalysisFailure::from_error(analysis, &error);
        warn!("{}", failure);
        failures.push(failure);
    };

    let gcd = calculate_gcd(&series.isns()).map_err(|e| fail(Analysis::Gcd, e)).ok();
    signature.gcd = gcd.as_ref().map(|analysis| analysis.gcd);

    let isr = match &gcd {
        Some(gcd) => {
            calculate_isr(&gcd.diff1, &series.times()).map_err(|e| fail(Analysis::Isr, e)).ok()
        }
        None => {
            fail(Analysis::Isr, unavailable(Analysis::Isr, "ISN differences are unavailable"));
            None
        }
    };
    signature.isr = isr.as_ref().map(|analysis| analysis.isr);

    signature.sp = match (&gcd, &isr) {
        (Some(gcd), Some(isr)) => {
            calculate_sp(&isr.seq_rates, gcd.gcd).map_err(|e| fail(Analysis::Sp, e)).ok()
        }
        _ => {
            fail(Analysis::Sp, unavailable(Analysis::Sp, "sequence rates are unavailable"));
            None
        }
    };

    let tcp_ids = series.ip_ids();
    signature.ti = classify_ip_ids(&tcp_ids, IpIdSource::Tcp)
        .map_err(|e| fail(Analysis::IpId(IpIdSource::Tcp), e))
        .ok();
    signature.ii = classify_ip_ids(icmp_ids, IpIdSource::Icmp)
        .map_err(|e| fail(Analysis::IpId(IpIdSource::Icmp), e))
        .ok();

    signature.ss = match (signature.ti, signature.ii) {
        (Some(ti), Some(ii)) => shared_sequence(&tcp_ids, icmp_ids, ti, ii)
            .map_err(|e| fail(Analysis::SharedSequence, e))
            .ok()
            .flatten(),
        _ => {
            let reason = "TI and II are both required";
            fail(Analysis::SharedSequence, unavailable(Analysis::SharedSequence, reason));
            None
        }
    };

    signature.ts = classify_timestamps(&series.timestamps(), &series.intervals())
        .map_err(|e| fail(Analysis::Timestamp, e))
        .ok();

    signature.options = match series.first_options() {
        Some(options) => Some(encode_options(options)),
        None => {
            let reason = "no sequence probe got a TCP reply";
            fail(Analysis::TcpOptions, unavailable(Analysis::TcpOptions, reason));
            None
        }
    };

    (signature, failures)
}

/// An analysis skipped because an earlier one produced nothing to work on.
fn unavailable(analysis: Analysis, reason: &str) -> HuginnNetProbeError {
    HuginnNetProbeError::insufficient(analysis, reason)
}
