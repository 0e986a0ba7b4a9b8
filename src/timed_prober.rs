use crate::config::ProbeConfig;
use crate::error::HuginnNetProbeError;
use crate::probe::{Probe, ProbeKind};
use crate::response::{ObservedTcpOption, ProbeResponse};
use crate::transport::PacketTransport;
use crossbeam::channel::{self, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, trace, warn};

/// Granularity at which waits re-check the cancel signal.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One TCP reply to a sequence probe.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceSample {
    pub probe: ProbeKind,
    /// Initial sequence number chosen by the target.
    pub isn: u32,
    /// Seconds from the prober's reference start to the reply's arrival.
    pub time: f64,
    pub ip_id: u16,
    pub tsval: Option<u32>,
    pub options: Vec<ObservedTcpOption>,
}

/// Data collected by one run of the [`TimedProber`].
///
/// Samples are kept in the order replies were recorded, which is not necessarily probe
/// order. Every per-field view (`isns`, `times`, ...) is taken from the same samples, so
/// entry `i` of one view always belongs with entry `i` of another.
#[derive(Clone, Debug, Default)]
pub struct SequenceSeries {
    samples: Vec<SequenceSample>,
    /// One entry per dispatched probe, in probe order; unanswered probes have no packet.
    pub responses: Vec<ProbeResponse>,
    /// The run was interrupted before every worker reported back.
    pub cancelled: bool,
    /// Some workers had not reported back when the join timeout elapsed.
    pub timed_out: bool,
}

impl SequenceSeries {
    /// Builds a series from samples gathered elsewhere, e.g. replayed from a capture.
    pub fn from_samples(samples: Vec<SequenceSample>) -> Self {
        Self { samples, ..Self::default() }
    }

    pub fn samples(&self) -> &[SequenceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn isns(&self) -> Vec<u32> {
        self.samples.iter().map(|sample| sample.isn).collect()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|sample| sample.time).collect()
    }

    pub fn ip_ids(&self) -> Vec<u16> {
        self.samples.iter().map(|sample| sample.ip_id).collect()
    }

    pub fn timestamps(&self) -> Vec<Option<u32>> {
        self.samples.iter().map(|sample| sample.tsval).collect()
    }

    /// Time elapsed between consecutive samples.
    pub fn intervals(&self) -> Vec<f64> {
        self.samples.windows(2).map(|pair| pair[1].time - pair[0].time).collect()
    }

    /// Options of the earliest recorded reply.
    pub fn first_options(&self) -> Option<&[ObservedTcpOption]> {
        self.samples.first().map(|sample| sample.options.as_slice())
    }
}

#[derive(Default)]
struct Collector {
    samples: Vec<SequenceSample>,
    responses: Vec<Option<ProbeResponse>>,
    /// Set once the prober stops waiting; later reports are dropped.
    closed: bool,
}

/// Sends the sequence probes on a fixed cadence, one worker thread per probe.
///
/// Probe `i` is launched `i * sequence_interval` after a single reference start, so a slow
/// reply never delays the following launches.
pub struct TimedProber {
    transport: Arc<dyn PacketTransport>,
    config: ProbeConfig,
}

impl TimedProber {
    pub fn new(transport: Arc<dyn PacketTransport>, config: ProbeConfig) -> Self {
        Self { transport, config }
    }

    /// Runs the probes and returns whatever was collected.
    ///
    /// Returns early with `cancelled` set when `cancel_signal` is raised; samples recorded
    /// before that point are kept. A transport failure in any worker is returned as an error.
    pub fn run(
        &self,
        probes: &[Probe],
        cancel_signal: Option<&Arc<AtomicBool>>,
    ) -> Result<SequenceSeries, HuginnNetProbeError> {
        let collector = Arc::new(Mutex::new(Collector {
            responses: vec![None; probes.len()],
            ..Collector::default()
        }));
        let (done_tx, done_rx) = channel::unbounded::<Result<(), HuginnNetProbeError>>();

        let start = Instant::now();
        let wall_start = SystemTime::now();
        let mut launched = 0;
        let mut cancelled = false;

        for (index, probe) in probes.iter().enumerate() {
            let launch_at = start + self.config.sequence_interval * index as u32;
            if !wait_until(launch_at, cancel_signal) {
                debug!("Cancellation signal received, stopping probe dispatch");
                cancelled = true;
                break;
            }

            let worker = Worker {
                index,
                probe: probe.clone(),
                transport: Arc::clone(&self.transport),
                timeout: self.config.reply_timeout,
                start,
                collector: Arc::clone(&collector),
            };
            let done = done_tx.clone();
            thread::Builder::new()
                .name(format!("probe-{}", probe.kind.name().to_lowercase()))
                .spawn(move || {
                    let result = worker.run();
                    // the prober may have stopped listening
                    let _ = done.send(result);
                })
                .map_err(|e| {
                    HuginnNetProbeError::Transport(format!("failed to spawn probe worker: {e}"))
                })?;
            launched += 1;
        }
        drop(done_tx);

        let mut first_error = None;
        let mut completed = 0;
        let deadline = Instant::now() + self.config.join_timeout;

        while completed < launched && !cancelled {
            if is_cancelled(cancel_signal) {
                debug!("Cancellation signal received, no longer waiting for replies");
                cancelled = true;
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match done_rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(Ok(())) => completed += 1,
                Ok(Err(e)) => {
                    completed += 1;
                    error!("Sequence probe failed: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let timed_out = completed < launched && !cancelled;
        if timed_out {
            warn!(
                "{} of {} sequence probes still pending after {:?}",
                launched - completed,
                launched,
                self.config.join_timeout
            );
        }

        let mut state = lock(&collector)?;
        state.closed = true;
        let samples = std::mem::take(&mut state.samples);
        let responses = std::mem::take(&mut state.responses);
        drop(state);

        if let Some(e) = first_error {
            return Err(e);
        }

        let responses = responses
            .into_iter()
            .zip(probes)
            .enumerate()
            .map(|(index, (response, probe))| {
                response.unwrap_or_else(|| ProbeResponse {
                    probe: probe.kind,
                    sent_at: wall_start + self.config.sequence_interval * index as u32,
                    rtt: Duration::ZERO,
                    packet: None,
                })
            })
            .collect();

        debug!("Collected {} sequence samples from {} probes", samples.len(), probes.len());

        Ok(SequenceSeries { samples, responses, cancelled, timed_out })
    }
}

struct Worker {
    index: usize,
    probe: Probe,
    transport: Arc<dyn PacketTransport>,
    timeout: Duration,
    start: Instant,
    collector: Arc<Mutex<Collector>>,
}

impl Worker {
    fn run(self) -> Result<(), HuginnNetProbeError> {
        let sent_at = SystemTime::now();
        let before = Instant::now();
        trace!("Sending {}", self.probe.kind);
        let packet = self.transport.send_and_receive_one(&self.probe, self.timeout)?;
        let rtt = before.elapsed();

        let mut state = lock(&self.collector)?;
        if state.closed {
            debug!("Dropping late reply to {}", self.probe.kind);
            return Ok(());
        }
        // stamped under the lock so samples are recorded in time order
        let time = self.start.elapsed().as_secs_f64();
        let sample = packet.as_ref().and_then(|reply| {
            reply.tcp().map(|tcp| SequenceSample {
                probe: self.probe.kind,
                isn: tcp.sequence,
                time,
                ip_id: reply.ip_id,
                tsval: tcp.tsval(),
                options: tcp.options.clone(),
            })
        });
        if let Some(sample) = sample {
            trace!("{} answered with ISN {} after {:?}", self.probe.kind, sample.isn, rtt);
            state.samples.push(sample);
        }
        if let Some(slot) = state.responses.get_mut(self.index) {
            *slot = Some(ProbeResponse { probe: self.probe.kind, sent_at, rtt, packet });
        }
        Ok(())
    }
}

fn lock(collector: &Mutex<Collector>) -> Result<MutexGuard<'_, Collector>, HuginnNetProbeError> {
    collector
        .lock()
        .map_err(|_| HuginnNetProbeError::Transport("sequence series lock poisoned".to_string()))
}

fn is_cancelled(cancel_signal: Option<&Arc<AtomicBool>>) -> bool {
    cancel_signal.is_some_and(|cancel| cancel.load(Ordering::Relaxed))
}

/// Sleeps until `instant`. Returns `false` if cancelled first.
fn wait_until(instant: Instant, cancel_signal: Option<&Arc<AtomicBool>>) -> bool {
    loop {
        if is_cancelled(cancel_signal) {
            return false;
        }
        let remaining = instant.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(POLL_INTERVAL));
    }
}
