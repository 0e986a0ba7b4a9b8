mod common;

use common::{counter_based_stack, counter_isn, echo_reply, tcp_reply, MockTransport};
use huginn_net_probe::{
    HuginnNetProbeError, ProbeBuilder, ProbeConfig, ProbeKind, SequenceSeries, TimedProber,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> ProbeConfig {
    ProbeConfig::default()
        .with_sequence_interval(Duration::from_millis(20))
        .with_reply_timeout(Duration::from_millis(100))
        .with_join_timeout(Duration::from_secs(2))
}

fn run(
    transport: MockTransport,
    config: ProbeConfig,
) -> Result<SequenceSeries, HuginnNetProbeError> {
    let probes = ProbeBuilder::new(common::TARGET, common::OPEN_PORT, common::CLOSED_PORT)
        .sequence_probes();
    TimedProber::new(Arc::new(transport), config).run(&probes, None)
}

fn assert_aligned(series: &SequenceSeries) {
    assert_eq!(series.isns().len(), series.len());
    assert_eq!(series.times().len(), series.len());
    assert_eq!(series.ip_ids().len(), series.len());
    assert_eq!(series.timestamps().len(), series.len());
    assert_eq!(series.intervals().len(), series.len().saturating_sub(1));
}

#[test]
fn test_every_probe_answered() {
    let series = match run(counter_based_stack(), fast_config()) {
        Ok(series) => series,
        Err(e) => panic!("Prober failed: {e}"),
    };

    assert!(!series.cancelled);
    assert!(!series.timed_out);
    assert_eq!(series.len(), 6);
    assert_aligned(&series);

    let mut isns = series.isns();
    isns.sort_unstable();
    let expected: Vec<u32> = ProbeKind::SEQUENCE.iter().map(|&kind| counter_isn(kind)).collect();
    assert_eq!(isns, expected);

    assert_eq!(series.responses.len(), 6);
    assert!(series.responses.iter().all(|response| response.is_answered()));
    let kinds: Vec<ProbeKind> = series.responses.iter().map(|response| response.probe).collect();
    assert_eq!(kinds, ProbeKind::SEQUENCE.to_vec());
}

#[test]
fn test_replies_follow_the_launch_cadence() {
    let config = fast_config().with_sequence_interval(Duration::from_millis(100));
    let series = match run(counter_based_stack(), config) {
        Ok(series) => series,
        Err(e) => panic!("Prober failed: {e}"),
    };

    let times = series.times();
    assert_eq!(times.len(), 6);
    // probe 5 cannot launch before 500ms
    assert!(times.iter().any(|&time| time >= 0.5), "{times:?}");
    assert!(times.iter().all(|&time| time >= 0.0));
}

#[test]
fn test_missing_replies_keep_series_aligned() {
    let transport = MockTransport::new(|probe| match probe.kind {
        ProbeKind::Seq2 | ProbeKind::Seq5 => Ok(None),
        kind => Ok(Some(tcp_reply(probe, counter_isn(kind), 1, vec![]))),
    });

    let series = match run(transport, fast_config()) {
        Ok(series) => series,
        Err(e) => panic!("Prober failed: {e}"),
    };

    assert_eq!(series.len(), 4);
    assert_aligned(&series);
    assert!(!series.isns().contains(&counter_isn(ProbeKind::Seq2)));

    assert_eq!(series.responses.len(), 6);
    let answered: Vec<bool> =
        series.responses.iter().map(|response| response.is_answered()).collect();
    assert_eq!(answered, vec![true, false, true, true, false, true]);
}

#[test]
fn test_non_tcp_replies_are_not_samples() {
    let transport = MockTransport::new(|probe| match probe.kind {
        ProbeKind::Seq3 => Ok(Some(echo_reply(probe, 9))),
        kind => Ok(Some(tcp_reply(probe, counter_isn(kind), 1, vec![]))),
    });

    let series = match run(transport, fast_config()) {
        Ok(series) => series,
        Err(e) => panic!("Prober failed: {e}"),
    };

    assert_eq!(series.len(), 5);
    assert_aligned(&series);
    assert!(series.responses[2].is_answered());
    assert!(series.responses[2].tcp().is_none());
}

#[test]
fn test_transport_error_fails_the_run() {
    let transport = MockTransport::new(|probe| match probe.kind {
        ProbeKind::Seq4 => Err(HuginnNetProbeError::Transport("socket closed".to_string())),
        kind => Ok(Some(tcp_reply(probe, counter_isn(kind), 1, vec![]))),
    });

    match run(transport, fast_config()) {
        Err(HuginnNetProbeError::Transport(reason)) => assert_eq!(reason, "socket closed"),
        other => panic!("Expected a transport error, got {other:?}"),
    }
}

#[test]
fn test_join_timeout_returns_partial_series() {
    let transport = counter_based_stack().with_delay(Duration::from_secs(2));
    let config = fast_config()
        .with_sequence_interval(Duration::from_millis(1))
        .with_join_timeout(Duration::from_millis(150));

    let series = match run(transport, config) {
        Ok(series) => series,
        Err(e) => panic!("Prober failed: {e}"),
    };

    assert!(series.timed_out);
    assert!(!series.cancelled);
    assert!(series.is_empty());
    assert_eq!(series.responses.len(), 6);
    assert!(series.responses.iter().all(|response| !response.is_answered()));
}

#[test]
fn test_preset_cancel_signal() {
    let cancel = Arc::new(AtomicBool::new(true));
    let transport = Arc::new(counter_based_stack());
    let probes = ProbeBuilder::new(common::TARGET, common::OPEN_PORT, common::CLOSED_PORT)
        .sequence_probes();

    let prober = TimedProber::new(transport.clone(), fast_config());
    let series = match prober.run(&probes, Some(&cancel)) {
        Ok(series) => series,
        Err(e) => panic!("Prober failed: {e}"),
    };

    assert!(series.cancelled);
    assert!(series.is_empty());
    assert!(transport.sent().is_empty());
}

#[test]
fn test_cancel_during_dispatch() {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let transport = MockTransport::new(move |probe| {
        if probe.kind == ProbeKind::Seq2 {
            flag.store(true, Ordering::Relaxed);
        }
        Ok(Some(tcp_reply(probe, counter_isn(probe.kind), 1, vec![])))
    });
    let probes = ProbeBuilder::new(common::TARGET, common::OPEN_PORT, common::CLOSED_PORT)
        .sequence_probes();

    let config = fast_config().with_sequence_interval(Duration::from_millis(200));
    let series = match TimedProber::new(Arc::new(transport), config).run(&probes, Some(&cancel))
    {
        Ok(series) => series,
        Err(e) => panic!("Prober failed: {e}"),
    };

    assert!(series.cancelled);
    assert!(series.len() <= 2);
    assert_aligned(&series);
}

#[test]
fn test_late_reply_is_recorded_in_arrival_order() {
    let transport = MockTransport::new(|probe| {
        if probe.kind == ProbeKind::Seq1 {
            std::thread::sleep(Duration::from_millis(250));
        }
        Ok(Some(tcp_reply(probe, counter_isn(probe.kind), 1, vec![])))
    });

    let series = match run(transport, fast_config()) {
        Ok(series) => series,
        Err(e) => panic!("Prober failed: {e}"),
    };

    assert_eq!(series.len(), 6);
    assert_eq!(series.samples().last().map(|sample| sample.probe), Some(ProbeKind::Seq1));
    let intervals = series.intervals();
    assert!(intervals.iter().all(|&interval| interval >= 0.0), "{intervals:?}");
}
