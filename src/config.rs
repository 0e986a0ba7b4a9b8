use crate::error::HuginnNetProbeError;
use crate::probe::ProbeKind;
use std::time::Duration;

pub const DEFAULT_SEQUENCE_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INTER_PACKET_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_SOURCE_PORT: u16 = 54433;

/// Tunables for one fingerprinting run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Offset between the launches of two consecutive sequence probes.
    pub sequence_interval: Duration,
    /// How long a single send-and-wait call waits for a reply.
    pub reply_timeout: Duration,
    /// Upper bound on waiting for all sequence probe workers.
    pub join_timeout: Duration,
    /// Pause between probes sent in a batch.
    pub inter_packet_delay: Duration,
    pub source_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            sequence_interval: DEFAULT_SEQUENCE_INTERVAL,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            inter_packet_delay: DEFAULT_INTER_PACKET_DELAY,
            source_port: DEFAULT_SOURCE_PORT,
        }
    }
}

impl ProbeConfig {
    pub fn with_sequence_interval(mut self, interval: Duration) -> Self {
        self.sequence_interval = interval;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_inter_packet_delay(mut self, delay: Duration) -> Self {
        self.inter_packet_delay = delay;
        self
    }

    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = port;
        self
    }

    pub fn validate(&self) -> Result<(), HuginnNetProbeError> {
        if self.reply_timeout.is_zero() {
            return Err(HuginnNetProbeError::Misconfiguration(
                "reply_timeout must be greater than zero".to_string(),
            ));
        }
        if self.join_timeout < self.reply_timeout {
            return Err(HuginnNetProbeError::Misconfiguration(format!(
                "join_timeout ({:?}) is shorter than reply_timeout ({:?})",
                self.join_timeout, self.reply_timeout
            )));
        }
        // each probe kind adds its index to the base port
        let highest_offset = (ProbeKind::VALUES.len() - 1) as u16;
        if self.source_port == 0 || self.source_port > u16::MAX - highest_offset {
            return Err(HuginnNetProbeError::Misconfiguration(format!(
                "source_port must be between 1 and {}, got {}",
                u16::MAX - highest_offset,
                self.source_port
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ProbeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_reply_timeout_is_rejected() {
        let config = ProbeConfig::default().with_reply_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(HuginnNetProbeError::Misconfiguration(_))));
    }

    #[test]
    fn join_timeout_shorter_than_reply_timeout_is_rejected() {
        let config = ProbeConfig::default()
            .with_reply_timeout(Duration::from_secs(5))
            .with_join_timeout(Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn source_port_range_leaves_room_for_every_probe() {
        for port in [0, 65521, u16::MAX] {
            let config = ProbeConfig::default().with_source_port(port);
            assert!(
                matches!(config.validate(), Err(HuginnNetProbeError::Misconfiguration(_))),
                "port {port} accepted"
            );
        }
        for port in [1, 65520] {
            assert!(ProbeConfig::default().with_source_port(port).validate().is_ok());
        }
    }
}
