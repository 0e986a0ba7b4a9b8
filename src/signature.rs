use crate::error::HuginnNetProbeError;
use crate::ip_id::{IpIdClass, SharedSequence};
use crate::timestamp::TimestampClass;

/// Which reply family an IP-ID series was collected from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IpIdSource {
    /// IP IDs of replies to the TCP sequence probes (`TI`).
    Tcp,
    /// IP IDs of replies to the ICMP echo probes (`II`).
    Icmp,
}

/// Names one sub-analysis of the signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Analysis {
    Gcd,
    Isr,
    Sp,
    IpId(IpIdSource),
    SharedSequence,
    Timestamp,
    TcpOptions,
}

impl Analysis {
    /// Every sub-analysis, in the order the orchestrator runs them.
    pub const ORDER: [Self; 8] = [
        Analysis::Gcd,
        Analysis::Isr,
        Analysis::Sp,
        Analysis::IpId(IpIdSource::Tcp),
        Analysis::IpId(IpIdSource::Icmp),
        Analysis::SharedSequence,
        Analysis::Timestamp,
        Analysis::TcpOptions,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Analysis::Gcd => "GCD",
            Analysis::Isr => "ISR",
            Analysis::Sp => "SP",
            Analysis::IpId(IpIdSource::Tcp) => "TI",
            Analysis::IpId(IpIdSource::Icmp) => "II",
            Analysis::SharedSequence => "SS",
            Analysis::Timestamp => "TS",
            Analysis::TcpOptions => "O",
        }
    }
}

/// The classification codes derived from one fingerprinting run.
///
/// Every field is optional: a sub-analysis that could not be computed leaves its field
/// empty and is reported separately as an [`AnalysisFailure`]. `ss` is also empty when the
/// shared-sequence test is indeterminate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    pub gcd: Option<u32>,
    pub isr: Option<u32>,
    pub sp: Option<u32>,
    pub ti: Option<IpIdClass>,
    pub ii: Option<IpIdClass>,
    pub ss: Option<SharedSequence>,
    pub ts: Option<TimestampClass>,
    pub options: Option<String>,
}

impl Signature {
    pub fn is_empty(&self) -> bool {
        *self == Signature::default()
    }
}

/// A sub-analysis that could not be completed, kept next to the partial signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisFailure {
    pub analysis: Analysis,
    pub message: String,
    /// `true` when too few replies were collected, `false` when the data was unusable.
    pub insufficient: bool,
}

impl AnalysisFailure {
    pub fn from_error(analysis: Analysis, error: &HuginnNetProbeError) -> Self {
        let analysis = match error {
            HuginnNetProbeError::InsufficientData { analysis, .. }
            | HuginnNetProbeError::InvalidData { analysis, .. } => *analysis,
            _ => analysis,
        };
        Self { analysis, message: error.to_string(), insufficient: error.is_insufficient_data() }
    }
}
