use crate::signature::Analysis;
use thiserror::Error;

/// Error handling for probe construction, transport and signature analysis.
#[derive(Error, Debug)]
pub enum HuginnNetProbeError {
    /// Not enough replies were collected to run a sub-analysis.
    ///
    /// This is distinct from a computed result: the analysis named by `analysis`
    /// could not run at all.
    #[error("insufficient responses to calculate {analysis}: {reason}")]
    InsufficientData { analysis: Analysis, reason: String },

    /// Data was collected but cannot be classified.
    #[error("invalid data for {analysis}: {reason}")]
    InvalidData { analysis: Analysis, reason: String },

    /// The packet transport failed for a reason other than a reply timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An error occurred while parsing data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A reply was received but it is not a well-formed packet.
    #[error("Invalid package: {0}")]
    UnexpectedPackage(String),

    /// Probe settings are invalid.
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// The run was interrupted by the user.
    #[error("Process stopped")]
    Cancelled,
}

impl HuginnNetProbeError {
    pub fn insufficient(analysis: Analysis, reason: impl Into<String>) -> Self {
        HuginnNetProbeError::InsufficientData { analysis, reason: reason.into() }
    }

    pub fn invalid(analysis: Analysis, reason: impl Into<String>) -> Self {
        HuginnNetProbeError::InvalidData { analysis, reason: reason.into() }
    }

    /// True when the error means "could not compute", as opposed to a failure of the run.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, HuginnNetProbeError::InsufficientData { .. })
    }
}
