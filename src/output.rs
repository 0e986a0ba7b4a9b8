use crate::db::{Label, Type};
use crate::response::ProbeResponse;
use crate::signature::{AnalysisFailure, Signature};
use std::fmt;
use std::fmt::Formatter;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Printed when the signature has no entry in the database.
pub const NO_MATCH: &str = "No matching results";

/// Represents an operative system.
///
/// Examples:
/// - name: "Linux", family: "unix", variant: "2.6.x-5.x", kind: Type::Specified
/// - name: "Windows", family: "win", variant: "10 or 11", kind: Type::Specified
#[derive(Clone, Debug, PartialEq)]
pub struct OperativeSystem {
    pub name: String,
    pub family: Option<String>,
    pub variant: Option<String>,
    pub kind: Type,
}

impl From<&Label> for OperativeSystem {
    fn from(label: &Label) -> Self {
        OperativeSystem {
            name: label.name.clone(),
            family: label.class.clone(),
            variant: label.flavor.clone(),
            kind: label.ty.clone(),
        }
    }
}

/// Outcome of one fingerprinting run against one target.
#[derive(Debug)]
pub struct FingerprintResult {
    pub target: Ipv4Addr,
    pub open_port: u16,
    pub closed_port: u16,
    /// Codes that could be computed; see `failures` for the others.
    pub signature: Signature,
    /// Sub-analyses that could not be completed, in analysis order.
    pub failures: Vec<AnalysisFailure>,
    /// One entry per probe of the battery, in battery order.
    pub replies: Vec<ProbeResponse>,
    /// Database match, if a database was supplied and the signature is listed.
    pub os: Option<OperativeSystem>,
    pub duration: Duration,
}

impl FingerprintResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// nmap-style `R=Y`/`R=N` per probe.
    pub fn reply_summary(&self) -> String {
        self.replies
            .iter()
            .map(|reply| format!("{}={}", reply.probe, if reply.is_answered() { 'Y' } else { 'N' }))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn or_star<T: fmt::Display>(value: Option<&T>) -> String {
    value.map_or("*".to_string(), |v| v.to_string())
}

impl fmt::Display for FingerprintResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ".-[ {} open/{} closed/{} (os fingerprint) ]-\n\
            |\n\
            | os       = {}\n\
            | params   = {}\n\
            | gcd      = {}\n\
            | isr      = {}\n\
            | sp       = {}\n\
            | ti       = {}\n\
            | ii       = {}\n\
            | ss       = {}\n\
            | ts       = {}\n\
            | options  = {}\n\
            | raw_sig  = {}\n",
            self.target,
            self.open_port,
            self.closed_port,
            self.os.as_ref().map_or(NO_MATCH.to_string(), |os| {
                format!(
                    "{}/{}/{}",
                    os.name,
                    os.family.as_deref().unwrap_or("???"),
                    os.variant.as_deref().unwrap_or("??")
                )
            }),
            self.os.as_ref().map_or("none".to_string(), |os| os.kind.to_string()),
            or_star(self.signature.gcd.as_ref()),
            or_star(self.signature.isr.as_ref()),
            or_star(self.signature.sp.as_ref()),
            or_star(self.signature.ti.as_ref()),
            or_star(self.signature.ii.as_ref()),
            or_star(self.signature.ss.as_ref()),
            or_star(self.signature.ts.as_ref()),
            or_star(self.signature.options.as_ref()),
            self.signature,
        )?;

        for failure in &self.failures {
            writeln!(f, "| failed   = {failure}")?;
        }

        write!(
            f,
            "| replies  = {}\n\
            | duration = {:.2}s\n\
            `----\n",
            self.reply_summary(),
            self.duration.as_secs_f64(),
        )
    }
}
