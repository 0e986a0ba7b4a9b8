use crate::ip_id::{IpIdClass, SharedSequence};
use crate::signature::{Analysis, AnalysisFailure, Signature};
use crate::timestamp::TimestampClass;
use core::fmt;
use std::fmt::Formatter;

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Display for IpIdClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IpIdClass::Zero => f.write_str("Z"),
            IpIdClass::Random => f.write_str("RD"),
            IpIdClass::Constant(value) => write!(f, "{value:#x}"),
            IpIdClass::RandomIncrements => f.write_str("RI"),
            IpIdClass::BrokenIncrement => f.write_str("BI"),
            IpIdClass::Incremental => f.write_str("I"),
            IpIdClass::Omitted => f.write_str("Test omitted"),
        }
    }
}

impl fmt::Display for SharedSequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SharedSequence::Shared => "S",
            SharedSequence::Separate => "O",
        })
    }
}

impl fmt::Display for TimestampClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TimestampClass::Unsupported => f.write_str("U"),
            TimestampClass::Zero => f.write_str("0"),
            TimestampClass::Rate(code) => write!(f, "{code}"),
        }
    }
}

impl fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// `GCD=..%ISR=..%SP=..%TI=..%II=..%SS=..%TS=..%O=..`, with `*` for an absent field.
impl fmt::Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_field(f, "GCD", self.gcd.as_ref())?;
        f.write_str("%")?;
        write_field(f, "ISR", self.isr.as_ref())?;
        f.write_str("%")?;
        write_field(f, "SP", self.sp.as_ref())?;
        f.write_str("%")?;
        write_field(f, "TI", self.ti.as_ref())?;
        f.write_str("%")?;
        write_field(f, "II", self.ii.as_ref())?;
        f.write_str("%")?;
        write_field(f, "SS", self.ss.as_ref())?;
        f.write_str("%")?;
        write_field(f, "TS", self.ts.as_ref())?;
        f.write_str("%")?;
        write_field(f, "O", self.options.as_ref())
    }
}

fn write_field<T: fmt::Display>(
    f: &mut Formatter<'_>,
    name: &str,
    value: Option<&T>,
) -> fmt::Result {
    match value {
        Some(value) => write!(f, "{name}={value}"),
        None => write!(f, "{name}=*"),
    }
}
