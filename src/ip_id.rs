use crate::error::HuginnNetProbeError;
use crate::signature::{Analysis, IpIdSource};

/// How a remote stack generates IPv4 identification values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IpIdClass {
    /// `Z`: every ID is zero.
    Zero,
    /// `RD`: at least one jump of 20000 or more.
    Random,
    /// Every ID has the same nonzero value, shown in hexadecimal.
    Constant(u16),
    /// `RI`: random positive increments.
    RandomIncrements,
    /// `BI`: increments that are multiples of 256 (byte-swapped counter).
    BrokenIncrement,
    /// `I`: small sequential increments.
    Incremental,
    /// None of the rules matched.
    Omitted,
}

impl IpIdClass {
    /// Whether the class describes a counter that can be shared between protocols.
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            IpIdClass::RandomIncrements | IpIdClass::BrokenIncrement | IpIdClass::Incremental
        )
    }
}

/// Whether TCP and ICMP replies draw their IP IDs from the same counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SharedSequence {
    /// `S`
    Shared,
    /// `O`
    Separate,
}

/// Differences between consecutive IDs, modulo 65536.
pub fn id_differences(ids: &[u16]) -> Vec<u16> {
    ids.windows(2).map(|pair| pair[1].wrapping_sub(pair[0])).collect()
}

/// Classifies an ordered IP-ID series. The first matching rule wins.
pub fn classify_ip_ids(ids: &[u16], source: IpIdSource) -> Result<IpIdClass, HuginnNetProbeError> {
    let Some(&first) = ids.first() else {
        return Err(HuginnNetProbeError::insufficient(
            Analysis::IpId(source),
            "no IP ID values were collected",
        ));
    };

    let differences = id_differences(ids);

    if ids.iter().all(|&id| id == 0) {
        return Ok(IpIdClass::Zero);
    }
    if differences.iter().any(|&diff| diff >= 20000) {
        return Ok(IpIdClass::Random);
    }
    if ids.iter().all(|&id| id == first) {
        return Ok(IpIdClass::Constant(first));
    }
    if differences.iter().any(|&diff| diff > 1000 && diff % 256 != 0) {
        return Ok(IpIdClass::RandomIncrements);
    }
    if differences.iter().all(|&diff| diff % 256 == 0 && diff <= 5120) {
        return Ok(IpIdClass::BrokenIncrement);
    }
    if differences.iter().all(|&diff| diff < 10) {
        return Ok(IpIdClass::Incremental);
    }
    Ok(IpIdClass::Omitted)
}

/// Tests whether the ICMP replies continue the TCP replies' ID counter.
///
/// Returns `Ok(None)` (indeterminate) unless `ti` and `ii` are the same sequential class.
pub fn shared_sequence(
    tcp_ids: &[u16],
    icmp_ids: &[u16],
    ti: IpIdClass,
    ii: IpIdClass,
) -> Result<Option<SharedSequence>, HuginnNetProbeError> {
    if !ti.is_sequential() || !ii.is_sequential() || ti != ii {
        return Ok(None);
    }

    let (Some(&first_tcp), Some(&last_tcp), Some(&first_icmp)) =
        (tcp_ids.first(), tcp_ids.last(), icmp_ids.first())
    else {
        return Err(insufficient_shared(tcp_ids, icmp_ids));
    };
    if tcp_ids.len() < 2 {
        return Err(insufficient_shared(tcp_ids, icmp_ids));
    }

    let average = (f64::from(last_tcp) - f64::from(first_tcp)) / (tcp_ids.len() - 1) as f64;
    let threshold = f64::from(last_tcp) + 3.0 * average;

    if f64::from(first_icmp) < threshold {
        Ok(Some(SharedSequence::Shared))
    } else {
        Ok(Some(SharedSequence::Separate))
    }
}

fn insufficient_shared(tcp_ids: &[u16], icmp_ids: &[u16]) -> HuginnNetProbeError {
    HuginnNetProbeError::insufficient(
        Analysis::SharedSequence,
        format!(
            "at least 2 TCP IDs and 1 ICMP ID are required, got {} and {}",
            tcp_ids.len(),
            icmp_ids.len()
        ),
    )
}
