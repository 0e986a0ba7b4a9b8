//! Initial sequence number analysis: GCD, counter rate (ISR) and predictability (SP).

use crate::error::HuginnNetProbeError;
use crate::signature::Analysis;

const SEQUENCE_SPACE: u64 = 1 << 32;

/// Minimum number of sequence rates needed by [`calculate_sp`].
pub const MIN_SP_RATES: usize = 4;

/// Result of the GCD analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcdAnalysis {
    /// Wrap-aware difference between each consecutive pair of ISNs.
    pub diff1: Vec<u32>,
    pub gcd: u32,
}

/// Result of the ISN counter-rate analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct IsrAnalysis {
    /// Increments per second, one per pair whose time delta was positive.
    pub seq_rates: Vec<f64>,
    pub isr: u32,
}

/// Smaller of the forward distance and its complement in the 32-bit sequence space.
pub fn wrapped_difference(a: u32, b: u32) -> u32 {
    let raw = (i64::from(b) - i64::from(a)).unsigned_abs();
    let wrapped = SEQUENCE_SPACE - raw;
    // both operands are < 2^32 and their minimum is at most 2^31
    raw.min(wrapped) as u32
}

pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Computes the per-pair differences of an ISN series and their greatest common divisor.
pub fn calculate_gcd(isns: &[u32]) -> Result<GcdAnalysis, HuginnNetProbeError> {
    if isns.len() < 2 {
        return Err(HuginnNetProbeError::insufficient(
            Analysis::Gcd,
            format!("at least 2 ISNs are required, got {}", isns.len()),
        ));
    }

    let diff1: Vec<u32> = isns
        .windows(2)
        .map(|pair| wrapped_difference(pair[0], pair[1]))
        .collect();
    let gcd = diff1.iter().copied().fold(0, gcd);

    Ok(GcdAnalysis { diff1, gcd })
}

/// Computes sequence rates from `diff1` and the matching reply times (in seconds).
///
/// `times` must hold one more entry than `diff1`.
pub fn calculate_isr(diff1: &[u32], times: &[f64]) -> Result<IsrAnalysis, HuginnNetProbeError> {
    if times.len() != diff1.len() + 1 {
        return Err(HuginnNetProbeError::insufficient(
            Analysis::Isr,
            format!(
                "{} differences need {} times, got {}",
                diff1.len(),
                diff1.len() + 1,
                times.len()
            ),
        ));
    }

    let seq_rates: Vec<f64> = diff1
        .iter()
        .zip(times.windows(2))
        .filter_map(|(&diff, pair)| {
            let delta = pair[1] - pair[0];
            (delta > 0.0).then(|| f64::from(diff) / delta)
        })
        .collect();

    if seq_rates.is_empty() {
        return Ok(IsrAnalysis { seq_rates, isr: 0 });
    }

    let mean = mean(&seq_rates);
    let isr = if mean < 1.0 { 0 } else { log_scale(mean) };

    Ok(IsrAnalysis { seq_rates, isr })
}

/// Computes the sequence predictability index from the sequence rates.
pub fn calculate_sp(seq_rates: &[f64], gcd: u32) -> Result<u32, HuginnNetProbeError> {
    if seq_rates.len() < MIN_SP_RATES {
        return Err(HuginnNetProbeError::insufficient(
            Analysis::Sp,
            format!("at least {MIN_SP_RATES} sequence rates are required, got {}", seq_rates.len()),
        ));
    }

    let rates: Vec<f64> = if gcd > 9 {
        seq_rates.iter().map(|rate| rate / f64::from(gcd)).collect()
    } else {
        seq_rates.to_vec()
    };

    let std_dev = standard_deviation(&rates);
    if std_dev <= 1.0 {
        return Ok(0);
    }
    Ok(log_scale(std_dev))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn standard_deviation(values: &[f64]) -> f64 {
    let mean = mean(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// `round(8 * log2(value))` for `value >= 1`.
fn log_scale(value: f64) -> u32 {
    (8.0 * value.log2()).round() as u32
}
