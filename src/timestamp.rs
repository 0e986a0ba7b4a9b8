use crate::error::HuginnNetProbeError;
use crate::signature::Analysis;

/// Classification of the TCP timestamp option generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimestampClass {
    /// `U`: at least one reply carried no timestamp option.
    Unsupported,
    /// `0`: at least one reply carried a zero TSval.
    Zero,
    /// A band code (`1`, `7`, `8`) or a letter derived from the average rate.
    Rate(char),
}

/// Classifies TSvals observed on consecutive replies.
///
/// `timestamps` holds one entry per reply (`None` when the option was missing) and must be
/// exactly one longer than `intervals`.
pub fn classify_timestamps(
    timestamps: &[Option<u32>],
    intervals: &[f64],
) -> Result<TimestampClass, HuginnNetProbeError> {
    if timestamps.len() != intervals.len() + 1 {
        return Err(HuginnNetProbeError::insufficient(
            Analysis::Timestamp,
            format!(
                "{} timestamps do not match {} intervals",
                timestamps.len(),
                intervals.len()
            ),
        ));
    }

    if timestamps.iter().any(Option::is_none) {
        return Ok(TimestampClass::Unsupported);
    }
    let values: Vec<u32> = timestamps.iter().flatten().copied().collect();
    if values.contains(&0) {
        return Ok(TimestampClass::Zero);
    }
    if values.len() < 2 {
        return Err(HuginnNetProbeError::insufficient(
            Analysis::Timestamp,
            "at least 2 timestamps are required",
        ));
    }

    let rates: Vec<f64> = values
        .windows(2)
        .map(|pair| (f64::from(pair[1]) - f64::from(pair[0])) / f64::from(pair[0]))
        .collect();
    let average = rates.iter().sum::<f64>() / rates.len() as f64;

    classify_rate(average).map(TimestampClass::Rate)
}

/// Maps an average timestamp rate onto its class code.
pub fn classify_rate(average: f64) -> Result<char, HuginnNetProbeError> {
    if !average.is_finite() || average < 0.0 {
        return Err(HuginnNetProbeError::invalid(
            Analysis::Timestamp,
            format!("average rate {average} cannot be classified"),
        ));
    }

    if average <= 5.66 {
        return Ok('1');
    }
    if (70.0..=150.0).contains(&average) {
        return Ok('7');
    }
    if (150.0..=350.0).contains(&average) {
        return Ok('8');
    }

    // average > 5.66 here, so the exponent is at least 3
    let exponent = average.log2().round() as u32;
    char::from_u32(u32::from(b'A') + exponent - 1)
        .filter(char::is_ascii_uppercase)
        .ok_or_else(|| {
            HuginnNetProbeError::invalid(
                Analysis::Timestamp,
                format!("average rate {average} is outside the letter range"),
            )
        })
}
