use crate::response::ObservedTcpOption;
use std::fmt::Write;

/// Encodes reply options into the signature's options string.
///
/// `L` end of list, `N` no-op, `M` + MSS in uppercase hex, `W` + window scale in decimal,
/// `T` + two bits telling whether TSval and TSecr are nonzero, `S` SACK permitted.
/// SACK blocks and unknown options are skipped.
pub fn encode_options(options: &[ObservedTcpOption]) -> String {
    let mut encoded = String::new();

    for option in options {
        // writing into a String cannot fail
        let _ = match option {
            ObservedTcpOption::Eol => write!(encoded, "L"),
            ObservedTcpOption::Nop => write!(encoded, "N"),
            ObservedTcpOption::Mss(mss) => write!(encoded, "M{mss:X}"),
            ObservedTcpOption::WindowScale(scale) => write!(encoded, "W{scale}"),
            ObservedTcpOption::Timestamp { tsval, tsecr } => {
                write!(encoded, "T{}{}", u8::from(*tsval != 0), u8::from(*tsecr != 0))
            }
            ObservedTcpOption::SackPermitted => write!(encoded, "S"),
            ObservedTcpOption::Sack(_) | ObservedTcpOption::Unknown(_) => Ok(()),
        };
    }

    encoded
}
