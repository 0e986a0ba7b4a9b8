use crate::db::{Database, Label, Type};
use crate::error::HuginnNetProbeError;
use crate::ip_id::{IpIdClass, SharedSequence};
use crate::signature::Signature;
use crate::timestamp::TimestampClass;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while};
use nom::character::complete::{alpha1, alphanumeric1, digit1, hex_digit1, satisfy, space0};
use nom::combinator::{map, map_res, opt, rest};
use nom::sequence::preceded;
use nom::{IResult, Parser};
use std::str::FromStr;
use tracing::{trace, warn};

impl FromStr for Database {
    type Err = HuginnNetProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut os: Vec<(Label, Vec<Signature>)> = vec![];
        let mut cur_mod: Option<String> = None;

        for line in s.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                cur_mod = Some(
                    parse_module(line)
                        .map_err(|err| {
                            HuginnNetProbeError::Parse(format!(
                                "fail to parse `module`: {line}, {err}"
                            ))
                        })?
                        .1,
                );
            } else if let Some(module) = cur_mod.as_deref() {
                let (_, (name, value)) = parse_named_value(line).map_err(|err| {
                    HuginnNetProbeError::Parse(format!("fail to parse named value: {line}, {err}"))
                })?;

                match (module, name) {
                    ("os", "label") => {
                        let label = value.parse::<Label>()?;
                        trace!("os label: {}", label);
                        os.push((label, vec![]));
                    }
                    ("os", "sig") => {
                        if let Some((label, signatures)) = os.last_mut() {
                            let sig = value.parse::<Signature>()?;
                            trace!("sig for `{}`: {}", label, sig);
                            signatures.push(sig);
                        } else {
                            return Err(HuginnNetProbeError::Parse(format!(
                                "os signature without `label`: {value}"
                            )));
                        }
                    }
                    _ => {
                        warn!("skip `{}` in module `{}`: {}", name, module, value);
                    }
                }
            } else {
                return Err(HuginnNetProbeError::Parse(format!(
                    "unexpected line outside the module: {line}"
                )));
            }
        }

        Ok(Database { os })
    }
}

macro_rules! impl_from_str {
    ($ty:ty, $parse:ident) => {
        impl FromStr for $ty {
            type Err = HuginnNetProbeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (remaining, res) = $parse(s).map_err(|err| {
                    HuginnNetProbeError::Parse(format!(
                        "parse {} failed: {}, {}",
                        stringify!($ty),
                        s,
                        err
                    ))
                })?;

                if !remaining.is_empty() {
                    Err(HuginnNetProbeError::Parse(format!(
                        "parse {} failed, remaining: {}",
                        stringify!($ty),
                        remaining
                    )))
                } else {
                    Ok(res)
                }
            }
        }
    };
}

impl_from_str!(Label, parse_label);
impl_from_str!(Type, parse_type);
impl_from_str!(Signature, parse_signature);
impl_from_str!(IpIdClass, parse_ip_id_class);
impl_from_str!(TimestampClass, parse_timestamp_class);

fn parse_named_value(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, (name, _, _, _, value)) =
        (alphanumeric1, space0, tag("="), space0, rest).parse(input)?;
    Ok((input, (name, value.trim_end())))
}

fn parse_module(input: &str) -> IResult<&str, String> {
    let (input, (_, module, _)) = (tag("["), alpha1, tag("]")).parse(input)?;
    Ok((input, module.to_string()))
}

fn parse_label(input: &str) -> IResult<&str, Label> {
    let (input, (ty, _, class, _, name, flavor)) = (
        parse_type,
        tag(":"),
        alt((
            map(tag("!"), |_| None),
            map(take_until(":"), |s: &str| Some(s.to_string())),
        )),
        tag(":"),
        take_until(":"),
        opt(preceded(tag(":"), rest)),
    )
        .parse(input)?;

    Ok((
        input,
        Label {
            ty,
            class,
            name: name.to_string(),
            flavor: flavor.filter(|f| !f.is_empty()).map(String::from),
        },
    ))
}

fn parse_type(input: &str) -> IResult<&str, Type> {
    alt((tag("s").map(|_| Type::Specified), tag("g").map(|_| Type::Generic))).parse(input)
}

/// `GCD=..%ISR=..%SP=..%TI=..%II=..%SS=..%TS=..%O=..`
fn parse_signature(input: &str) -> IResult<&str, Signature> {
    let (input, (gcd, isr, sp, ti, ii, ss, ts, options)) = (
        preceded(tag("GCD="), parse_number),
        preceded(tag("%ISR="), parse_number),
        preceded(tag("%SP="), parse_number),
        preceded(tag("%TI="), parse_optional_ip_id_class),
        preceded(tag("%II="), parse_optional_ip_id_class),
        preceded(tag("%SS="), parse_shared_sequence),
        preceded(tag("%TS="), parse_optional_timestamp_class),
        preceded(tag("%O="), parse_options_string),
    )
        .parse(input)?;

    Ok((input, Signature { gcd, isr, sp, ti, ii, ss, ts, options }))
}

fn parse_number(input: &str) -> IResult<&str, Option<u32>> {
    alt((
        tag("*").map(|_| None),
        map_res(digit1, |s: &str| s.parse::<u32>().map(Some)),
    ))
    .parse(input)
}

fn parse_ip_id_class(input: &str) -> IResult<&str, IpIdClass> {
    alt((
        tag("Test omitted").map(|_| IpIdClass::Omitted),
        map_res(preceded(tag("0x"), hex_digit1), |s: &str| {
            u16::from_str_radix(s, 16).map(IpIdClass::Constant)
        }),
        tag("RD").map(|_| IpIdClass::Random),
        tag("RI").map(|_| IpIdClass::RandomIncrements),
        tag("BI").map(|_| IpIdClass::BrokenIncrement),
        tag("Z").map(|_| IpIdClass::Zero),
        tag("I").map(|_| IpIdClass::Incremental),
    ))
    .parse(input)
}

fn parse_optional_ip_id_class(input: &str) -> IResult<&str, Option<IpIdClass>> {
    alt((tag("*").map(|_| None), parse_ip_id_class.map(Some))).parse(input)
}

fn parse_shared_sequence(input: &str) -> IResult<&str, Option<SharedSequence>> {
    alt((
        tag("*").map(|_| None),
        tag("S").map(|_| Some(SharedSequence::Shared)),
        tag("O").map(|_| Some(SharedSequence::Separate)),
    ))
    .parse(input)
}

fn parse_timestamp_class(input: &str) -> IResult<&str, TimestampClass> {
    alt((
        tag("U").map(|_| TimestampClass::Unsupported),
        tag("0").map(|_| TimestampClass::Zero),
        satisfy(|c| c.is_ascii_digit() || c.is_ascii_uppercase()).map(TimestampClass::Rate),
    ))
    .parse(input)
}

fn parse_optional_timestamp_class(input: &str) -> IResult<&str, Option<TimestampClass>> {
    alt((tag("*").map(|_| None), parse_timestamp_class.map(Some))).parse(input)
}

fn parse_options_string(input: &str) -> IResult<&str, Option<String>> {
    alt((
        tag("*").map(|_| None),
        take_while(|c: char| c.is_ascii_alphanumeric()).map(|s: &str| Some(s.to_string())),
    ))
    .parse(input)
}
