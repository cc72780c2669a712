use regex::Regex;
use std::sync::OnceLock;

use super::reading::{ConductivityUnit, ParsedSample};

const VALUE_WITH_UNIT: &str = r"(?i)(\d+\.?\d*)\s*(µS/cm|uS/cm|mS/cm)";
const CELSIUS: &str = r"(\d+\.?\d*)\s*°?C";
const OAKTON_COND: &str = r"(?i)COND:\s*(\d+\.?\d*)\s*(µS/cm|uS/cm|mS/cm)";
const OAKTON_TEMP: &str = r"(?i)TEMP:\s*(\d+\.?\d*)\s*°?C";

fn value_with_unit() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VALUE_WITH_UNIT).expect("Invalid conductivity regex"))
}

fn celsius() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CELSIUS).expect("Invalid temperature regex"))
}

fn oakton_cond() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OAKTON_COND).expect("Invalid Oakton conductivity regex"))
}

fn oakton_temp() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OAKTON_TEMP).expect("Invalid Oakton temperature regex"))
}

fn sample_from(re: &Regex, text: &str) -> Option<(ParsedSample, std::ops::Range<usize>)> {
    let caps = re.captures(text)?;
    let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let unit = caps.get(2)?.as_str().parse::<ConductivityUnit>().ok()?;
    let span = caps.get(0)?.range();
    Some((
        ParsedSample {
            conductivity: value,
            unit,
            temperature: None,
        },
        span,
    ))
}

/// First "<number> <unit>" token anywhere in the line.
pub fn find_conductivity(text: &str) -> Option<ParsedSample> {
    sample_from(value_with_unit(), text).map(|(sample, _)| sample)
}

/// Conductivity token plus the first Celsius value outside of it.
pub fn find_conductivity_and_temperature(text: &str) -> Option<ParsedSample> {
    let (mut sample, span) = sample_from(value_with_unit(), text)?;
    let mut remainder = String::with_capacity(text.len());
    remainder.push_str(&text[..span.start]);
    remainder.push(' ');
    remainder.push_str(&text[span.end..]);
    sample.temperature = celsius()
        .captures(&remainder)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    Some(sample)
}

/// Labelled `COND: ... TEMP: ...` layout.
pub fn find_labelled(text: &str) -> Option<ParsedSample> {
    let (mut sample, _) = sample_from(oakton_cond(), text)?;
    sample.temperature = oakton_temp()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    Some(sample)
}
