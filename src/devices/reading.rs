use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::CondensateError;

/// Timestamp layout used in log files and on the wire.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConductivityUnit {
    #[serde(rename = "uS/cm")]
    MicroSiemensPerCm,
    #[serde(rename = "mS/cm")]
    MilliSiemensPerCm,
}

impl ConductivityUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConductivityUnit::MicroSiemensPerCm => "uS/cm",
            ConductivityUnit::MilliSiemensPerCm => "mS/cm",
        }
    }

    /// Factor that converts a value in this unit to µS/cm.
    pub fn to_micro_factor(&self) -> f64 {
        match self {
            ConductivityUnit::MicroSiemensPerCm => 1.0,
            ConductivityUnit::MilliSiemensPerCm => 1000.0,
        }
    }
}

impl fmt::Display for ConductivityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConductivityUnit {
    type Err = CondensateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('µ', "u").replace('μ', "u").to_lowercase();
        match normalized.as_str() {
            "us/cm" => Ok(ConductivityUnit::MicroSiemensPerCm),
            "ms/cm" => Ok(ConductivityUnit::MilliSiemensPerCm),
            _ => Err(CondensateError::ParseError(format!("Unknown conductivity unit: {}", s))),
        }
    }
}

/// Adapter output before it is stamped with a time and a source.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSample {
    pub conductivity: f64,
    pub unit: ConductivityUnit,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(with = "timestamp_serde")]
    pub timestamp: NaiveDateTime,
    pub conductivity: f64,
    pub unit: ConductivityUnit,
    pub temperature: Option<f64>,
    pub source: String,
}

impl Reading {
    pub fn new(
        timestamp: NaiveDateTime,
        conductivity: f64,
        unit: ConductivityUnit,
        temperature: Option<f64>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: truncate_to_seconds(timestamp),
            conductivity,
            unit,
            temperature,
            source: source.into(),
        }
    }

    pub fn from_sample(sample: ParsedSample, source: impl Into<String>) -> Self {
        Self::new(
            Local::now().naive_local(),
            sample.conductivity,
            sample.unit,
            sample.temperature,
            source,
        )
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Conductivity expressed in µS/cm regardless of the unit the meter reported.
    pub fn micro_siemens(&self) -> f64 {
        self.conductivity * self.unit.to_micro_factor()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:.2} {}", self.timestamp_string(), self.conductivity, self.unit)?;
        if let Some(temp) = self.temperature {
            write!(f, ", {:.1}°C", temp)?;
        }
        write!(f, " ({})", self.source)
    }
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, CondensateError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| CondensateError::ParseError(format!("Invalid timestamp '{}': {}", s, e)))
}

pub fn parse_date(s: &str) -> Result<NaiveDate, CondensateError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| CondensateError::ParseError(format!("Invalid date '{}': {}", s, e)))
}

fn truncate_to_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

mod timestamp_serde {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parsing_normalizes_micro_sign() {
        assert_eq!("µS/cm".parse::<ConductivityUnit>().unwrap(), ConductivityUnit::MicroSiemensPerCm);
        assert_eq!("US/CM".parse::<ConductivityUnit>().unwrap(), ConductivityUnit::MicroSiemensPerCm);
        assert_eq!("mS/cm".parse::<ConductivityUnit>().unwrap(), ConductivityUnit::MilliSiemensPerCm);
        assert!("ppm".parse::<ConductivityUnit>().is_err());
    }

    #[test]
    fn reading_drops_subsecond_precision() {
        let ts = parse_timestamp("2024-03-01 10:15:30").unwrap()
            + chrono::Duration::milliseconds(750);
        let reading = Reading::new(ts, 1.2, ConductivityUnit::MilliSiemensPerCm, None, "Mock");
        assert_eq!(reading.timestamp_string(), "2024-03-01 10:15:30");
        assert_eq!(reading.micro_siemens(), 1200.0);
    }

    #[test]
    fn reading_json_uses_log_timestamp_layout() {
        let ts = parse_timestamp("2024-03-01 10:15:30").unwrap();
        let reading = Reading::new(ts, 150.0, ConductivityUnit::MicroSiemensPerCm, Some(25.0), "HACH Sension7");
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["timestamp"], "2024-03-01 10:15:30");
        assert_eq!(json["unit"], "uS/cm");
    }
}
