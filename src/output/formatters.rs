use chrono::Local;
use serde_json::json;

use crate::analysis::statistics::Statistics;
use crate::devices::reading::Reading;
use crate::storage::csv_logger::CSV_HEADER;
use crate::utils::error::CondensateError;

pub trait ReadingFormatter: Send + Sync {
    fn format_reading(&self, reading: &Reading) -> String;
    fn format_statistics(&self, label: &str, stats: &Statistics) -> String;
    fn format_header(&self) -> String;

    fn format_readings(&self, readings: &[Reading]) -> String {
        readings
            .iter()
            .map(|r| self.format_reading(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `console`, `json` or `csv`.
pub fn formatter_for(name: &str, threshold: f64) -> Result<Box<dyn ReadingFormatter>, CondensateError> {
    match name.trim().to_lowercase().as_str() {
        "console" | "text" => Ok(Box::new(ConsoleFormatter::new(threshold))),
        "json" => Ok(Box::new(JsonFormatter)),
        "csv" => Ok(Box::new(CsvFormatter)),
        other => Err(CondensateError::ParseError(format!(
            "Unknown output format '{}' (expected console, json or csv)",
            other
        ))),
    }
}

pub struct ConsoleFormatter {
    threshold: f64,
}

impl ConsoleFormatter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl ReadingFormatter for ConsoleFormatter {
    fn format_reading(&self, reading: &Reading) -> String {
        let marker = if reading.micro_siemens() > self.threshold { "⚠️ " } else { "📈" };
        let temperature = reading
            .temperature
            .map_or_else(|| "--.-°C".to_string(), |t| format!("{:.1}°C", t));
        format!(
            "{} [{}] {:>9.2} {} | {} | {}",
            marker,
            reading.timestamp_string(),
            reading.conductivity,
            reading.unit,
            temperature,
            reading.source
        )
    }

    fn format_statistics(&self, label: &str, stats: &Statistics) -> String {
        let mut output = format!("📊 {}\n", label);
        output.push_str(&"═".repeat(40));
        output.push('\n');
        for (name, value) in stats.display_rows() {
            output.push_str(&format!("   {:<16} {:>12}\n", name, value));
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🚀 Condensate live readings - {}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub struct JsonFormatter;

impl ReadingFormatter for JsonFormatter {
    fn format_reading(&self, reading: &Reading) -> String {
        serde_json::to_string(reading).unwrap_or_default()
    }

    fn format_readings(&self, readings: &[Reading]) -> String {
        serde_json::to_string_pretty(readings).unwrap_or_default()
    }

    fn format_statistics(&self, label: &str, stats: &Statistics) -> String {
        serde_json::to_string_pretty(&json!({ "label": label, "statistics": stats })).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new()
    }
}

pub struct CsvFormatter;

impl ReadingFormatter for CsvFormatter {
    fn format_reading(&self, reading: &Reading) -> String {
        let temperature = reading.temperature.map(|t| t.to_string()).unwrap_or_default();
        format!(
            "{},{},{},{},{}",
            reading.timestamp_string(),
            reading.conductivity,
            reading.unit,
            temperature,
            csv_field(&reading.source)
        )
    }

    fn format_statistics(&self, label: &str, stats: &Statistics) -> String {
        let mut output = String::from("Label,Metric,Value\n");
        for (name, value) in stats.display_rows() {
            output.push_str(&format!("{},{},{}\n", csv_field(label), name, value));
        }
        output
    }

    fn format_header(&self) -> String {
        CSV_HEADER.join(",")
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::reading::{parse_timestamp, ConductivityUnit};

    fn reading(value: f64) -> Reading {
        Reading::new(
            parse_timestamp("2024-06-01 08:00:00").unwrap(),
            value,
            ConductivityUnit::MicroSiemensPerCm,
            Some(24.46),
            "HACH Sension7",
        )
    }

    #[test]
    fn console_marks_threshold_exceedance() {
        let formatter = ConsoleFormatter::new(500.0);
        assert!(formatter.format_reading(&reading(250.0)).starts_with("📈"));
        let line = formatter.format_reading(&reading(612.5));
        assert!(line.starts_with("⚠️"));
        assert!(line.contains("612.50 uS/cm | 24.5°C | HACH Sension7"));
    }

    #[test]
    fn csv_row_matches_log_layout() {
        assert_eq!(CsvFormatter.format_header(), "Timestamp,Conductivity,Unit,Temperature,Device");
        assert_eq!(
            CsvFormatter.format_reading(&reading(250.5)),
            "2024-06-01 08:00:00,250.5,uS/cm,24.46,HACH Sension7"
        );
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(formatter_for("json", 500.0).is_ok());
        assert!(formatter_for("xml", 500.0).is_err());
    }
}
