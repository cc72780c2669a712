use log::debug;

use super::patterns::find_conductivity_and_temperature;
use super::reading::ParsedSample;
use super::traits::ConductivityMeter;

pub const SENSION7_MODEL: &str = "HACH Sension7";

/// HACH Sension7: pushes readings unprompted, e.g. `1413 uS/cm  25.0 C`.
#[derive(Debug, Clone, Default)]
pub struct Sension7Adapter;

impl ConductivityMeter for Sension7Adapter {
    fn name(&self) -> &str {
        SENSION7_MODEL
    }

    fn description(&self) -> &str {
        "HACH Sension7 conductivity meter with serial output"
    }

    fn parse_data(&self, raw_data: &str) -> Option<ParsedSample> {
        let sample = find_conductivity_and_temperature(raw_data.trim());
        if sample.is_none() {
            debug!("🔍 {} could not parse: {:?}", SENSION7_MODEL, raw_data);
        }
        sample
    }
}
