use log::debug;

use super::patterns::find_conductivity;
use super::reading::ParsedSample;
use super::traits::ConductivityMeter;

pub const MW301_MODEL: &str = "Milwaukee MW301";

/// Milwaukee MW301: a bare `<value> <unit>` line, no temperature channel.
#[derive(Debug, Clone, Default)]
pub struct Mw301Adapter;

impl ConductivityMeter for Mw301Adapter {
    fn name(&self) -> &str {
        MW301_MODEL
    }

    fn description(&self) -> &str {
        "Milwaukee MW301 EC meter with digital output"
    }

    fn parse_data(&self, raw_data: &str) -> Option<ParsedSample> {
        let sample = find_conductivity(raw_data.trim());
        if sample.is_none() {
            debug!("🔍 {} could not parse: {:?}", MW301_MODEL, raw_data);
        }
        sample
    }
}
