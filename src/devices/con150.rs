use log::debug;

use super::patterns::find_labelled;
use super::reading::ParsedSample;
use super::traits::ConductivityMeter;

pub const CON150_MODEL: &str = "Oakton CON150";

/// Ask the meter to print the current reading.
const DATA_REQUEST: &[u8] = b"D\r";

/// Oakton CON150: answers a `D` request with `COND: 123.4 uS/cm, TEMP: 25.3 C`.
#[derive(Debug, Clone, Default)]
pub struct Con150Adapter;

impl ConductivityMeter for Con150Adapter {
    fn name(&self) -> &str {
        CON150_MODEL
    }

    fn description(&self) -> &str {
        "Oakton CON150 conductivity/TDS meter with RS232 output"
    }

    fn parse_data(&self, raw_data: &str) -> Option<ParsedSample> {
        let sample = find_labelled(raw_data.trim());
        if sample.is_none() {
            debug!("🔍 {} could not parse: {:?}", CON150_MODEL, raw_data);
        }
        sample
    }

    fn command(&self) -> Option<&[u8]> {
        Some(DATA_REQUEST)
    }
}
