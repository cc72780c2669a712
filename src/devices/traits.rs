use async_trait::async_trait;

use super::reading::{ParsedSample, Reading};
use crate::utils::error::CondensateError;

/// Translates the text a particular meter model prints into a common sample.
pub trait ConductivityMeter: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Returns `None` for any line the model's format does not match.
    fn parse_data(&self, raw_data: &str) -> Option<ParsedSample>;

    /// Bytes that make the meter emit a reading, for models that must be polled.
    fn command(&self) -> Option<&[u8]> {
        None
    }
}

/// Anything the data service can pull readings from: a physical meter or the mock generator.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    fn source_name(&self) -> &str;
    fn is_mock(&self) -> bool {
        false
    }

    /// `Ok(None)` means the poll produced nothing usable this time.
    async fn next_reading(&self) -> Result<Option<Reading>, CondensateError>;
}
