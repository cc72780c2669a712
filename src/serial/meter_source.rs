use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

use super::line_source::LineSource;
use crate::devices::reading::Reading;
use crate::devices::traits::{ConductivityMeter, ReadingSource};
use crate::utils::error::CondensateError;

/// A real meter: a line transport paired with the adapter for its model.
pub struct SerialMeterSource {
    lines: Arc<dyn LineSource>,
    adapter: Arc<dyn ConductivityMeter>,
}

impl SerialMeterSource {
    pub fn new(lines: Arc<dyn LineSource>, adapter: Box<dyn ConductivityMeter>) -> Self {
        Self {
            lines,
            adapter: Arc::from(adapter),
        }
    }
}

#[async_trait]
impl ReadingSource for SerialMeterSource {
    fn source_name(&self) -> &str {
        self.adapter.name()
    }

    async fn next_reading(&self) -> Result<Option<Reading>, CondensateError> {
        let lines = Arc::clone(&self.lines);
        let command = self.adapter.command().map(|c| c.to_vec());

        let line = tokio::task::spawn_blocking(move || lines.request_line(command.as_deref())).await??;

        let Some(raw) = line else {
            debug!("⏳ No data from {}", self.lines.describe());
            return Ok(None);
        };

        match self.adapter.parse_data(&raw) {
            Some(sample) => Ok(Some(Reading::from_sample(sample, self.adapter.name()))),
            None => {
                warn!("⚠️  Failed to parse data from {}: {:?}", self.adapter.name(), raw.trim());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::con150::Con150Adapter;
    use crate::devices::reading::ConductivityUnit;
    use crate::devices::sension7::Sension7Adapter;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedLines {
        lines: Mutex<VecDeque<Option<String>>>,
        commands: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedLines {
        fn with(lines: &[Option<&str>]) -> Self {
            Self {
                lines: Mutex::new(lines.iter().map(|l| l.map(String::from)).collect()),
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    impl LineSource for ScriptedLines {
        fn request_line(&self, command: Option<&[u8]>) -> Result<Option<String>, CondensateError> {
            if let Some(cmd) = command {
                self.commands.lock().unwrap().push(cmd.to_vec());
            }
            Ok(self.lines.lock().unwrap().pop_front().flatten())
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    #[tokio::test]
    async fn parses_line_through_adapter() {
        let lines = Arc::new(ScriptedLines::with(&[Some("845.2 uS/cm 22.1 C\r\n")]));
        let source = SerialMeterSource::new(lines, Box::new(Sension7Adapter));

        let reading = source.next_reading().await.unwrap().unwrap();
        assert_eq!(reading.conductivity, 845.2);
        assert_eq!(reading.unit, ConductivityUnit::MicroSiemensPerCm);
        assert_eq!(reading.temperature, Some(22.1));
        assert_eq!(reading.source, "HACH Sension7");
        assert!(!source.is_mock());
    }

    #[tokio::test]
    async fn sends_poll_command_when_adapter_has_one() {
        let lines = Arc::new(ScriptedLines::with(&[Some("COND: 1.41 mS/cm TEMP: 25.0C\n")]));
        let source = SerialMeterSource::new(lines.clone(), Box::new(Con150Adapter));

        let reading = source.next_reading().await.unwrap().unwrap();
        assert_eq!(reading.unit, ConductivityUnit::MilliSiemensPerCm);
        assert_eq!(lines.commands.lock().unwrap().as_slice(), &[b"D\r".to_vec()]);
    }

    #[tokio::test]
    async fn garbage_and_silence_are_skipped() {
        let lines = Arc::new(ScriptedLines::with(&[Some("ERR\n"), None]));
        let source = SerialMeterSource::new(lines, Box::new(Sension7Adapter));

        assert!(source.next_reading().await.unwrap().is_none());
        assert!(source.next_reading().await.unwrap().is_none());
    }
}
