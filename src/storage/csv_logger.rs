use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::sink::{FallbackLevel, ReadingSink, WriteOutcome};
use crate::config::paths::fallback_log_dirs;
use crate::config::settings::LoggingSettings;
use crate::devices::mock::MOCK_SOURCE;
use crate::devices::reading::{Reading, DATE_FORMAT};
use crate::utils::error::CondensateError;

pub const CSV_HEADER: [&str; 5] = ["Timestamp", "Conductivity", "Unit", "Temperature", "Device"];

/// Prefix for log files of a given kind; simulated readings never share a file with real ones.
pub fn log_prefix(file_prefix: &str, mock: bool) -> String {
    if mock {
        format!("{}_mock", file_prefix)
    } else {
        file_prefix.to_string()
    }
}

pub fn log_file_name(prefix: &str, rotate_daily: bool, date: NaiveDate) -> String {
    if rotate_daily {
        format!("{}_{}.csv", prefix, date.format(DATE_FORMAT))
    } else {
        format!("{}.csv", prefix)
    }
}

/// Appends readings to CSV files, trying each candidate directory in turn.
/// Clones share one write lock.
#[derive(Clone)]
pub struct CsvLogger {
    candidates: Vec<(PathBuf, FallbackLevel)>,
    file_prefix: String,
    rotate_daily: bool,
    destination: String,
    write_lock: Arc<Mutex<()>>,
}

impl CsvLogger {
    pub fn from_settings(logging: &LoggingSettings) -> Self {
        let mut candidates = vec![(logging.log_dir.clone(), FallbackLevel::Configured)];
        if logging.backup_enabled {
            let fallbacks = fallback_log_dirs();
            let temp = std::env::temp_dir();
            for dir in fallbacks {
                let level = if dir == temp { FallbackLevel::Temp } else { FallbackLevel::Home };
                candidates.push((dir, level));
            }
        }
        Self::with_candidates(candidates, &logging.file_prefix, logging.rotate_daily)
    }

    pub fn with_candidates(
        candidates: Vec<(PathBuf, FallbackLevel)>,
        file_prefix: &str,
        rotate_daily: bool,
    ) -> Self {
        let destination = candidates
            .first()
            .map(|(dir, _)| dir.display().to_string())
            .unwrap_or_default();
        Self {
            candidates,
            file_prefix: file_prefix.to_string(),
            rotate_daily,
            destination,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn candidates(&self) -> &[(PathBuf, FallbackLevel)] {
        &self.candidates
    }

    pub fn file_name_for(&self, reading: &Reading) -> String {
        let prefix = log_prefix(&self.file_prefix, reading.source == MOCK_SOURCE);
        log_file_name(&prefix, self.rotate_daily, reading.date())
    }

    /// Path in the configured directory that a reading of this kind would go to today.
    pub fn primary_path(&self, mock: bool, date: NaiveDate) -> Option<PathBuf> {
        let prefix = log_prefix(&self.file_prefix, mock);
        self.candidates
            .first()
            .map(|(dir, _)| dir.join(log_file_name(&prefix, self.rotate_daily, date)))
    }

    pub fn write_reading(&self, reading: &Reading) -> Result<WriteOutcome, CondensateError> {
        let _guard = self.write_lock.lock().map_err(|_| CondensateError::LockError)?;
        let file_name = self.file_name_for(reading);
        let mut attempted = Vec::with_capacity(self.candidates.len());

        for (dir, level) in &self.candidates {
            let path = dir.join(&file_name);
            match append_row(&path, reading) {
                Ok(()) => {
                    if *level != FallbackLevel::Configured {
                        warn!("💾 Reading saved to {} fallback: {}", level, path.display());
                    } else {
                        debug!("💾 Reading saved to {}", path.display());
                    }
                    return Ok(WriteOutcome { path, level: *level });
                }
                Err(e) => {
                    warn!("⚠️  Cannot write to {}: {}", dir.display(), e);
                    attempted.push(path);
                }
            }
        }

        Err(CondensateError::NoWritableDirectory { attempted })
    }

    /// Writes readings in order and returns how many were stored.
    pub fn write_all(&self, readings: &[Reading]) -> Result<usize, CondensateError> {
        for reading in readings {
            self.write_reading(reading)?;
        }
        info!("💾 Wrote {} readings to CSV log", readings.len());
        Ok(readings.len())
    }
}

fn append_row(path: &Path, reading: &Reading) -> Result<(), CondensateError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        writer.write_record(CSV_HEADER)?;
    }
    writer.write_record([
        reading.timestamp_string(),
        reading.conductivity.to_string(),
        reading.unit.to_string(),
        reading.temperature.map(|t| t.to_string()).unwrap_or_default(),
        reading.source.clone(),
    ])?;
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl ReadingSink for CsvLogger {
    async fn record(&self, reading: &Reading) -> Result<WriteOutcome, CondensateError> {
        let logger = self.clone();
        let reading = reading.clone();
        tokio::task::spawn_blocking(move || logger.write_reading(&reading)).await?
    }

    fn sink_type(&self) -> &str {
        "csv"
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}
