use chrono::NaiveDate;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::csv_logger::log_prefix;
use crate::config::paths::fallback_log_dirs;
use crate::config::settings::LoggingSettings;
use crate::devices::reading::{parse_date, parse_timestamp, Reading};
use crate::utils::error::CondensateError;

const UNKNOWN_DEVICE: &str = "Unknown";

/// Read side of the CSV log: every matching file in the configured and fallback directories.
pub struct History {
    dirs: Vec<PathBuf>,
    file_pattern: Regex,
}

impl History {
    pub fn from_settings(logging: &LoggingSettings, mock: bool) -> Result<Self, CondensateError> {
        let mut dirs = vec![logging.log_dir.clone()];
        if logging.backup_enabled {
            dirs.extend(fallback_log_dirs());
        }
        Self::new(dirs, &log_prefix(&logging.file_prefix, mock))
    }

    pub fn new(dirs: Vec<PathBuf>, prefix: &str) -> Result<Self, CondensateError> {
        let pattern = format!(r"^{}(?:_(\d{{4}}-\d{{2}}-\d{{2}}))?\.csv$", regex::escape(prefix));
        let file_pattern = Regex::new(&pattern)
            .map_err(|e| CondensateError::SettingsError(format!("Invalid log file prefix '{}': {}", prefix, e)))?;

        let mut unique = Vec::with_capacity(dirs.len());
        for dir in dirs {
            if !unique.contains(&dir) {
                unique.push(dir);
            }
        }
        Ok(Self { dirs: unique, file_pattern })
    }

    /// Log files with the date encoded in their name, if any.
    pub fn log_files(&self) -> Vec<(PathBuf, Option<NaiveDate>)> {
        let mut files = Vec::new();
        for dir in &self.dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Skipping log directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if let Some(caps) = self.file_pattern.captures(name) {
                    let date = caps.get(1).and_then(|m| parse_date(m.as_str()).ok());
                    files.push((entry.path(), date));
                }
            }
        }
        files.sort();
        files
    }

    pub fn all(&self) -> Result<Vec<Reading>, CondensateError> {
        self.collect(|_| true, |_| true)
    }

    pub fn for_date(&self, date: NaiveDate) -> Result<Vec<Reading>, CondensateError> {
        self.for_range(date, date)
    }

    /// Readings whose date falls in `start..=end`, sorted by timestamp.
    pub fn for_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Reading>, CondensateError> {
        let in_range = |d: NaiveDate| d >= start && d <= end;
        self.collect(|file_date| file_date.map_or(true, in_range), |r| in_range(r.date()))
    }

    pub fn available_dates(&self) -> Result<Vec<NaiveDate>, CondensateError> {
        let dates: BTreeSet<NaiveDate> = self.all()?.iter().map(Reading::date).collect();
        Ok(dates.into_iter().collect())
    }

    pub fn latest(&self) -> Result<Option<Reading>, CondensateError> {
        Ok(self.all()?.pop())
    }

    pub fn is_empty(&self) -> bool {
        self.log_files().is_empty()
    }

    fn collect<F, R>(&self, file_filter: F, row_filter: R) -> Result<Vec<Reading>, CondensateError>
    where
        F: Fn(Option<NaiveDate>) -> bool,
        R: Fn(&Reading) -> bool,
    {
        let mut readings = Vec::new();
        for (path, file_date) in self.log_files() {
            if !file_filter(file_date) {
                continue;
            }
            match read_log_file(&path) {
                Ok(rows) => readings.extend(rows.into_iter().filter(|r| row_filter(r))),
                Err(e) => warn!("⚠️  Could not read log file {}: {}", path.display(), e),
            }
        }
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }
}

/// Parses one log file. Rows that do not parse are skipped.
pub fn read_log_file(path: &Path) -> Result<Vec<Reading>, CondensateError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut readings = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!("{} row {}: {}", path.display(), index + 2, e);
                continue;
            }
        };
        match parse_row(&record) {
            Ok(reading) => readings.push(reading),
            Err(e) => debug!("{} row {}: {}", path.display(), index + 2, e),
        }
    }

    info!("📖 Read {} readings from {}", readings.len(), path.display());
    Ok(readings)
}

fn parse_row(record: &csv::StringRecord) -> Result<Reading, CondensateError> {
    let field = |i: usize| record.get(i).unwrap_or("");

    let timestamp = parse_timestamp(field(0))?;
    let conductivity: f64 = field(1)
        .parse()
        .map_err(|_| CondensateError::ParseError(format!("Invalid conductivity '{}'", field(1))))?;
    let unit = field(2).parse()?;
    let temperature = match field(3) {
        "" | "None" | "nan" => None,
        raw => Some(
            raw.parse::<f64>()
                .map_err(|_| CondensateError::ParseError(format!("Invalid temperature '{}'", raw)))?,
        ),
    };
    let source = match field(4) {
        "" => UNKNOWN_DEVICE,
        device => device,
    };

    Ok(Reading::new(timestamp, conductivity, unit, temperature, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "Timestamp,Conductivity,Unit,Temperature,Device\n";

    #[test]
    fn reads_only_requested_date_in_order() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("condensate.csv"),
            format!(
                "{}2024-06-02 10:00:00,300,uS/cm,25.0,HACH Sension7\n\
                 2024-06-01 09:00:00,1.2,mS/cm,,Oakton CON150\n\
                 2024-06-02 08:00:00,280,uS/cm,24.0,HACH Sension7\n",
                HEADER
            ),
        )
        .unwrap();

        let history = History::new(vec![dir.path().to_path_buf()], "condensate").unwrap();
        let day = history.for_date(parse_date("2024-06-02").unwrap()).unwrap();

        assert_eq!(day.len(), 2);
        assert_eq!(day[0].timestamp_string(), "2024-06-02 08:00:00");
        assert_eq!(day[1].conductivity, 300.0);
        assert_eq!(
            history.available_dates().unwrap(),
            vec![parse_date("2024-06-01").unwrap(), parse_date("2024-06-02").unwrap()]
        );
    }

    #[test]
    fn skips_bad_rows_and_reads_legacy_four_columns() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("condensate_2024-06-01.csv"),
            "Timestamp,Conductivity,Unit,Temperature\n\
             2024-06-01 09:00:00,150.0,uS/cm,None\n\
             garbage,row\n\
             2024-06-01 10:00:00,abc,uS/cm,20\n",
        )
        .unwrap();

        let history = History::new(vec![dir.path().to_path_buf()], "condensate").unwrap();
        let all = history.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].temperature, None);
        assert_eq!(all[0].source, UNKNOWN_DEVICE);
    }

    #[test]
    fn mock_files_are_kept_apart() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("condensate_mock_2024-06-01.csv"),
            format!("{}2024-06-01 09:00:00,150.0,uS/cm,22.0,Mock\n", HEADER),
        )
        .unwrap();

        let real = History::new(vec![dir.path().to_path_buf()], "condensate").unwrap();
        let mock = History::new(vec![dir.path().to_path_buf()], "condensate_mock").unwrap();
        assert!(real.all().unwrap().is_empty());
        assert_eq!(mock.all().unwrap().len(), 1);
    }

    #[test]
    fn merges_fallback_directories() {
        let primary = tempdir().unwrap();
        let fallback = tempdir().unwrap();
        fs::write(
            primary.path().join("condensate_2024-06-01.csv"),
            format!("{}2024-06-01 09:00:00,100,uS/cm,,Mock\n", HEADER),
        )
        .unwrap();
        fs::write(
            fallback.path().join("condensate_2024-06-01.csv"),
            format!("{}2024-06-01 08:00:00,90,uS/cm,,Mock\n", HEADER),
        )
        .unwrap();

        let history = History::new(
            vec![primary.path().to_path_buf(), fallback.path().to_path_buf()],
            "condensate",
        )
        .unwrap();
        let day = history.for_date(parse_date("2024-06-01").unwrap()).unwrap();
        assert_eq!(day.iter().map(|r| r.conductivity).collect::<Vec<_>>(), vec![90.0, 100.0]);
    }
}
