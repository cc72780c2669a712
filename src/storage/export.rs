use log::info;
use std::fs;
use std::path::Path;

use super::csv_logger::CSV_HEADER;
use crate::devices::reading::Reading;
use crate::utils::error::CondensateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Picks the format from the file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
            Some("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }
}

pub fn export(readings: &[Reading], path: &Path, format: ExportFormat) -> Result<usize, CondensateError> {
    match format {
        ExportFormat::Csv => export_csv(readings, path),
        ExportFormat::Json => export_json(readings, path),
    }
}

pub fn export_csv(readings: &[Reading], path: &Path) -> Result<usize, CondensateError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for r in readings {
        writer.write_record([
            r.timestamp_string(),
            r.conductivity.to_string(),
            r.unit.to_string(),
            r.temperature.map(|t| t.to_string()).unwrap_or_default(),
            r.source.clone(),
        ])?;
    }
    writer.flush()?;

    info!("📤 Exported {} readings to {}", readings.len(), path.display());
    Ok(readings.len())
}

pub fn export_json(readings: &[Reading], path: &Path) -> Result<usize, CondensateError> {
    ensure_parent(path)?;
    fs::write(path, serde_json::to_string_pretty(readings)?)?;
    info!("📤 Exported {} readings to {}", readings.len(), path.display());
    Ok(readings.len())
}

fn ensure_parent(path: &Path) -> Result<(), CondensateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::reading::{parse_timestamp, ConductivityUnit};
    use crate::storage::history::read_log_file;
    use tempfile::tempdir;

    #[test]
    fn csv_export_can_be_read_back_as_a_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("june.csv");
        let readings = vec![Reading::new(
            parse_timestamp("2024-06-01 12:00:00").unwrap(),
            1.5,
            ConductivityUnit::MilliSiemensPerCm,
            None,
            "Oakton CON150",
        )];

        assert_eq!(export(&readings, &path, ExportFormat::from_path(&path)).unwrap(), 1);
        assert_eq!(read_log_file(&path).unwrap(), readings);
    }

    #[test]
    fn json_chosen_by_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a/b.JSON")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("a/b")), ExportFormat::Csv);
    }
}
