use chrono::Local;
use log::{info, warn};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::Settings;
use crate::storage::CsvLogger;
use crate::utils::error::CondensateError;

#[derive(Debug, Clone, Serialize)]
pub struct PathStatus {
    pub label: String,
    pub path: PathBuf,
    pub exists: bool,
    pub writable: bool,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionReport {
    pub checked_at: String,
    pub entries: Vec<PathStatus>,
}

impl PermissionReport {
    /// True when at least one log location accepts writes.
    pub fn can_log(&self) -> bool {
        self.entries
            .iter()
            .filter(|e| e.label != "Current directory")
            .any(|e| e.writable)
    }

    pub fn render(&self) -> String {
        let mut output = format!("🔐 Permission check ({})\n", self.checked_at);
        output.push_str(&"═".repeat(50));
        output.push('\n');
        for entry in &self.entries {
            let status = match (entry.exists, entry.writable) {
                (_, true) => "✅ writable",
                (true, false) => "❌ read-only",
                (false, false) => "❌ missing",
            };
            output.push_str(&format!("{:<22} {}\n   {}", entry.label, status, entry.path.display()));
            if let Some(size) = entry.size_bytes {
                output.push_str(&format!(" ({} bytes)", size));
            }
            output.push('\n');
        }
        output
    }
}

/// Reports whether the places the logger may write to exist and accept writes.
pub fn check_permissions(settings: &Settings) -> Result<PermissionReport, CondensateError> {
    let logger = CsvLogger::from_settings(&settings.logging);
    let today = Local::now().date_naive();
    let mut entries = vec![dir_status("Current directory", &std::env::current_dir()?)];

    for (index, (dir, level)) in logger.candidates().iter().enumerate() {
        let label = if index == 0 {
            "Log directory".to_string()
        } else {
            format!("Fallback ({})", level)
        };
        entries.push(dir_status(&label, dir));
    }

    if let Some(file) = logger.primary_path(settings.device.mock_data, today) {
        entries.push(file_status("Today's log file", &file));
    }

    let report = PermissionReport {
        checked_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        entries,
    };
    if !report.can_log() {
        warn!("⚠️  No writable log location found");
    }
    Ok(report)
}

/// Writes a probe file into `dir`, reads it back and removes it.
pub fn test_file_write(dir: &Path) -> Result<PathBuf, CondensateError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("condensate_write_test_{}.txt", Uuid::new_v4()));
    let content = format!("Condensate write test {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));

    fs::write(&path, &content)?;
    let read_back = fs::read_to_string(&path);
    fs::remove_file(&path)?;

    if read_back? != content {
        return Err(CondensateError::Io(IoError::new(
            ErrorKind::InvalidData,
            format!("content read back from {} differs from what was written", path.display()),
        )));
    }

    info!("✅ Test write succeeded in {}", dir.display());
    Ok(path)
}

fn dir_status(label: &str, dir: &Path) -> PathStatus {
    let exists = dir.is_dir();
    PathStatus {
        label: label.to_string(),
        path: dir.to_path_buf(),
        exists,
        writable: exists && probe_dir(dir),
        size_bytes: None,
    }
}

fn file_status(label: &str, file: &Path) -> PathStatus {
    let metadata = fs::metadata(file).ok();
    let writable = match &metadata {
        Some(_) => OpenOptions::new().append(true).open(file).is_ok(),
        None => file.parent().map_or(false, |p| p.is_dir() && probe_dir(p)),
    };
    PathStatus {
        label: label.to_string(),
        path: file.to_path_buf(),
        exists: metadata.is_some(),
        writable,
        size_bytes: metadata.map(|m| m.len()),
    }
}

fn probe_dir(dir: &Path) -> bool {
    let probe = dir.join(format!(".condensate_probe_{}", Uuid::new_v4()));
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
