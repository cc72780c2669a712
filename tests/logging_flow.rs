use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use condensate::devices::reading::{parse_date, parse_timestamp};
use condensate::storage::FallbackLevel;
use condensate::{ConductivityUnit, CsvLogger, DataService, History, MockMeter, Reading, Settings};
use tempfile::tempdir;

fn reading(ts: &str, value: f64) -> Reading {
    Reading::new(
        parse_timestamp(ts).unwrap(),
        value,
        ConductivityUnit::MicroSiemensPerCm,
        Some(24.0),
        "Oakton CON150",
    )
}

/// A path under a regular file, so creating it as a directory always fails.
fn unwritable(root: &std::path::Path, name: &str) -> PathBuf {
    let blocker = root.join(format!("{}_blocker", name));
    fs::write(&blocker, "not a directory").unwrap();
    blocker.join("logs")
}

#[test]
fn falls_back_to_home_then_temp() {
    let root = tempdir().unwrap();
    let home = root.path().join("home");
    let temp = root.path().join("temp");

    let logger = CsvLogger::with_candidates(
        vec![
            (unwritable(root.path(), "configured"), FallbackLevel::Configured),
            (home.clone(), FallbackLevel::Home),
            (temp.clone(), FallbackLevel::Temp),
        ],
        "conductivity_log",
        true,
    );
    let outcome = logger.write_reading(&reading("2024-06-01 08:00:00", 120.0)).unwrap();
    assert_eq!(outcome.level, FallbackLevel::Home);
    assert_eq!(outcome.path, home.join("conductivity_log_2024-06-01.csv"));

    let logger = CsvLogger::with_candidates(
        vec![
            (unwritable(root.path(), "configured2"), FallbackLevel::Configured),
            (unwritable(root.path(), "home2"), FallbackLevel::Home),
            (temp.clone(), FallbackLevel::Temp),
        ],
        "conductivity_log",
        true,
    );
    let outcome = logger.write_reading(&reading("2024-06-01 08:02:00", 121.0)).unwrap();
    assert_eq!(outcome.level, FallbackLevel::Temp);
    assert!(outcome.path.starts_with(&temp));
}

#[test]
fn settings_survive_save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.ini");

    let mut settings = Settings::load_or_create(&path).unwrap();
    settings.set("serial", "baud_rate", "19200").unwrap();
    settings.set("device", "model", "Milwaukee MW301").unwrap();
    settings.set("display", "threshold", "350.5").unwrap();
    settings.save(&path).unwrap();

    assert_eq!(Settings::load(&path).unwrap(), settings);
}

#[test]
fn history_returns_one_day_in_order() {
    let dir = tempdir().unwrap();
    let mut settings = Settings::defaults_in(dir.path());
    settings.logging.backup_enabled = false;

    let logger = CsvLogger::from_settings(&settings.logging);
    for r in [
        reading("2024-05-31 23:58:00", 100.0),
        reading("2024-06-01 00:01:00", 110.0),
        reading("2024-06-01 12:30:00", 130.0),
        reading("2024-06-02 00:00:30", 140.0),
    ] {
        logger.write_reading(&r).unwrap();
    }

    let history = History::from_settings(&settings.logging, false).unwrap();
    let day: Vec<f64> = history
        .for_date(parse_date("2024-06-01").unwrap())
        .unwrap()
        .iter()
        .map(|r| r.conductivity)
        .collect();
    assert_eq!(day, vec![110.0, 130.0]);
    assert_eq!(history.available_dates().unwrap().len(), 3);
}

#[tokio::test]
async fn mock_mode_logs_without_a_device() {
    let dir = tempdir().unwrap();
    let mut settings = Settings::defaults_in(dir.path());
    settings.logging.backup_enabled = false;
    settings.device.mock_data = true;

    let mock = Arc::new(MockMeter::with_seed(42));
    let mut service = DataService::with_source(settings.clone(), mock.clone(), Some(mock));
    service.clear_senders();

    let reading = service.read_once().await.unwrap().unwrap();
    assert_eq!(reading.source, "Mock");
    assert!((100.0..=500.0).contains(&reading.conductivity));

    let logged = History::from_settings(&settings.logging, true).unwrap().latest().unwrap();
    assert_eq!(logged, Some(reading));
    assert!(History::from_settings(&settings.logging, false).unwrap().is_empty());
}
