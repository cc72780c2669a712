use ini::Ini;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::paths::{default_serial_port, default_settings_dir};
use crate::devices::registry::DEFAULT_MODEL;
use crate::utils::error::CondensateError;

/// Every `(section, key)` the settings file knows about, in file order.
pub const SETTING_KEYS: &[(&str, &str)] = &[
    ("serial", "port"),
    ("serial", "baud_rate"),
    ("serial", "timeout"),
    ("logging", "log_dir"),
    ("logging", "file_prefix"),
    ("logging", "backup_enabled"),
    ("logging", "rotate_daily"),
    ("display", "update_interval"),
    ("display", "show_grid"),
    ("display", "theme"),
    ("display", "threshold"),
    ("display", "buffer_size"),
    ("device", "model"),
    ("device", "mock_data"),
    ("device", "measurement_interval"),
    ("device", "mock_interval"),
    ("api", "enabled"),
    ("api", "port"),
    ("websocket", "enabled"),
    ("websocket", "port"),
    ("storage", "sqlite_enabled"),
    ("storage", "database_path"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub serial: SerialSettings,
    pub logging: LoggingSettings,
    pub display: DisplaySettings,
    pub device: DeviceSettings,
    pub api: ServerSettings,
    pub websocket: ServerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout in seconds.
    pub timeout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub log_dir: PathBuf,
    pub file_prefix: String,
    pub backup_enabled: bool,
    pub rotate_daily: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub update_interval: f64,
    pub show_grid: bool,
    pub theme: Theme,
    pub threshold: f64,
    pub buffer_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub model: String,
    pub mock_data: bool,
    /// Seconds between polls of a real meter.
    pub measurement_interval: f64,
    /// Seconds between simulated readings.
    pub mock_interval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub sqlite_enabled: bool,
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::defaults_in(&default_settings_dir())
    }
}

impl Settings {
    /// Defaults with the log directory and database placed under `settings_dir`.
    pub fn defaults_in(settings_dir: &Path) -> Self {
        Self {
            serial: SerialSettings {
                port: default_serial_port().to_string(),
                baud_rate: 9600,
                timeout: 1.0,
            },
            logging: LoggingSettings {
                log_dir: settings_dir.join("logs"),
                file_prefix: "condensate".to_string(),
                backup_enabled: true,
                rotate_daily: true,
            },
            display: DisplaySettings {
                update_interval: 2.0,
                show_grid: true,
                theme: Theme::Light,
                threshold: 500.0,
                buffer_size: 500,
            },
            device: DeviceSettings {
                model: DEFAULT_MODEL.to_string(),
                mock_data: true,
                measurement_interval: 0.1,
                mock_interval: 120.0,
            },
            api: ServerSettings {
                enabled: false,
                port: 8080,
            },
            websocket: ServerSettings {
                enabled: false,
                port: 8081,
            },
            storage: StorageSettings {
                sqlite_enabled: false,
                database_path: settings_dir.join("condensate.db"),
            },
        }
    }

    /// Reads an INI file. Missing keys keep their defaults, and so do values
    /// that fail validation (with a warning).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CondensateError> {
        let path = path.as_ref();
        let ini = Ini::load_from_file(path)?;
        let mut settings = Self::defaults_in(&settings_dir_of(path));

        for (section, key) in SETTING_KEYS {
            let Some(raw) = ini.get_from(Some(*section), key) else {
                debug!("Setting [{}] {} missing, using default", section, key);
                continue;
            };
            if let Err(e) = settings.set(section, key, raw) {
                warn!("⚠️  {} in {}, using default", e, path.display());
            }
        }

        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            for (key, _) in props.iter() {
                if !SETTING_KEYS.iter().any(|(s, k)| *s == section && *k == key) {
                    debug!("Ignoring unknown setting [{}] {}", section, key);
                }
            }
        }

        info!("📁 Settings loaded from {}", path.display());
        Ok(settings)
    }

    /// Loads `path`, or writes the defaults there when it does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, CondensateError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        let settings = Self::defaults_in(&settings_dir_of(path));
        settings.save(path)?;
        info!("📝 Created default settings at {}", path.display());
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CondensateError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        self.to_ini().write_to_file(path)?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for (section, key) in SETTING_KEYS {
            if let Some(value) = self.get(section, key) {
                ini.with_section(Some(*section)).set(*key, value);
            }
        }
        ini
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        let value = match (section, key) {
            ("serial", "port") => self.serial.port.clone(),
            ("serial", "baud_rate") => self.serial.baud_rate.to_string(),
            ("serial", "timeout") => format_float(self.serial.timeout),
            ("logging", "log_dir") => self.logging.log_dir.display().to_string(),
            ("logging", "file_prefix") => self.logging.file_prefix.clone(),
            ("logging", "backup_enabled") => self.logging.backup_enabled.to_string(),
            ("logging", "rotate_daily") => self.logging.rotate_daily.to_string(),
            ("display", "update_interval") => format_float(self.display.update_interval),
            ("display", "show_grid") => self.display.show_grid.to_string(),
            ("display", "theme") => self.display.theme.to_string(),
            ("display", "threshold") => format_float(self.display.threshold),
            ("display", "buffer_size") => self.display.buffer_size.to_string(),
            ("device", "model") => self.device.model.clone(),
            ("device", "mock_data") => self.device.mock_data.to_string(),
            ("device", "measurement_interval") => format_float(self.device.measurement_interval),
            ("device", "mock_interval") => format_float(self.device.mock_interval),
            ("api", "enabled") => self.api.enabled.to_string(),
            ("api", "port") => self.api.port.to_string(),
            ("websocket", "enabled") => self.websocket.enabled.to_string(),
            ("websocket", "port") => self.websocket.port.to_string(),
            ("storage", "sqlite_enabled") => self.storage.sqlite_enabled.to_string(),
            ("storage", "database_path") => self.storage.database_path.display().to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Parses and stores one value. Nothing changes when validation fails.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), CondensateError> {
        let raw = value.trim();
        let invalid = |expected: &'static str| CondensateError::InvalidSettingValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            expected,
        };

        match (section, key) {
            ("serial", "port") => self.serial.port = non_empty(raw).ok_or_else(|| invalid("a port name"))?,
            ("serial", "baud_rate") => {
                self.serial.baud_rate = raw
                    .parse::<u32>()
                    .ok()
                    .filter(|b| *b > 0)
                    .ok_or_else(|| invalid("a positive integer"))?
            }
            ("serial", "timeout") => self.serial.timeout = interval_secs(raw).ok_or_else(|| invalid(INTERVAL_RANGE))?,
            ("logging", "log_dir") => {
                self.logging.log_dir = non_empty(raw).map(PathBuf::from).ok_or_else(|| invalid("a directory path"))?
            }
            ("logging", "file_prefix") => {
                self.logging.file_prefix = non_empty(raw)
                    .filter(|p| !p.contains(['/', '\\']))
                    .ok_or_else(|| invalid("a file name prefix without separators"))?
            }
            ("logging", "backup_enabled") => self.logging.backup_enabled = parse_bool(raw).ok_or_else(|| invalid("true or false"))?,
            ("logging", "rotate_daily") => self.logging.rotate_daily = parse_bool(raw).ok_or_else(|| invalid("true or false"))?,
            ("display", "update_interval") => {
                self.display.update_interval = interval_secs(raw).ok_or_else(|| invalid(INTERVAL_RANGE))?
            }
            ("display", "show_grid") => self.display.show_grid = parse_bool(raw).ok_or_else(|| invalid("true or false"))?,
            ("display", "theme") => self.display.theme = raw.parse().map_err(|_| invalid("light or dark"))?,
            ("display", "threshold") => {
                self.display.threshold = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|t| t.is_finite() && *t >= 0.0)
                    .ok_or_else(|| invalid("a non-negative number"))?
            }
            ("display", "buffer_size") => {
                self.display.buffer_size = raw
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("a positive integer"))?
            }
            ("device", "model") => self.device.model = non_empty(raw).ok_or_else(|| invalid("a meter model name"))?,
            ("device", "mock_data") => self.device.mock_data = parse_bool(raw).ok_or_else(|| invalid("true or false"))?,
            ("device", "measurement_interval") => {
                self.device.measurement_interval = interval_secs(raw).ok_or_else(|| invalid(INTERVAL_RANGE))?
            }
            ("device", "mock_interval") => {
                self.device.mock_interval = interval_secs(raw).ok_or_else(|| invalid(INTERVAL_RANGE))?
            }
            ("api", "enabled") => self.api.enabled = parse_bool(raw).ok_or_else(|| invalid("true or false"))?,
            ("api", "port") => self.api.port = parse_port(raw).ok_or_else(|| invalid("a TCP port"))?,
            ("websocket", "enabled") => self.websocket.enabled = parse_bool(raw).ok_or_else(|| invalid("true or false"))?,
            ("websocket", "port") => self.websocket.port = parse_port(raw).ok_or_else(|| invalid("a TCP port"))?,
            ("storage", "sqlite_enabled") => {
                self.storage.sqlite_enabled = parse_bool(raw).ok_or_else(|| invalid("true or false"))?
            }
            ("storage", "database_path") => {
                self.storage.database_path = non_empty(raw).map(PathBuf::from).ok_or_else(|| invalid("a file path"))?
            }
            _ => {
                return Err(CondensateError::UnknownSetting {
                    section: section.to_string(),
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<(), CondensateError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("📤 Settings exported to {}", path.display());
        Ok(())
    }

    /// Applies the sections and keys present in a JSON file on top of `self`.
    /// The whole import is rejected if any value is invalid.
    pub fn import_json<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CondensateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let doc: serde_json::Value = serde_json::from_str(&content)?;
        self.apply_json(&doc)?;
        info!("📥 Settings imported from {}", path.display());
        Ok(())
    }

    /// Applies `{ "section": { "key": value } }` through [`Settings::set`], all or nothing.
    pub fn apply_json(&mut self, doc: &serde_json::Value) -> Result<(), CondensateError> {
        let sections = doc
            .as_object()
            .ok_or_else(|| CondensateError::SettingsError("settings document is not a JSON object".to_string()))?;

        let mut updated = self.clone();
        for (section, values) in sections {
            let values = values.as_object().ok_or_else(|| {
                CondensateError::SettingsError(format!("Section '{}' is not a JSON object", section))
            })?;
            for (key, value) in values {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                updated.set(section, key, &text)?;
            }
        }

        *self = updated;
        Ok(())
    }

    pub fn serial_timeout(&self) -> Result<Duration, CondensateError> {
        interval_duration("serial", "timeout", self.serial.timeout)
    }

    /// Poll period of the acquisition loop for the current mode.
    pub fn poll_interval(&self) -> Result<Duration, CondensateError> {
        if self.device.mock_data {
            interval_duration("device", "mock_interval", self.device.mock_interval)
        } else {
            interval_duration("device", "measurement_interval", self.device.measurement_interval)
        }
    }

    pub fn display_interval(&self) -> Result<Duration, CondensateError> {
        interval_duration("display", "update_interval", self.display.update_interval)
    }
}

/// Accepted range for every interval and timeout, in seconds.
pub const MIN_INTERVAL_SECS: f64 = 0.001;
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;
const INTERVAL_RANGE: &str = "seconds between 0.001 and 86400";

/// Fields are public, so values that never went through `set` are checked again here.
fn interval_duration(section: &str, key: &str, secs: f64) -> Result<Duration, CondensateError> {
    let invalid = || CondensateError::InvalidSettingValue {
        section: section.to_string(),
        key: key.to_string(),
        value: format_float(secs),
        expected: INTERVAL_RANGE,
    };
    if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

fn settings_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn format_float(v: f64) -> String {
    format!("{:?}", v)
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

fn interval_secs(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(v))
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok().filter(|p| *p > 0)
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_follow_settings_dir() {
        let settings = Settings::defaults_in(Path::new("/cfg"));
        assert_eq!(settings.logging.log_dir, PathBuf::from("/cfg/logs"));
        assert_eq!(settings.storage.database_path, PathBuf::from("/cfg/condensate.db"));
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.device.model, "HACH Sension7");
        assert!(settings.device.mock_data);
        assert_eq!(settings.display.threshold, 500.0);
    }

    #[test]
    fn every_key_has_a_getter() {
        let settings = Settings::defaults_in(Path::new("/cfg"));
        for (section, key) in SETTING_KEYS {
            assert!(settings.get(section, key).is_some(), "[{}] {}", section, key);
        }
        assert_eq!(settings.get("serial", "timeout").as_deref(), Some("1.0"));
        assert_eq!(settings.get("serial", "nope"), None);
    }

    #[test]
    fn set_validates_types() {
        let mut settings = Settings::defaults_in(Path::new("/cfg"));
        settings.set("serial", "baud_rate", "19200").unwrap();
        settings.set("device", "mock_data", "False").unwrap();
        settings.set("display", "theme", "dark").unwrap();
        assert_eq!(settings.serial.baud_rate, 19200);
        assert!(!settings.device.mock_data);
        assert_eq!(settings.display.theme, Theme::Dark);

        assert!(matches!(
            settings.set("serial", "baud_rate", "fast"),
            Err(CondensateError::InvalidSettingValue { .. })
        ));
        assert!(matches!(
            settings.set("serial", "parity", "none"),
            Err(CondensateError::UnknownSetting { .. })
        ));
        assert!(settings.set("logging", "file_prefix", "../escape").is_err());
        assert_eq!(settings.serial.baud_rate, 19200);
    }

    #[test]
    fn load_merges_missing_and_malformed_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.ini");
        std::fs::write(
            &path,
            "[serial]\nport = /dev/ttyACM0\nbaud_rate = lots\n\n[device]\nmodel = Oakton CON150\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.serial.port, "/dev/ttyACM0");
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.device.model, "Oakton CON150");
        assert_eq!(settings.logging.log_dir, dir.path().join("logs"));
    }

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.ini");

        let created = Settings::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(Settings::load(&path).unwrap(), created);
    }

    #[test]
    fn json_import_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"serial": {"baud_rate": 4800}, "display": {"threshold": "high"}}"#).unwrap();

        let mut settings = Settings::defaults_in(dir.path());
        assert!(settings.import_json(&path).is_err());
        assert_eq!(settings.serial.baud_rate, 9600);

        std::fs::write(&path, r#"{"serial": {"baud_rate": 4800}, "display": {"show_grid": false}}"#).unwrap();
        settings.import_json(&path).unwrap();
        assert_eq!(settings.serial.baud_rate, 4800);
        assert!(!settings.display.show_grid);
    }

    #[test]
    fn poll_interval_depends_on_mode() {
        let mut settings = Settings::defaults_in(Path::new("/cfg"));
        assert_eq!(settings.poll_interval().unwrap(), Duration::from_secs(120));
        settings.device.mock_data = false;
        assert_eq!(settings.poll_interval().unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn intervals_outside_range_are_rejected() {
        let mut settings = Settings::defaults_in(Path::new("/cfg"));
        for raw in ["1e-12", "0", "-1", "1e20", "inf", "NaN"] {
            assert!(
                matches!(
                    settings.set("device", "mock_interval", raw),
                    Err(CondensateError::InvalidSettingValue { .. })
                ),
                "mock_interval = {}",
                raw
            );
            assert!(settings.set("serial", "timeout", raw).is_err(), "timeout = {}", raw);
            assert!(settings.set("display", "update_interval", raw).is_err(), "update_interval = {}", raw);
        }
        assert_eq!(settings.device.mock_interval, 120.0);

        settings.set("device", "mock_interval", "0.001").unwrap();
        assert_eq!(settings.poll_interval().unwrap(), Duration::from_millis(1));
        settings.set("serial", "timeout", "86400").unwrap();
        assert_eq!(settings.serial_timeout().unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn durations_reject_fields_set_directly() {
        let mut settings = Settings::defaults_in(Path::new("/cfg"));
        settings.device.mock_interval = 1e-12;
        assert!(settings.poll_interval().is_err());
        settings.serial.timeout = 1e20;
        assert!(settings.serial_timeout().is_err());
        settings.display.update_interval = f64::NAN;
        assert!(settings.display_interval().is_err());
    }
}
