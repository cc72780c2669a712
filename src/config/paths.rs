use std::path::PathBuf;

pub const SETTINGS_FILE_NAME: &str = "settings.ini";

#[cfg(any(target_os = "windows", target_os = "macos"))]
const APP_DIR_NAME: &str = "Condensate";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const APP_DIR_NAME: &str = "condensate";

/// `%APPDATA%\Condensate`, `~/Library/Application Support/Condensate`
/// or `$XDG_CONFIG_HOME/condensate`.
pub fn default_settings_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn default_settings_path() -> PathBuf {
    default_settings_dir().join(SETTINGS_FILE_NAME)
}

pub fn default_serial_port() -> &'static str {
    if cfg!(target_os = "windows") {
        "COM3"
    } else if cfg!(target_os = "macos") {
        "/dev/tty.usbserial-0001"
    } else {
        "/dev/ttyUSB0"
    }
}

/// Write locations tried after the configured log directory, in order.
pub fn fallback_log_dirs() -> Vec<PathBuf> {
    let mut dirs_out = Vec::with_capacity(2);
    if let Some(home) = dirs::home_dir() {
        dirs_out.push(home);
    }
    dirs_out.push(std::env::temp_dir());
    dirs_out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_ends_with_app_dir_and_file() {
        let path = default_settings_path();
        assert_eq!(path.file_name().unwrap(), SETTINGS_FILE_NAME);
        assert_eq!(path.parent().unwrap().file_name().unwrap(), APP_DIR_NAME);
    }

    #[test]
    fn temp_dir_is_last_fallback() {
        assert_eq!(fallback_log_dirs().last().unwrap(), &std::env::temp_dir());
    }
}
